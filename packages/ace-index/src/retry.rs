use std::{future::Future, time::Duration};

use sqlx::PgConnection;

use ace_storage::db::Db;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub base_backoff: Duration,
	pub max_backoff: Duration,
}
impl RetryPolicy {
	pub fn from_config(cfg: &ace_config::Retry) -> Self {
		Self {
			max_attempts: cfg.max_attempts.max(1),
			base_backoff: Duration::from_millis(cfg.base_backoff_ms),
			max_backoff: Duration::from_millis(cfg.max_backoff_ms),
		}
	}

	/// Delay before the attempt after `attempt` (1-based): `base * 2^(attempt - 1)`, capped.
	pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
		let exp = attempt.max(1).saturating_sub(1).min(16);
		let base = self.base_backoff.saturating_mul(1 << exp);

		base.min(self.max_backoff)
	}
}

/// Work that runs inside one database transaction and may be replayed from scratch.
///
/// Implementations must not perform side effects outside the connection they are given, since a
/// failed attempt is rolled back and run again.
pub trait UnitOfWork
where
	Self: Sync,
{
	type Output: Send;

	fn run<'c>(
		&'c self,
		conn: &'c mut PgConnection,
	) -> impl Future<Output = Result<Self::Output>> + Send + 'c;
}

pub async fn with_retry<W>(db: &Db, policy: &RetryPolicy, work: &W) -> Result<W::Output>
where
	W: UnitOfWork,
{
	let max_attempts = policy.max_attempts.max(1);
	let mut attempt = 1;

	loop {
		match run_in_transaction(db, work).await {
			Ok(output) => {
				if attempt > 1 {
					tracing::info!(attempt, "Unit of work succeeded after retry.");
				}

				return Ok(output);
			},
			Err(err) if !err.is_transient() => return Err(err),
			Err(err) if attempt >= max_attempts =>
				return Err(Error::RetriesExhausted { attempts: attempt, source: Box::new(err) }),
			Err(err) => {
				let backoff = policy.backoff_for_attempt(attempt);

				tracing::warn!(
					error = %err,
					attempt,
					max_attempts,
					backoff_ms = backoff.as_millis() as u64,
					"Transient database failure. Retrying unit of work."
				);
				tokio::time::sleep(backoff).await;

				attempt += 1;
			},
		}
	}
}

async fn run_in_transaction<W>(db: &Db, work: &W) -> Result<W::Output>
where
	W: UnitOfWork,
{
	let mut tx = db.pool.begin().await?;

	match work.run(&mut *tx).await {
		Ok(output) => {
			tx.commit().await?;

			Ok(output)
		},
		Err(err) => {
			if let Err(rollback_err) = tx.rollback().await {
				tracing::warn!(error = %rollback_err, "Rollback after failed unit of work failed.");
			}

			Err(err)
		},
	}
}
