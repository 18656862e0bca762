use std::{future::Future, time::Duration};

use sqlx::{PgConnection, PgExecutor};
use time::OffsetDateTime;
use uuid::Uuid;

use ace_storage::{
	db::Db,
	mappings::{self, TeardownCounts},
	observables, rebuild_outbox, tags,
};

use crate::{
	AlertIndexInput, Error, Result, SkippedTag,
	plan::RebuildPlan,
	retry::{self, RetryPolicy, UnitOfWork},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildReport {
	pub alert_id: Uuid,
	pub tags: usize,
	pub observables: usize,
	pub observable_tags: usize,
	pub skipped: Vec<SkippedTag>,
	pub removed: TeardownCounts,
}

/// Re-projects alert documents into the mapping tables.
pub struct IndexRebuilder {
	pub db: Db,
	pub cfg: ace_config::Index,
}
impl IndexRebuilder {
	pub fn new(db: Db, cfg: ace_config::Index) -> Self {
		Self { db, cfg }
	}

	/// Replaces every mapping row of `input.alert_id` in one retried transaction.
	///
	/// Structural problems with the input fail before the database is touched. A deadline expiry
	/// drops the in-flight transaction, which rolls it back and leaves the previous rows intact.
	pub async fn rebuild(&self, input: &AlertIndexInput) -> Result<RebuildReport> {
		let plan = RebuildPlan::new(input, self.cfg.max_observable_bytes)?;
		let job = RebuildJob { plan: &plan, serialize_per_alert: self.cfg.serialize_per_alert };
		let policy = RetryPolicy::from_config(&self.cfg.retry);
		let run = retry::with_retry(&self.db, &policy, &job);
		let report = if self.cfg.rebuild_timeout_ms == 0 {
			run.await?
		} else {
			tokio::time::timeout(Duration::from_millis(self.cfg.rebuild_timeout_ms), run)
				.await
				.map_err(|_| Error::Timeout {
					alert_id: input.alert_id,
					timeout_ms: self.cfg.rebuild_timeout_ms,
				})??
		};

		for skipped in &report.skipped {
			tracing::warn!(
				alert_id = %report.alert_id,
				observable_type = %skipped.key.r#type,
				content_hash = %skipped.key.content_hash,
				tag = %skipped.tag,
				"Observable tag is missing from the alert tag list. Skipped index row."
			);
		}

		tracing::info!(
			alert_id = %report.alert_id,
			observables = report.observables,
			tags = report.tags,
			observable_tags = report.observable_tags,
			removed_observables = report.removed.observables,
			removed_tags = report.removed.tags,
			"Alert index rebuilt."
		);

		Ok(report)
	}

	/// Queues the rebuild for the worker instead of running it inline.
	pub async fn schedule(&self, input: &AlertIndexInput) -> Result<i64> {
		schedule_rebuild(&self.db.pool, input, OffsetDateTime::now_utc()).await
	}
}

/// Enqueues a rebuild on any executor, so a caller can enqueue in the same transaction that writes
/// the alert document.
pub async fn schedule_rebuild<'e, E>(
	executor: E,
	input: &AlertIndexInput,
	now: OffsetDateTime,
) -> Result<i64>
where
	E: PgExecutor<'e>,
{
	let payload = input.to_payload()?;
	let revision = rebuild_outbox::enqueue_rebuild(executor, input.alert_id, &payload, now).await?;

	tracing::debug!(alert_id = %input.alert_id, revision, "Alert index rebuild scheduled.");

	Ok(revision)
}

struct RebuildJob<'p, 'a> {
	plan: &'p RebuildPlan<'a>,
	serialize_per_alert: bool,
}
impl UnitOfWork for RebuildJob<'_, '_> {
	type Output = RebuildReport;

	fn run<'c>(
		&'c self,
		conn: &'c mut PgConnection,
	) -> impl Future<Output = Result<Self::Output>> + Send + 'c {
		async move {
			let plan = self.plan;
			let alert_id = plan.alert_id();

			if self.serialize_per_alert {
				mappings::lock_alert(&mut *conn, alert_id).await?;
			}

			let removed = mappings::delete_for_alert(&mut *conn, alert_id).await?;
			let tag_ids = tags::ensure_distinct(&mut *conn, plan.tags()).await?;
			let mut alert_tag_ids = tag_ids.values().copied().collect::<Vec<_>>();

			alert_tag_ids.sort_unstable();
			mappings::insert_alert_tags(&mut *conn, alert_id, &alert_tag_ids).await?;

			let observable_ids = observables::ensure_distinct(&mut *conn, plan.observables()).await?;
			let mut alert_observable_ids = observable_ids.values().copied().collect::<Vec<_>>();

			alert_observable_ids.sort_unstable();
			alert_observable_ids.dedup();
			mappings::insert_alert_observables(&mut *conn, alert_id, &alert_observable_ids).await?;

			let rows = plan.index_rows(&tag_ids, &observable_ids)?;

			mappings::insert_alert_observable_tags(&mut *conn, alert_id, &rows.pairs).await?;

			Ok(RebuildReport {
				alert_id,
				tags: alert_tag_ids.len(),
				observables: alert_observable_ids.len(),
				observable_tags: rows.pairs.len(),
				skipped: rows.skipped,
				removed,
			})
		}
	}
}
