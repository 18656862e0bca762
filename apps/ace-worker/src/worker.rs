use std::{borrow::Cow, time::Duration as StdDuration};

use color_eyre::Result;
use time::{Duration, OffsetDateTime};
use tokio::time as tokio_time;

use ace_index::{AlertIndexInput, Error as IndexError, IndexRebuilder};
use ace_storage::{db::Db, models::RebuildOutboxEntry, rebuild_outbox};

const PURGE_INTERVAL_SECONDS: i64 = 900;
const REDACTED: &str = "[REDACTED]";
const SECRET_KEYS: [&str; 3] = ["password", "secret", "token"];

pub struct WorkerState {
	pub rebuilder: IndexRebuilder,
	pub cfg: ace_config::Worker,
}
impl WorkerState {
	fn db(&self) -> &Db {
		&self.rebuilder.db
	}
}

/// What happened to the job claimed by one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
	Idle,
	Done,
	Superseded,
	Failed,
	Rejected,
}

pub async fn run_worker(state: WorkerState) -> Result<()> {
	let mut last_purge = OffsetDateTime::now_utc();

	loop {
		let outcome = match process_rebuild_outbox_once(&state).await {
			Ok(outcome) => outcome,
			Err(err) => {
				tracing::error!(error = %err, "Rebuild outbox processing failed.");

				JobOutcome::Idle
			},
		};
		let now = OffsetDateTime::now_utc();

		if now - last_purge >= Duration::seconds(PURGE_INTERVAL_SECONDS) {
			let older_than = now - Duration::hours(state.cfg.done_retention_hours);

			match rebuild_outbox::purge_done_rebuild_jobs(state.db(), older_than).await {
				Ok(purged) => {
					if purged > 0 {
						tracing::info!(purged, "Purged settled rebuild jobs.");
					}

					last_purge = now;
				},
				Err(err) => tracing::error!(error = %err, "Rebuild outbox cleanup failed."),
			}
		}
		if outcome == JobOutcome::Idle {
			tokio_time::sleep(StdDuration::from_millis(state.cfg.poll_interval_ms)).await;
		}
	}
}

/// Claims at most one job and settles it.
pub async fn process_rebuild_outbox_once(state: &WorkerState) -> Result<JobOutcome> {
	let now = OffsetDateTime::now_utc();
	let job =
		rebuild_outbox::claim_next_rebuild_job(state.db(), now, state.cfg.claim_lease_seconds)
			.await?;
	let Some(job) = job else {
		return Ok(JobOutcome::Idle);
	};
	let result = rebuild_from_job(&state.rebuilder, &job).await;
	let attempts = job.attempts.saturating_add(1);
	let now = OffsetDateTime::now_utc();
	let outcome = match result {
		Ok(()) => {
			if rebuild_outbox::mark_rebuild_done(state.db(), job.alert_id, job.revision, now).await? {
				JobOutcome::Done
			} else {
				JobOutcome::Superseded
			}
		},
		Err(err) if err.is_retryable() => {
			let available_at = now + backoff_for_attempt(&state.cfg, attempts);
			let error_text = sanitize_outbox_error(&err.to_string(), state.cfg.max_error_chars);

			tracing::error!(
				error = %err,
				alert_id = %job.alert_id,
				revision = job.revision,
				attempts,
				"Index rebuild job failed. Scheduled another attempt."
			);

			if rebuild_outbox::mark_rebuild_failed(
				state.db(),
				job.alert_id,
				job.revision,
				attempts,
				&error_text,
				available_at,
				now,
			)
			.await?
			{
				JobOutcome::Failed
			} else {
				JobOutcome::Superseded
			}
		},
		Err(err) => {
			let error_text = sanitize_outbox_error(&err.to_string(), state.cfg.max_error_chars);

			tracing::error!(
				error = %err,
				alert_id = %job.alert_id,
				revision = job.revision,
				"Index rebuild job rejected."
			);

			if rebuild_outbox::mark_rebuild_rejected(
				state.db(),
				job.alert_id,
				job.revision,
				attempts,
				&error_text,
				now,
			)
			.await?
			{
				JobOutcome::Rejected
			} else {
				JobOutcome::Superseded
			}
		},
	};

	if outcome == JobOutcome::Superseded {
		tracing::debug!(
			alert_id = %job.alert_id,
			revision = job.revision,
			"Rebuild job was re-enqueued while running. Released for the newer revision."
		);
	}

	Ok(outcome)
}

async fn rebuild_from_job(
	rebuilder: &IndexRebuilder,
	job: &RebuildOutboxEntry,
) -> ace_index::Result<()> {
	let input = AlertIndexInput::from_payload(&job.payload)?;

	if input.alert_id != job.alert_id {
		return Err(IndexError::Payload {
			message: format!(
				"payload alert_id {} does not match outbox alert_id {}",
				input.alert_id, job.alert_id
			),
		});
	}

	rebuilder.rebuild(&input).await?;

	Ok(())
}

fn backoff_for_attempt(cfg: &ace_config::Worker, attempt: i32) -> Duration {
	let attempts = attempt.max(1) as u32;
	let exp = attempts.saturating_sub(1).min(16);
	let base = cfg.base_backoff_ms.saturating_mul(1 << exp);
	let capped = base.min(cfg.max_backoff_ms);

	Duration::milliseconds(capped)
}

fn sanitize_outbox_error(text: &str, max_chars: usize) -> String {
	let mut words = Vec::new();
	let mut after_bearer = false;

	for word in text.split_whitespace() {
		words.push(if after_bearer { Cow::Borrowed(REDACTED) } else { redact_assignment(word) });

		after_bearer = word.eq_ignore_ascii_case("bearer");
	}

	let joined = words.join(" ");

	match joined.char_indices().nth(max_chars) {
		Some((cut, _)) => format!("{}...", &joined[..cut]),
		None => joined,
	}
}

/// `key=value` or `key:value` with a credential-like key keeps the key and drops the value.
fn redact_assignment(word: &str) -> Cow<'_, str> {
	let Some((key, sep)) = ['=', ':']
		.into_iter()
		.find_map(|sep| word.split_once(sep).map(|(key, _)| (key, sep)))
	else {
		return Cow::Borrowed(word);
	};
	let key_lower = key.to_ascii_lowercase();

	if SECRET_KEYS.iter().any(|secret| key_lower.contains(secret)) {
		Cow::Owned(format!("{key}{sep}{REDACTED}"))
	} else {
		Cow::Borrowed(word)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn worker_config() -> ace_config::Worker {
		ace_config::Worker {
			poll_interval_ms: 500,
			claim_lease_seconds: 30,
			base_backoff_ms: 500,
			max_backoff_ms: 3_000,
			max_error_chars: 32,
			done_retention_hours: 24,
		}
	}

	#[test]
	fn backoff_doubles_per_attempt_and_caps() {
		let cfg = worker_config();

		assert_eq!(backoff_for_attempt(&cfg, 0), Duration::milliseconds(500));
		assert_eq!(backoff_for_attempt(&cfg, 1), Duration::milliseconds(500));
		assert_eq!(backoff_for_attempt(&cfg, 3), Duration::milliseconds(2_000));
		assert_eq!(backoff_for_attempt(&cfg, 4), Duration::milliseconds(3_000));
		assert_eq!(backoff_for_attempt(&cfg, 90), Duration::milliseconds(3_000));
	}

	#[test]
	fn credentials_are_redacted() {
		let text = sanitize_outbox_error(
			"connect failed password=hunter2 Authorization: Bearer abc.def",
			1_024,
		);

		assert_eq!(text, "connect failed password=[REDACTED] Authorization: Bearer [REDACTED]");
	}

	#[test]
	fn only_credential_keys_are_redacted() {
		let text = sanitize_outbox_error(
			"dsn=postgres://db:5432/ace db_secret:s3cr3t at=line:4 api_token=abc",
			1_024,
		);

		assert_eq!(
			text,
			"dsn=postgres://db:5432/ace db_secret:[REDACTED] at=line:4 api_token=[REDACTED]"
		);
	}

	#[test]
	fn long_errors_are_truncated() {
		let text = sanitize_outbox_error(&"x".repeat(100), worker_config().max_error_chars);

		assert_eq!(text.chars().count(), 35);
		assert!(text.ends_with("..."));
	}
}
