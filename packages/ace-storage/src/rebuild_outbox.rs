use serde_json::Value;
use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, db::Db, models::RebuildOutboxEntry};

/// Queues a rebuild for the alert. One row per alert: re-enqueueing replaces the payload and bumps
/// the revision. A row that is currently claimed keeps its lease, so the newer payload is picked up
/// only after the in-flight attempt settles.
pub async fn enqueue_rebuild<'e, E>(
	executor: E,
	alert_id: Uuid,
	payload: &Value,
	now: OffsetDateTime,
) -> Result<i64>
where
	E: PgExecutor<'e>,
{
	let revision = sqlx::query_scalar(
		"\
INSERT INTO index_rebuild_outbox (
	alert_id,
	payload,
	revision,
	status,
	attempts,
	available_at,
	created_at,
	updated_at
)
VALUES ($1, $2, 1, 'PENDING', 0, $3, $3, $3)
ON CONFLICT (alert_id) DO UPDATE
SET
	payload = EXCLUDED.payload,
	revision = index_rebuild_outbox.revision + 1,
	status = 'PENDING',
	attempts = 0,
	last_error = NULL,
	available_at = CASE
		WHEN index_rebuild_outbox.status = 'CLAIMED'
			THEN GREATEST(index_rebuild_outbox.available_at, EXCLUDED.available_at)
		ELSE EXCLUDED.available_at
	END,
	updated_at = EXCLUDED.updated_at
RETURNING revision",
	)
	.bind(alert_id)
	.bind(payload)
	.bind(now)
	.fetch_one(executor)
	.await?;

	Ok(revision)
}

pub async fn claim_next_rebuild_job(
	db: &Db,
	now: OffsetDateTime,
	lease_seconds: i64,
) -> Result<Option<RebuildOutboxEntry>> {
	let mut tx = db.pool.begin().await?;
	let row = sqlx::query_as::<_, RebuildOutboxEntry>(
		"\
SELECT
	alert_id,
	payload,
	revision,
	status,
	attempts,
	last_error,
	available_at,
	created_at,
	updated_at
FROM index_rebuild_outbox
WHERE status IN ('PENDING','FAILED','CLAIMED') AND available_at <= $1
ORDER BY available_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED",
	)
	.bind(now)
	.fetch_optional(&mut *tx)
	.await?;
	let job = if let Some(mut job) = row {
		let lease_until = now + time::Duration::seconds(lease_seconds);

		sqlx::query(
			"UPDATE index_rebuild_outbox SET status = 'CLAIMED', available_at = $1, updated_at = $2 WHERE alert_id = $3",
		)
		.bind(lease_until)
		.bind(now)
		.bind(job.alert_id)
		.execute(&mut *tx)
		.await?;

		job.status = "CLAIMED".to_string();
		job.available_at = lease_until;
		job.updated_at = now;

		Some(job)
	} else {
		None
	};

	tx.commit().await?;

	Ok(job)
}

/// Returns false when a newer revision was enqueued while the job ran. The row is then released
/// for immediate pickup instead of being marked done.
pub async fn mark_rebuild_done(
	db: &Db,
	alert_id: Uuid,
	revision: i64,
	now: OffsetDateTime,
) -> Result<bool> {
	let res = sqlx::query(
		"\
UPDATE index_rebuild_outbox
SET status = 'DONE',
	last_error = NULL,
	updated_at = $1
WHERE alert_id = $2
	AND revision = $3",
	)
	.bind(now)
	.bind(alert_id)
	.bind(revision)
	.execute(&db.pool)
	.await?;

	if res.rows_affected() == 0 {
		release_superseded(db, alert_id, now).await?;

		return Ok(false);
	}

	Ok(true)
}

pub async fn mark_rebuild_failed(
	db: &Db,
	alert_id: Uuid,
	revision: i64,
	attempts: i32,
	error_text: &str,
	available_at: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<bool> {
	let res = sqlx::query(
		"\
UPDATE index_rebuild_outbox
SET status = 'FAILED',
	attempts = $1,
	last_error = $2,
	available_at = $3,
	updated_at = $4
WHERE alert_id = $5
	AND revision = $6",
	)
	.bind(attempts)
	.bind(error_text)
	.bind(available_at)
	.bind(now)
	.bind(alert_id)
	.bind(revision)
	.execute(&db.pool)
	.await?;

	if res.rows_affected() == 0 {
		release_superseded(db, alert_id, now).await?;

		return Ok(false);
	}

	Ok(true)
}

/// Parks a job whose input can never be rebuilt. It stays parked until the alert is re-enqueued.
pub async fn mark_rebuild_rejected(
	db: &Db,
	alert_id: Uuid,
	revision: i64,
	attempts: i32,
	error_text: &str,
	now: OffsetDateTime,
) -> Result<bool> {
	let res = sqlx::query(
		"\
UPDATE index_rebuild_outbox
SET status = 'REJECTED',
	attempts = $1,
	last_error = $2,
	updated_at = $3
WHERE alert_id = $4
	AND revision = $5",
	)
	.bind(attempts)
	.bind(error_text)
	.bind(now)
	.bind(alert_id)
	.bind(revision)
	.execute(&db.pool)
	.await?;

	if res.rows_affected() == 0 {
		release_superseded(db, alert_id, now).await?;

		return Ok(false);
	}

	Ok(true)
}

pub async fn get_rebuild_job<'e, E>(executor: E, alert_id: Uuid) -> Result<Option<RebuildOutboxEntry>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, RebuildOutboxEntry>(
		"\
SELECT
	alert_id,
	payload,
	revision,
	status,
	attempts,
	last_error,
	available_at,
	created_at,
	updated_at
FROM index_rebuild_outbox
WHERE alert_id = $1",
	)
	.bind(alert_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

pub async fn purge_done_rebuild_jobs(db: &Db, older_than: OffsetDateTime) -> Result<u64> {
	let res = sqlx::query("DELETE FROM index_rebuild_outbox WHERE status = 'DONE' AND updated_at < $1")
		.bind(older_than)
		.execute(&db.pool)
		.await?;

	Ok(res.rows_affected())
}

async fn release_superseded(db: &Db, alert_id: Uuid, now: OffsetDateTime) -> Result<()> {
	sqlx::query(
		"\
UPDATE index_rebuild_outbox
SET status = 'PENDING',
	available_at = $1,
	updated_at = $1
WHERE alert_id = $2
	AND status IN ('PENDING', 'CLAIMED')",
	)
	.bind(now)
	.bind(alert_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}
