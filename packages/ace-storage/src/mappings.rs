use sqlx::PgConnection;
use uuid::Uuid;

use crate::Result;

/// Rows removed by a teardown, per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownCounts {
	pub observable_tags: u64,
	pub observables: u64,
	pub tags: u64,
}

/// Key for the transaction-scoped advisory lock that serializes rebuilds of one alert.
pub fn alert_lock_key(alert_id: Uuid) -> i64 {
	let (high, low) = alert_id.as_u64_pair();

	(high ^ low) as i64
}

/// Blocks until no other transaction holds the alert's lock. Released on commit or rollback.
pub async fn lock_alert(executor: &mut PgConnection, alert_id: Uuid) -> Result<()> {
	sqlx::query("SELECT pg_advisory_xact_lock($1)")
		.bind(alert_lock_key(alert_id))
		.execute(&mut *executor)
		.await?;

	Ok(())
}

pub async fn delete_for_alert(executor: &mut PgConnection, alert_id: Uuid) -> Result<TeardownCounts> {
	// The ternary index references both pair tables, so it goes first.
	let observable_tags = sqlx::query("DELETE FROM alert_observable_tag_index WHERE alert_id = $1")
		.bind(alert_id)
		.execute(&mut *executor)
		.await?
		.rows_affected();
	let observables = sqlx::query("DELETE FROM alert_observable_mapping WHERE alert_id = $1")
		.bind(alert_id)
		.execute(&mut *executor)
		.await?
		.rows_affected();
	let tags = sqlx::query("DELETE FROM alert_tag_mapping WHERE alert_id = $1")
		.bind(alert_id)
		.execute(&mut *executor)
		.await?
		.rows_affected();

	Ok(TeardownCounts { observable_tags, observables, tags })
}

pub async fn insert_alert_tags(
	executor: &mut PgConnection,
	alert_id: Uuid,
	tag_ids: &[i64],
) -> Result<u64> {
	if tag_ids.is_empty() {
		return Ok(0);
	}

	let res = sqlx::query(
		"\
INSERT INTO alert_tag_mapping (alert_id, tag_id)
SELECT $1, tag_id
FROM unnest($2::int8[]) AS t(tag_id)
ON CONFLICT (alert_id, tag_id) DO NOTHING",
	)
	.bind(alert_id)
	.bind(tag_ids)
	.execute(&mut *executor)
	.await?;

	Ok(res.rows_affected())
}

pub async fn insert_alert_observables(
	executor: &mut PgConnection,
	alert_id: Uuid,
	observable_ids: &[i64],
) -> Result<u64> {
	if observable_ids.is_empty() {
		return Ok(0);
	}

	let res = sqlx::query(
		"\
INSERT INTO alert_observable_mapping (alert_id, observable_id)
SELECT $1, observable_id
FROM unnest($2::int8[]) AS t(observable_id)
ON CONFLICT (alert_id, observable_id) DO NOTHING",
	)
	.bind(alert_id)
	.bind(observable_ids)
	.execute(&mut *executor)
	.await?;

	Ok(res.rows_affected())
}

pub async fn insert_alert_observable_tags(
	executor: &mut PgConnection,
	alert_id: Uuid,
	pairs: &[(i64, i64)],
) -> Result<u64> {
	if pairs.is_empty() {
		return Ok(0);
	}

	let (observable_ids, tag_ids): (Vec<i64>, Vec<i64>) = pairs.iter().copied().unzip();
	let res = sqlx::query(
		"\
INSERT INTO alert_observable_tag_index (alert_id, observable_id, tag_id)
SELECT $1, observable_id, tag_id
FROM unnest($2::int8[], $3::int8[]) AS t(observable_id, tag_id)
ON CONFLICT (alert_id, observable_id, tag_id) DO NOTHING",
	)
	.bind(alert_id)
	.bind(&observable_ids)
	.bind(&tag_ids)
	.execute(&mut *executor)
	.await?;

	Ok(res.rows_affected())
}

pub async fn list_alert_observables(executor: &mut PgConnection, alert_id: Uuid) -> Result<Vec<i64>> {
	let rows = sqlx::query_scalar(
		"\
SELECT observable_id
FROM alert_observable_mapping
WHERE alert_id = $1
ORDER BY observable_id",
	)
	.bind(alert_id)
	.fetch_all(&mut *executor)
	.await?;

	Ok(rows)
}

pub async fn list_alert_tags(executor: &mut PgConnection, alert_id: Uuid) -> Result<Vec<i64>> {
	let rows = sqlx::query_scalar(
		"\
SELECT tag_id
FROM alert_tag_mapping
WHERE alert_id = $1
ORDER BY tag_id",
	)
	.bind(alert_id)
	.fetch_all(&mut *executor)
	.await?;

	Ok(rows)
}

pub async fn list_alert_observable_tags(
	executor: &mut PgConnection,
	alert_id: Uuid,
) -> Result<Vec<(i64, i64)>> {
	let rows = sqlx::query_as(
		"\
SELECT observable_id, tag_id
FROM alert_observable_tag_index
WHERE alert_id = $1
ORDER BY observable_id, tag_id",
	)
	.bind(alert_id)
	.fetch_all(&mut *executor)
	.await?;

	Ok(rows)
}
