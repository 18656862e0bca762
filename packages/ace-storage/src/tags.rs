use std::collections::{BTreeSet, HashMap};

use sqlx::PgConnection;

use crate::{Error, Result, models::Tag};

/// Distinct tag names in a stable order.
pub fn dedup_names<S>(names: &[S]) -> Result<BTreeSet<String>>
where
	S: AsRef<str>,
{
	let mut distinct = BTreeSet::new();

	for name in names {
		let name = name.as_ref();

		if name.trim().is_empty() {
			return Err(Error::InvalidArgument(
				"tag name is required; name must not be empty".to_string(),
			));
		}

		distinct.insert(name.to_string());
	}

	Ok(distinct)
}

pub async fn ensure_batch<S>(executor: &mut PgConnection, names: &[S]) -> Result<HashMap<String, i64>>
where
	S: AsRef<str>,
{
	let distinct = dedup_names(names)?;

	ensure_distinct(executor, &distinct).await
}

pub async fn ensure_distinct(
	executor: &mut PgConnection,
	distinct: &BTreeSet<String>,
) -> Result<HashMap<String, i64>> {
	if distinct.is_empty() {
		return Ok(HashMap::new());
	}

	let names = distinct.iter().cloned().collect::<Vec<_>>();

	sqlx::query(
		"\
INSERT INTO tags (name)
SELECT name
FROM unnest($1::text[]) AS t(name)
ON CONFLICT (name) DO NOTHING",
	)
	.bind(&names)
	.execute(&mut *executor)
	.await?;

	let rows: Vec<(i64, String)> =
		sqlx::query_as("SELECT tag_id, name FROM tags WHERE name = ANY($1::text[])")
			.bind(&names)
			.fetch_all(&mut *executor)
			.await?;
	let ids = rows.into_iter().map(|(tag_id, name)| (name, tag_id)).collect::<HashMap<_, _>>();

	if let Some(missing) = names.iter().find(|name| !ids.contains_key(*name)) {
		return Err(Error::NotFound(format!("tag vanished during ensure; name={missing}")));
	}

	Ok(ids)
}

pub async fn find_by_name(executor: &mut PgConnection, name: &str) -> Result<Option<Tag>> {
	let row = sqlx::query_as::<_, Tag>(
		"\
SELECT
	tag_id,
	name,
	created_at
FROM tags
WHERE name = $1",
	)
	.bind(name)
	.fetch_optional(&mut *executor)
	.await?;

	Ok(row)
}
