use std::{
	collections::{BTreeMap, HashMap},
	fmt,
};

use sqlx::PgConnection;

use crate::{Error, Result, models::Observable};

pub const CONTENT_HASH_LEN: usize = 16;

/// Truncated BLAKE3 digest of an observable's content bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; CONTENT_HASH_LEN]);
impl ContentHash {
	pub fn of(content: &[u8]) -> Self {
		let digest = blake3::hash(content);
		let mut out = [0_u8; CONTENT_HASH_LEN];

		out.copy_from_slice(&digest.as_bytes()[..CONTENT_HASH_LEN]);

		Self(out)
	}

	pub fn as_bytes(&self) -> &[u8; CONTENT_HASH_LEN] {
		&self.0
	}
}
impl TryFrom<&[u8]> for ContentHash {
	type Error = Error;

	fn try_from(bytes: &[u8]) -> Result<Self> {
		let raw: [u8; CONTENT_HASH_LEN] = bytes.try_into().map_err(|_| {
			Error::InvalidArgument(format!(
				"content_hash must be {CONTENT_HASH_LEN} bytes; got {}",
				bytes.len()
			))
		})?;

		Ok(Self(raw))
	}
}
impl fmt::Display for ContentHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for byte in self.0 {
			write!(f, "{byte:02x}")?;
		}

		Ok(())
	}
}
impl fmt::Debug for ContentHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ContentHash({self})")
	}
}

/// Identity of a stored observable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObservableKey {
	pub r#type: String,
	pub content_hash: ContentHash,
}
impl ObservableKey {
	pub fn new(r#type: &str, content: &[u8]) -> Self {
		Self { r#type: r#type.to_string(), content_hash: ContentHash::of(content) }
	}
}

#[derive(Debug, Clone, Copy)]
pub struct NewObservable<'a> {
	pub r#type: &'a str,
	pub content: &'a [u8],
}

pub fn hash_content(content: &[u8]) -> ContentHash {
	ContentHash::of(content)
}

/// Distinct observables keyed by identity, in a stable order. Repeated pairs collapse to one entry.
pub fn dedup_observables<'a>(
	observables: &[NewObservable<'a>],
) -> Result<BTreeMap<ObservableKey, &'a [u8]>> {
	let mut distinct = BTreeMap::new();

	for observable in observables {
		if observable.r#type.trim().is_empty() {
			return Err(Error::InvalidArgument(
				"observable type is required; type must not be empty".to_string(),
			));
		}

		distinct
			.entry(ObservableKey::new(observable.r#type, observable.content))
			.or_insert(observable.content);
	}

	Ok(distinct)
}

pub async fn ensure(executor: &mut PgConnection, r#type: &str, content: &[u8]) -> Result<i64> {
	let ids = ensure_batch(executor, &[NewObservable { r#type, content }]).await?;
	let key = ObservableKey::new(r#type, content);

	ids.get(&key).copied().ok_or_else(|| {
		Error::NotFound(format!(
			"observable not found after ensure; type={} content_hash={}",
			key.r#type, key.content_hash
		))
	})
}

pub async fn ensure_batch(
	executor: &mut PgConnection,
	observables: &[NewObservable<'_>],
) -> Result<HashMap<ObservableKey, i64>> {
	let distinct = dedup_observables(observables)?;

	ensure_distinct(executor, &distinct).await
}

/// Inserts the missing rows, then resolves every key with a fresh lookup.
///
/// The lookup runs as its own statement so rows committed concurrently by another alert's rebuild
/// are visible even though the insert skipped them on conflict.
pub async fn ensure_distinct(
	executor: &mut PgConnection,
	distinct: &BTreeMap<ObservableKey, &[u8]>,
) -> Result<HashMap<ObservableKey, i64>> {
	if distinct.is_empty() {
		return Ok(HashMap::new());
	}

	let mut types = Vec::with_capacity(distinct.len());
	let mut hashes = Vec::with_capacity(distinct.len());
	let mut contents = Vec::with_capacity(distinct.len());

	for (key, content) in distinct {
		types.push(key.r#type.clone());
		hashes.push(key.content_hash.as_bytes().to_vec());
		contents.push(content.to_vec());
	}

	sqlx::query(
		"\
INSERT INTO observables (type, content_hash, content)
SELECT type, content_hash, content
FROM unnest($1::text[], $2::bytea[], $3::bytea[]) AS t(type, content_hash, content)
ON CONFLICT (type, content_hash) DO NOTHING",
	)
	.bind(&types)
	.bind(&hashes)
	.bind(&contents)
	.execute(&mut *executor)
	.await?;

	let rows: Vec<(i64, String, Vec<u8>)> = sqlx::query_as(
		"\
SELECT
	o.observable_id,
	o.type,
	o.content_hash
FROM observables o
JOIN unnest($1::text[], $2::bytea[]) AS t(type, content_hash)
	ON o.type = t.type
	AND o.content_hash = t.content_hash",
	)
	.bind(&types)
	.bind(&hashes)
	.fetch_all(&mut *executor)
	.await?;
	let mut ids = HashMap::with_capacity(rows.len());

	for (observable_id, r#type, content_hash) in rows {
		let content_hash = ContentHash::try_from(content_hash.as_slice())?;

		ids.insert(ObservableKey { r#type, content_hash }, observable_id);
	}

	if let Some(missing) = distinct.keys().find(|key| !ids.contains_key(*key)) {
		return Err(Error::NotFound(format!(
			"observable vanished during ensure; type={} content_hash={}",
			missing.r#type, missing.content_hash
		)));
	}

	Ok(ids)
}

pub async fn find_by_key(
	executor: &mut PgConnection,
	key: &ObservableKey,
) -> Result<Option<Observable>> {
	let row = sqlx::query_as::<_, Observable>(
		"\
SELECT
	observable_id,
	type,
	content_hash,
	content,
	created_at
FROM observables
WHERE type = $1
	AND content_hash = $2",
	)
	.bind(key.r#type.as_str())
	.bind(key.content_hash.as_bytes().as_slice())
	.fetch_optional(&mut *executor)
	.await?;

	Ok(row)
}

pub async fn count_by_key(executor: &mut PgConnection, key: &ObservableKey) -> Result<i64> {
	let count: i64 = sqlx::query_scalar(
		"SELECT count(*) FROM observables WHERE type = $1 AND content_hash = $2",
	)
	.bind(key.r#type.as_str())
	.bind(key.content_hash.as_bytes().as_slice())
	.fetch_one(&mut *executor)
	.await?;

	Ok(count)
}
