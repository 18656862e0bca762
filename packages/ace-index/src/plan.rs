//! Validation and deduplication of one alert's flattened document, before any database work.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use uuid::Uuid;

use ace_storage::observables::ObservableKey;

use crate::{AlertIndexInput, Error, Result};

/// An observable tag that could not be resolved against the alert-level tag list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTag {
	pub key: ObservableKey,
	pub tag: String,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct IndexRows {
	/// `(observable_id, tag_id)` pairs for the ternary index, sorted and distinct.
	pub pairs: Vec<(i64, i64)>,
	pub skipped: Vec<SkippedTag>,
}

#[derive(Debug)]
pub struct RebuildPlan<'a> {
	alert_id: Uuid,
	tags: BTreeSet<String>,
	observables: BTreeMap<ObservableKey, &'a [u8]>,
	observable_tags: BTreeMap<ObservableKey, BTreeSet<&'a str>>,
}
impl<'a> RebuildPlan<'a> {
	pub fn new(input: &'a AlertIndexInput, max_observable_bytes: u64) -> Result<Self> {
		let mut tags = BTreeSet::new();

		for name in &input.tags {
			if name.trim().is_empty() {
				return Err(Error::InvalidTag {
					message: "alert tag names must not be empty".to_string(),
				});
			}

			tags.insert(name.clone());
		}

		let mut observables = BTreeMap::new();
		let mut observable_tags: BTreeMap<ObservableKey, BTreeSet<&'a str>> = BTreeMap::new();

		for (index, entry) in input.observables.iter().enumerate() {
			if entry.r#type.trim().is_empty() {
				return Err(Error::InvalidObservable {
					index,
					message: "observable type must not be empty".to_string(),
				});
			}
			if entry.content.is_empty() {
				return Err(Error::InvalidObservable {
					index,
					message: format!("{} observable has no content to hash", entry.r#type),
				});
			}
			if entry.content.len() as u64 > max_observable_bytes {
				return Err(Error::InvalidObservable {
					index,
					message: format!(
						"{} observable content is {} bytes; the limit is {max_observable_bytes}",
						entry.r#type,
						entry.content.len()
					),
				});
			}

			let key = ObservableKey::new(&entry.r#type, &entry.content);
			let attached = observable_tags.entry(key.clone()).or_default();

			for tag in &entry.tags {
				if tag.trim().is_empty() {
					return Err(Error::InvalidObservable {
						index,
						message: "attached tag names must not be empty".to_string(),
					});
				}

				attached.insert(tag.as_str());
			}

			observables.entry(key).or_insert(entry.content.as_slice());
		}

		Ok(Self { alert_id: input.alert_id, tags, observables, observable_tags })
	}

	pub fn alert_id(&self) -> Uuid {
		self.alert_id
	}

	/// Distinct alert-level tag names.
	pub fn tags(&self) -> &BTreeSet<String> {
		&self.tags
	}

	/// Distinct observables keyed by `(type, content_hash)`.
	pub fn observables(&self) -> &BTreeMap<ObservableKey, &'a [u8]> {
		&self.observables
	}

	/// Resolves attached tag names to the triples for the ternary index. Names missing from the
	/// alert-level list are reported back instead of failing the rebuild.
	pub fn index_rows(
		&self,
		tag_ids: &HashMap<String, i64>,
		observable_ids: &HashMap<ObservableKey, i64>,
	) -> Result<IndexRows> {
		let mut pairs = BTreeSet::new();
		let mut skipped = Vec::new();

		for (key, attached) in &self.observable_tags {
			let Some(&observable_id) = observable_ids.get(key) else {
				return Err(Error::Storage(ace_storage::Error::NotFound(format!(
					"observable id missing from batch; type={} content_hash={}",
					key.r#type, key.content_hash
				))));
			};

			for tag in attached {
				match tag_ids.get(*tag) {
					Some(&tag_id) => {
						pairs.insert((observable_id, tag_id));
					},
					None => skipped.push(SkippedTag { key: key.clone(), tag: tag.to_string() }),
				}
			}
		}

		Ok(IndexRows { pairs: pairs.into_iter().collect(), skipped })
	}
}
