//! Flattened view of an alert document, as produced by the document model.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{Error, Result};

/// One observable instance found anywhere in the alert's tree, with the tags attached to that
/// instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservableEntry {
	pub r#type: String,
	pub content: Vec<u8>,
	#[serde(default)]
	pub tags: Vec<String>,
}
impl ObservableEntry {
	pub fn new(r#type: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
		Self { r#type: r#type.into(), content: content.into(), tags: Vec::new() }
	}

	pub fn with_tags<I, S>(mut self, tags: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.tags = tags.into_iter().map(Into::into).collect();

		self
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertIndexInput {
	pub alert_id: Uuid,
	pub observables: Vec<ObservableEntry>,
	/// Every tag referenced in the document, alert-level and observable-level.
	#[serde(default)]
	pub tags: Vec<String>,
}
impl AlertIndexInput {
	pub fn to_payload(&self) -> Result<Value> {
		serde_json::to_value(self).map_err(|err| Error::Payload { message: err.to_string() })
	}

	pub fn from_payload(payload: &Value) -> Result<Self> {
		Self::deserialize(payload).map_err(|err| Error::Payload { message: err.to_string() })
	}
}
