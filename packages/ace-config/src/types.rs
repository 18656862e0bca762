use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub index: Index,
	pub worker: Worker,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Index {
	/// Upper bound for a single observable's content. Larger content is rejected as malformed.
	pub max_observable_bytes: u64,
	/// Take a transaction-scoped advisory lock keyed by alert id before the teardown.
	#[serde(default = "default_serialize_per_alert")]
	pub serialize_per_alert: bool,
	/// Deadline for one rebuild across all attempts. Zero disables it.
	#[serde(default)]
	pub rebuild_timeout_ms: u64,
	pub retry: Retry,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Retry {
	pub max_attempts: u32,
	pub base_backoff_ms: u64,
	pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Worker {
	pub poll_interval_ms: u64,
	pub claim_lease_seconds: i64,
	pub base_backoff_ms: i64,
	pub max_backoff_ms: i64,
	#[serde(default = "default_max_error_chars")]
	pub max_error_chars: usize,
	#[serde(default = "default_done_retention_hours")]
	pub done_retention_hours: i64,
}

fn default_serialize_per_alert() -> bool {
	true
}

fn default_max_error_chars() -> usize {
	1_024
}

fn default_done_retention_hours() -> i64 {
	24
}
