use uuid::Uuid;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid observable at index {index}: {message}")]
	InvalidObservable { index: usize, message: String },
	#[error("Invalid tag: {message}")]
	InvalidTag { message: String },
	#[error("Invalid rebuild payload: {message}")]
	Payload { message: String },
	#[error("Gave up after {attempts} attempts: {source}")]
	RetriesExhausted { attempts: u32, source: Box<Error> },
	#[error("Rebuild of alert {alert_id} exceeded its {timeout_ms} ms deadline.")]
	Timeout { alert_id: Uuid, timeout_ms: u64 },
	#[error(transparent)]
	Storage(#[from] ace_storage::Error),
}
impl Error {
	/// Failures the retry wrapper absorbs by starting a new transaction.
	pub fn is_transient(&self) -> bool {
		match self {
			Self::Storage(err) => err.is_transient(),
			_ => false,
		}
	}

	/// Failures a caller may resolve by triggering the same rebuild again later.
	pub fn is_retryable(&self) -> bool {
		self.is_transient() || matches!(self, Self::RetriesExhausted { .. } | Self::Timeout { .. })
	}
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage(ace_storage::Error::Sqlx(err))
	}
}
