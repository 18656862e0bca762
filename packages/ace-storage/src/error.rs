#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Not found: {0}")]
	NotFound(String),
}
impl Error {
	/// Whether the failure is worth retrying with a fresh transaction.
	pub fn is_transient(&self) -> bool {
		match self {
			Self::Sqlx(err) => is_transient_sqlx(err),
			_ => false,
		}
	}
}

fn is_transient_sqlx(err: &sqlx::Error) -> bool {
	match err {
		sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed => true,
		sqlx::Error::Database(db_err) =>
			db_err.code().as_deref().map(is_transient_sqlstate).unwrap_or(false),
		_ => false,
	}
}

// 40001 serialization_failure, 40P01 deadlock_detected, class 08 connection exceptions,
// 57P01..57P03 admin/crash shutdown and cannot_connect_now.
fn is_transient_sqlstate(code: &str) -> bool {
	matches!(code, "40001" | "40P01" | "57P01" | "57P02" | "57P03") || code.starts_with("08")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn serialization_and_connection_states_are_transient() {
		for code in ["40001", "40P01", "08000", "08006", "57P01", "57P03"] {
			assert!(is_transient_sqlstate(code), "Expected {code} to be transient.");
		}
	}

	#[test]
	fn constraint_and_syntax_states_are_not_transient() {
		for code in ["23505", "23503", "42601", "22P02", "42P01"] {
			assert!(!is_transient_sqlstate(code), "Expected {code} to be fatal.");
		}
	}

	#[test]
	fn pool_timeouts_are_transient_but_row_errors_are_not() {
		assert!(Error::Sqlx(sqlx::Error::PoolTimedOut).is_transient());
		assert!(!Error::Sqlx(sqlx::Error::RowNotFound).is_transient());
		assert!(!Error::Sqlx(sqlx::Error::PoolClosed).is_transient());
		assert!(!Error::InvalidArgument("bad".to_string()).is_transient());
	}
}
