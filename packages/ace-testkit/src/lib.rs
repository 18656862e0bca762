//! Throwaway Postgres databases for integration tests.
//!
//! Each [`TestDatabase`] is created on the server named by `ACE_PG_DSN` and dropped with
//! `WITH (FORCE)`, so open pools do not keep it alive.

mod error;

pub use error::{Error, Result};

use std::{env, future::Future, str::FromStr, thread};

use sqlx::{
	ConnectOptions, Connection,
	postgres::{PgConnectOptions, PgConnection},
};
use tokio::runtime::Builder;
use uuid::Uuid;

const DSN_ENV: &str = "ACE_PG_DSN";
const DATABASE_PREFIX: &str = "ace_test_";
const MAINTENANCE_DATABASE: &str = "postgres";

pub struct TestDatabase {
	name: String,
	dsn: String,
	maintenance: PgConnectOptions,
	dropped: bool,
}
impl TestDatabase {
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base = PgConnectOptions::from_str(base_dsn)
			.map_err(|err| Error::Message(format!("Invalid {DSN_ENV}: {err}.")))?;
		let maintenance = base.clone().database(MAINTENANCE_DATABASE);
		let name = format!("{DATABASE_PREFIX}{}", Uuid::new_v4().simple());
		let mut conn = PgConnection::connect_with(&maintenance).await?;

		sqlx::query(&format!(r#"CREATE DATABASE "{name}""#)).execute(&mut conn).await?;
		conn.close().await?;

		let dsn = base.database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, maintenance, dropped: false })
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	pub async fn cleanup(mut self) -> Result<()> {
		drop_database(&self.maintenance, &self.name).await?;

		self.dropped = true;

		Ok(())
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		if self.dropped {
			return;
		}

		let maintenance = self.maintenance.clone();
		let name = self.name.clone();
		// Blocking cleanup on a dedicated runtime thread.
		let joined = thread::spawn(move || -> Result<()> {
			Builder::new_current_thread()
				.enable_all()
				.build()
				.map_err(|err| Error::Message(format!("Failed to start cleanup runtime: {err}.")))?
				.block_on(drop_database(&maintenance, &name))
		})
		.join();

		match joined {
			Ok(Ok(())) => {},
			Ok(Err(err)) => eprintln!("Leaked test database {}: {err}", self.name),
			Err(_) => eprintln!("Leaked test database {}: cleanup thread panicked.", self.name),
		}
	}
}

/// The server to create test databases on, or `None` when database tests should be skipped.
pub fn env_dsn() -> Option<String> {
	env::var(DSN_ENV).ok().filter(|dsn| !dsn.trim().is_empty())
}

/// Runs `f` against a fresh database and drops it afterwards. An error from `f` wins over a
/// cleanup error.
pub async fn with_test_db<F, Fut, T>(base_dsn: &str, f: F) -> Result<T>
where
	F: FnOnce(&TestDatabase) -> Fut,
	Fut: Future<Output = Result<T>>,
{
	let db = TestDatabase::new(base_dsn).await?;
	let result = f(&db).await;
	let cleaned = db.cleanup().await;

	result.and_then(|value| cleaned.map(|()| value))
}

async fn drop_database(maintenance: &PgConnectOptions, name: &str) -> Result<()> {
	let mut conn = PgConnection::connect_with(maintenance).await?;

	sqlx::query(&format!(r#"DROP DATABASE IF EXISTS "{name}" WITH (FORCE)"#))
		.execute(&mut conn)
		.await?;
	conn.close().await?;

	Ok(())
}
