mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Config, Index, Postgres, Retry, Service, Storage, Worker};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.index.max_observable_bytes == 0 {
		return Err(Error::Validation {
			message: "index.max_observable_bytes must be greater than zero.".to_string(),
		});
	}
	if cfg.index.retry.max_attempts == 0 {
		return Err(Error::Validation {
			message: "index.retry.max_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.index.retry.base_backoff_ms > cfg.index.retry.max_backoff_ms {
		return Err(Error::Validation {
			message: "index.retry.base_backoff_ms must not exceed index.retry.max_backoff_ms."
				.to_string(),
		});
	}
	if cfg.worker.poll_interval_ms == 0 {
		return Err(Error::Validation {
			message: "worker.poll_interval_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.claim_lease_seconds <= 0 {
		return Err(Error::Validation {
			message: "worker.claim_lease_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.base_backoff_ms <= 0 {
		return Err(Error::Validation {
			message: "worker.base_backoff_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.base_backoff_ms > cfg.worker.max_backoff_ms {
		return Err(Error::Validation {
			message: "worker.base_backoff_ms must not exceed worker.max_backoff_ms.".to_string(),
		});
	}
	if cfg.worker.max_error_chars == 0 {
		return Err(Error::Validation {
			message: "worker.max_error_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.done_retention_hours <= 0 {
		return Err(Error::Validation {
			message: "worker.done_retention_hours must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	let trimmed = cfg.service.log_level.trim();

	if trimmed.len() != cfg.service.log_level.len() {
		cfg.service.log_level = trimmed.to_string();
	}
}
