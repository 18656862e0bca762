pub mod worker;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ace_index::IndexRebuilder;
use ace_storage::db::Db;

#[derive(Debug, Parser)]
#[command(
	version = ace_cli::VERSION,
	rename_all = "kebab",
	styles = ace_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = ace_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let state = worker::WorkerState {
		rebuilder: IndexRebuilder::new(db, config.index),
		cfg: config.worker,
	};

	tracing::info!(version = ace_cli::VERSION, "Index rebuild worker started.");

	worker::run_worker(state).await
}
