use clap::Parser;

use ace_worker::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	ace_worker::run(Args::parse()).await
}
