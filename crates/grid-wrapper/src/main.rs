//! grid-wrapper binary.

use anyhow::Result;
use clap::Parser;
use grid_wrapper::{app, cli::Cli, logging};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level)?;
    app::run(cli).await
}
