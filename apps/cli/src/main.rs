//! assetenrich CLI: concurrent warranty lookup for inventory spreadsheets.
//!
//! Reads asset ids and serial numbers from a CSV export, looks up each
//! warranty expiration date with a pool of workers, and writes a JSON
//! checkpoint plus a CSV report.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
