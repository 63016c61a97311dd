//! leadfill CLI: enrich company records from public lookup sources.
//!
//! Reads a list of company records, fills in address, director names,
//! professional profile and phone through the configured providers, and
//! writes the results batch by batch to a JSON list that survives restarts.

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
