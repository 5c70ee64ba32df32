//! # AR Launch CLI
//!
//! Command-line entry point for inspecting and simulating the AR flow.

use ar_cli::{logging, CliArgs};
use clap::Parser;

fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let args = CliArgs::parse();
    tracing::debug!(?args, "Parsed arguments");

    let output = ar_cli::run(args)?;
    println!("{output}");
    Ok(())
}
