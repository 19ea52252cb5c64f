//! # sfl — stackfile CLI
//!
//! Resolves compose documents into their normalized form: validation,
//! canonical output, and startup ordering. Never talks to a runtime.

mod commands;
mod output;

use clap::Parser;

use crate::commands::Cli;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
        )
        .init();

    let cli = Cli::parse();
    commands::execute(cli)
}
