//! `sfl config` — resolve the document and print the normalized model.

use std::path::PathBuf;

use clap::Args;

use crate::commands::Source;
use crate::output::{Format, render_project};

/// Arguments for the `config` subcommand.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Output format.
    #[arg(long, value_enum, default_value_t = Format::Yaml)]
    pub format: Format,

    /// Write output to a file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Executes the `config` command.
///
/// # Errors
///
/// Returns an error when resolution fails or the output cannot be
/// written.
pub fn execute(source: &Source, args: ConfigArgs) -> anyhow::Result<()> {
    tracing::info!(path = %source.path.display(), "resolving document");
    let project = source.resolve()?;
    let rendered = render_project(&project, args.format)?;

    match args.output {
        Some(out_path) => {
            std::fs::write(&out_path, &rendered)?;
            println!("Resolved {} -> {}", source.path.display(), out_path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}
