//! CLI command definitions and dispatch.

pub mod config;
pub mod order;
pub mod validate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stackfile_common::options::{ResolveOptions, UndefinedVarPolicy};
use stackfile_compose::model::Project;

/// stackfile — compose document resolver.
#[derive(Parser, Debug)]
#[command(name = "sfl", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Path to the compose file. Defaults to the first of compose.yaml,
    /// compose.yml, docker-compose.yaml, docker-compose.yml found in the
    /// current directory.
    #[arg(short, long, global = true)]
    pub file: Option<PathBuf>,

    /// Fail on undefined interpolation variables instead of
    /// substituting the empty string.
    #[arg(long, global = true)]
    pub strict_vars: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve the document and print the normalized model.
    Config(config::ConfigArgs),
    /// Check the document and report every error found.
    Validate(validate::ValidateArgs),
    /// Print services in dependency startup order.
    Order(order::OrderArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let source = Source::locate(cli.file, cli.strict_vars)?;
    match cli.command {
        Command::Config(args) => config::execute(&source, args),
        Command::Validate(args) => validate::execute(&source, args),
        Command::Order(args) => order::execute(&source, args),
    }
}

/// The document a command operates on, with its resolution options.
pub struct Source {
    /// Path of the compose file.
    pub path: PathBuf,
    /// Options derived from the file location and global flags.
    pub opts: ResolveOptions,
}

impl Source {
    fn locate(file: Option<PathBuf>, strict_vars: bool) -> anyhow::Result<Self> {
        let path = match file {
            Some(path) => path,
            None => {
                let cwd = std::env::current_dir()?;
                stackfile_compose::loader::locate_default(&cwd)?
            }
        };
        let working_dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), PathBuf::from);
        let mut opts = ResolveOptions::from_env(working_dir);
        if strict_vars {
            opts = opts.with_undefined_vars(UndefinedVarPolicy::Error);
        }
        Ok(Self { path, opts })
    }

    /// Runs the full resolution pipeline on the document.
    ///
    /// # Errors
    ///
    /// Returns one error carrying every collected resolution failure.
    pub fn resolve(&self) -> anyhow::Result<Project> {
        stackfile_compose::resolve_file(&self.path, &self.opts)
            .map_err(|errors| anyhow::anyhow!("{errors}"))
    }
}
