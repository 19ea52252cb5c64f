//! `sfl validate` — check the document and report every error.

use clap::Args;

use crate::commands::Source;

/// Arguments for the `validate` subcommand.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Print nothing on success.
    #[arg(short, long)]
    pub quiet: bool,
}

/// Executes the `validate` command.
///
/// # Errors
///
/// Returns an error listing every failure when the document does not
/// resolve.
pub fn execute(source: &Source, args: ValidateArgs) -> anyhow::Result<()> {
    match stackfile_compose::resolve_file(&source.path, &source.opts) {
        Ok(project) => {
            if !args.quiet {
                println!(
                    "{}: {} service(s), no problems found",
                    source.path.display(),
                    project.services.len()
                );
            }
            Ok(())
        }
        Err(errors) => {
            for error in errors.errors() {
                eprintln!("error: {error}");
            }
            anyhow::bail!(
                "{}: {} problem(s) found",
                source.path.display(),
                errors.len()
            )
        }
    }
}
