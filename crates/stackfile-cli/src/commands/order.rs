//! `sfl order` — print services in dependency startup order.

use clap::Args;

use crate::commands::Source;

/// Arguments for the `order` subcommand.
#[derive(Args, Debug)]
pub struct OrderArgs {
    /// Print one service per line without positions.
    #[arg(long)]
    pub plain: bool,
}

/// Executes the `order` command.
///
/// # Errors
///
/// Returns an error when resolution fails or `depends_on` edges form a
/// cycle.
pub fn execute(source: &Source, args: OrderArgs) -> anyhow::Result<()> {
    let project = source.resolve()?;
    let order = project.startup_order()?;

    for (position, id) in order.iter().enumerate() {
        let name = &project.service(*id).name;
        if args.plain {
            println!("{name}");
        } else {
            println!("{}. {name}", position + 1);
        }
    }
    Ok(())
}
