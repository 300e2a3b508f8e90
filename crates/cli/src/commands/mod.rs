// CLI subcommand dispatch.

use clap::Subcommand;

use crate::output::OutputFormat;

pub mod explain;
pub mod filter_view;

#[derive(Subcommand)]
pub enum Command {
    /// Print the secured listing and count statements for a search
    Explain(explain::ExplainArgs),
    /// Prune a case view to what a role set may see and trigger
    FilterView(filter_view::FilterViewArgs),
}

pub fn run(command: Command, format: OutputFormat) -> anyhow::Result<()> {
    match command {
        Command::Explain(args) => explain::run(args, format),
        Command::FilterView(args) => filter_view::run(args, format),
    }
}
