pub mod cli;
pub mod core;
pub mod providers;

use anyhow::Result;
use tracing::info;

pub use cli::export::ExportArgs;

pub enum AppCommand {
    Export(ExportArgs),
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("plaid2csv starting...");

    match command {
        AppCommand::Export(args) => cli::export::run(args, config_path).await,
    }
}
