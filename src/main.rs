use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use plaid2csv::core::log::init_logging;

#[derive(Parser)]
#[command(version, about = "Export Plaid transactions and investments to CSV")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Request activity for every configured item and append it as CSV
    Export(plaid2csv::ExportArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => plaid2csv::cli::setup::setup(),
        Some(Commands::Export(args)) => {
            plaid2csv::run_command(
                plaid2csv::AppCommand::Export(args),
                cli.config_path.as_deref(),
            )
            .await
        }
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
