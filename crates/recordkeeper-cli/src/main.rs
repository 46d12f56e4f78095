//! RecordKeeper CLI - operator interface to the record store
//!
//! Provides commands for:
//! - Creating records behind the consent gate
//! - Rectifying and erasing records
//! - Compiling subject access exports
//! - Reading and verifying a record's audit trail
//! - Running a retention sweep by hand
//! - Inspecting the configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use recordkeeper_core::{config::Config, domain::LifecycleError};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    audit::AuditCommand,
    config::ConfigCommand,
    create::CreateCommand,
    erase::EraseCommand,
    export::ExportCommand,
    rectify::RectifyCommand,
    show::ShowCommand,
    sweep::SweepCommand,
    CommandContext,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "recordkeeper",
    version,
    about = "Personal-data record lifecycle and audit trail"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Actor recorded on audit entries written by this invocation
    #[arg(long, global = true, default_value = "operator")]
    actor: String,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a record after checking marketing consent
    Create(CreateCommand),
    /// Correct or clear personal-data fields of a record
    Rectify(RectifyCommand),
    /// Erase a record's personal data
    Erase(EraseCommand),
    /// Compile a subject access export of a record
    Export(ExportCommand),
    /// Show one record (audited) or list records
    Show(ShowCommand),
    /// Read and verify a record's audit trail
    Audit(AuditCommand),
    /// Erase every record past its scheduled deletion
    Sweep(SweepCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);

    // Setup tracing
    let filter = if cli.quiet {
        "error".to_string()
    } else {
        match cli.verbose {
            0 => config.logging.level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let ctx = CommandContext::new(config_path, config, cli.actor.clone());

    let result = match cli.command {
        Commands::Create(cmd) => cmd.execute(&ctx, format).await,
        Commands::Rectify(cmd) => cmd.execute(&ctx, format).await,
        Commands::Erase(cmd) => cmd.execute(&ctx, format).await,
        Commands::Export(cmd) => cmd.execute(&ctx, format).await,
        Commands::Show(cmd) => cmd.execute(&ctx, format).await,
        Commands::Audit(cmd) => cmd.execute(&ctx, format).await,
        Commands::Sweep(cmd) => cmd.execute(&ctx, format).await,
        Commands::Config(cmd) => cmd.execute(&ctx, format).await,
    };

    if let Err(e) = result {
        let printer = format.printer();
        match e.downcast_ref::<LifecycleError>() {
            Some(lifecycle) => printer.failure(lifecycle.code(), &format!("{:#}", e)),
            None => printer.error(&format!("{:#}", e)),
        }
        std::process::exit(1);
    }

    Ok(())
}
