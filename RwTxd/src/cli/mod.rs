//! RwTxd CLI - Command-line interface for texture dictionary tools

pub mod commands;
pub mod progress;

use std::path::PathBuf;

use clap::Parser;
use commands::Commands;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rwtxd")]
#[command(about = "RwTxd: RenderWare texture dictionary tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser)]
#[command(name = "massconv")]
#[command(about = "Convert every texture dictionary below a game directory", long_about = None)]
struct MassConvCli {
    /// Configuration file with a [Main] section
    config: PathBuf,
}

/// Log to stderr, filtered by `RUST_LOG` (warnings and up by default).
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Run the rwtxd CLI
pub fn run_cli() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();
    cli.command.execute()?;

    Ok(())
}

/// Run the massconv batch driver.
///
/// Fails only when the run cannot start: an unreadable configuration, a
/// missing game root or a cancelled run. Files that fail to convert are
/// reported and skipped.
pub fn run_massconv() -> anyhow::Result<()> {
    init_logging();

    let cli = MassConvCli::parse();
    commands::mass::execute(&cli.config, None, true)
}
