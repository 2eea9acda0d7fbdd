mod commands;
mod scan;
mod display;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "driftwatch")]
#[command(about = "Dependency drift analyzer", long_about = None)]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser)]
enum Commands {
    #[command(about = "Report drift, advisories and release history for direct dependencies")]
    Check(commands::Check),

    #[command(about = "List supported ecosystems and package managers")]
    Ecosystems(commands::Ecosystems),
}

/// Logs go to stderr so `--json` output stays parseable.
fn init_tracing(level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    match cli.command {
        Commands::Check(cmd) => {
            cmd.run().await?;
        }
        Commands::Ecosystems(cmd) => {
            cmd.run();
        }
    }

    Ok(())
}
