//! `trainsh` - an interactive shell over stateless remote transports.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trainsh_cli::{Config, Shell, history};
use trainsh_session::SessionRegistry;

#[derive(Debug, Parser)]
#[command(name = "trainsh", version, about)]
struct Cli {
    /// Config file, defaults to ~/.trainsh/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, overrides the config file (RUST_LOG wins over both)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Open an interactive shell on a target, e.g. docker://d9443b195d16
    Connect {
        #[arg(env = "TARGET")]
        url: String,
    },
    /// Print platform details and latency of a target
    Detect {
        #[arg(env = "TARGET")]
        url: String,
    },
    /// List the available transport schemes
    ListTransports,
    /// Print version information
    Version,
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    init_tracing(cli.log_level.as_deref().unwrap_or(&config.log_level));

    let registry = SessionRegistry::new(trainsh_transport::default_registry());
    match cli.command {
        Command::Connect { url } => {
            let mut shell = Shell::new(registry, config, std::io::stdout());
            if let Some(path) = history::default_path() {
                shell = shell.with_history_file(path);
            }
            shell.connect(&url).await?;
            shell.detect().await?;
            shell.run_loop(BufReader::new(tokio::io::stdin())).await?;
        }
        Command::Detect { url } => {
            let mut shell = Shell::new(registry, config, std::io::stdout());
            shell.connect(&url).await?;
            let detected = shell.detect().await;
            shell.registry().close_all().await;
            detected?;
        }
        Command::ListTransports => {
            for scheme in registry.transports().schemes() {
                println!("{scheme}");
            }
        }
        Command::Version => {
            println!(
                "{} {} ({}-{})",
                trainsh_cli::PRODUCT,
                env!("CARGO_PKG_VERSION"),
                std::env::consts::OS,
                std::env::consts::ARCH
            );
        }
    }
    Ok(())
}
