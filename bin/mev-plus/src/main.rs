mod cmd;
mod config;
mod error;

use clap::{Parser, Subcommand};
use error::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[clap(author, version, about = "a modular, validator-facing MEV proxy", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Run(cmd::run::Command),
    Debug(cmd::debug::Command),
}

fn setup_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into())))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() {
    setup_logging();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(cmd) => cmd.execute().await,
        Commands::Debug(cmd) => cmd.execute().await,
    };

    if let Err(err) = result {
        report_and_exit(err);
    }
}

/// Exit code `1` on any start-up failure, `0` on clean shutdown (spec,
/// external interfaces table).
fn report_and_exit(err: Error) -> ! {
    tracing::error!(%err, "exiting");
    std::process::exit(1);
}
