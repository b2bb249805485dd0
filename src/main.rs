use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

mod cli;
mod config;
mod error;
mod output;
mod provider;
mod reasoning;
mod research;
mod state;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing - only show logs with --verbose
    let filter = if cli.verbose {
        EnvFilter::new("axiom=debug")
    } else {
        EnvFilter::new("axiom=warn")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => cli::run::execute(args).await,
        Commands::Resume(args) => cli::resume::execute(args).await,
        Commands::Schema => cli::schema::execute(),
    }
}
