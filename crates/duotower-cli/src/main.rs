//! duotower CLI - train a two-tower recommender on a MovieLens directory and
//! query it.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use duotower_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays valid JSON.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("duotower=info".parse()?))
        .init();

    let cli = Cli::parse();

    info!("duotower starting");

    match cli.command {
        Commands::Train(cmd) => cmd.run().await?,
        Commands::Recommend(cmd) => cmd.run().await?,
        Commands::Evaluate(cmd) => cmd.run().await?,
        Commands::Project(cmd) => cmd.run().await?,
        Commands::Query(cmd) => cmd.run().await?,
    }

    info!("duotower finished");
    Ok(())
}
