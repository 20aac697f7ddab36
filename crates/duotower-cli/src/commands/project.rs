//! Project Command Implementation

use anyhow::{Context, Result};
use clap::Args;
use duotower_serving::{ProjectorConfig, RecommenderService};

use super::common::{print_json, SessionArgs};

/// Train, then print 2D coordinates of the first `--sample-size` items
#[derive(Args, Debug, Clone)]
pub struct ProjectCommand {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Number of items to project
    #[arg(long, short = 'n', default_value = "200")]
    pub sample_size: usize,

    /// Power iterations per component
    #[arg(long, default_value = "40")]
    pub iterations: usize,
}

impl ProjectCommand {
    /// Execute the project command
    pub async fn run(&self) -> Result<()> {
        let session = self.session.trained_session().await?;
        let service = RecommenderService::new(&session)?;
        let config = ProjectorConfig {
            iterations: self.iterations,
            seed: session.config().seed,
        };
        let points = service
            .project(self.sample_size, config)
            .context("Failed to project item vectors")?;
        print_json(&points)
    }
}
