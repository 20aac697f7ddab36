//! Recommend Command Implementation

use anyhow::{Context, Result};
use clap::Args;
use duotower_core::RawId;
use duotower_serving::{RecommenderService, DEFAULT_CHUNK_SIZE};
use serde::Serialize;

use super::common::{print_json, SessionArgs};

/// Train, then print the top unseen items for one user
///
/// # Example
///
/// ```bash
/// duotower recommend --data-dir ml-100k --user 196 --top-k 10
/// ```
#[derive(Args, Debug, Clone)]
pub struct RecommendCommand {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Raw user id
    #[arg(long, short = 'u')]
    pub user: RawId,

    /// Number of items to return
    #[arg(long, short = 'k', default_value = "10")]
    pub top_k: usize,

    /// Items scored per retrieval chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,
}

#[derive(Serialize)]
struct RecommendOutput<T: Serialize> {
    user_id: RawId,
    rated: usize,
    recommendations: T,
}

impl RecommendCommand {
    /// Execute the recommend command
    pub async fn run(&self) -> Result<()> {
        let session = self.session.trained_session().await?;
        let service = RecommenderService::new(&session)?.with_chunk_size(self.chunk_size);
        let recommendations = service
            .recommend(self.user, self.top_k)
            .with_context(|| format!("Failed to recommend for user {}", self.user))?;
        let rated = session
            .user_interactions(session.user_index(self.user)?)?
            .len();
        print_json(&RecommendOutput {
            user_id: self.user,
            rated,
            recommendations,
        })
    }
}
