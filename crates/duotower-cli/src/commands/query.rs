//! Query Command Implementation

use anyhow::{Context, Result};
use clap::Args;
use duotower_core::RawId;
use duotower_serving::{QueryOutcome, Recommendation, RecommenderService, TextQuery};
use duotower_training::RecommenderSession;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use tracing::warn;

use super::common::{print_json, SessionArgs};

/// Look items up by genre words or title
///
/// Tokens are matched to genres first (`"romantic comedy"`, `"kids"`,
/// `"scifi"`), then the whole text to titles. When neither matches, a model
/// is trained and recommendations for a randomly drawn user are printed
/// instead.
#[derive(Args, Debug, Clone)]
pub struct QueryCommand {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Free-text query
    #[arg(long, short = 't')]
    pub text: String,

    /// Number of items to return
    #[arg(long, short = 'k', default_value = "20")]
    pub top_k: usize,

    /// Seed of the fallback user draw
    #[arg(long, default_value = "0")]
    pub draw_seed: u64,
}

#[derive(Serialize)]
struct Hit {
    item_id: RawId,
    title: String,
    mean_rating: f32,
}

#[derive(Serialize)]
#[serde(tag = "matched_by", rename_all = "snake_case")]
enum QueryOutput {
    Genre { items: Vec<Hit> },
    Title { items: Vec<Hit> },
    ModelFallback {
        user_id: RawId,
        items: Vec<Recommendation>,
    },
}

impl QueryCommand {
    /// Execute the query command
    pub async fn run(&self) -> Result<()> {
        let mut session = self.session.session()?;
        let outcome = TextQuery::new(session.catalog(), session.interactions())
            .recommend_by_text(&self.text, self.top_k)
            .with_context(|| format!("Failed to run query {:?}", self.text))?;

        let output = match &outcome {
            QueryOutcome::Genre(_) => QueryOutput::Genre {
                items: hits(&session, &outcome)?,
            },
            QueryOutcome::Title(_) => QueryOutput::Title {
                items: hits(&session, &outcome)?,
            },
            QueryOutcome::NoMatch => {
                warn!(query = %self.text, "No genre or title matched, falling back to the model");
                session.train().await.context("Training failed")?;
                let mut rng = StdRng::seed_from_u64(self.draw_seed);
                let user_id = *session
                    .users()
                    .ids()
                    .choose(&mut rng)
                    .context("Session has no users")?;
                let items = RecommenderService::new(&session)?
                    .recommend(user_id, self.top_k)
                    .with_context(|| format!("Failed to recommend for user {}", user_id))?;
                QueryOutput::ModelFallback { user_id, items }
            }
        };
        print_json(&output)
    }
}

fn hits(session: &RecommenderSession, outcome: &QueryOutcome) -> Result<Vec<Hit>> {
    outcome
        .hits()
        .iter()
        .map(|h| {
            Ok(Hit {
                item_id: session.item_id(h.item_index)?,
                title: session.item(h.item_index)?.title.clone(),
                mean_rating: h.mean_rating,
            })
        })
        .collect()
}
