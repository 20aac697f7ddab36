//! Evaluate Command Implementation

use anyhow::{Context, Result};
use clap::Args;
use duotower_core::RawId;
use duotower_serving::{EvaluationConfig, EvaluationReport, RecommenderService};
use duotower_training::RecommenderSession;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use super::common::{print_json, SessionArgs};

/// Train, then compare a user's history with model and popularity lists
///
/// Without `--user` a user with at least `--min-interactions` ratings is
/// drawn at random.
#[derive(Args, Debug, Clone)]
pub struct EvaluateCommand {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Evaluate this raw user id instead of a random one
    #[arg(long, short = 'u')]
    pub user: Option<RawId>,

    /// Minimum ratings for a user to be drawn
    #[arg(long, default_value = "20")]
    pub min_interactions: usize,

    /// Length of every list
    #[arg(long, default_value = "10")]
    pub top_n: usize,

    /// Seed of the user draw
    #[arg(long, default_value = "0")]
    pub draw_seed: u64,
}

#[derive(Serialize)]
struct Entry {
    item_id: RawId,
    title: String,
    value: f32,
}

#[derive(Serialize)]
struct EvaluateOutput {
    user_id: RawId,
    interactions: usize,
    history: Vec<Entry>,
    model: Vec<Entry>,
    popularity: Vec<Entry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dot_only: Option<Vec<Entry>>,
}

impl EvaluateCommand {
    /// Execute the evaluate command
    pub async fn run(&self) -> Result<()> {
        let session = self.session.trained_session().await?;
        let service = RecommenderService::new(&session)?;
        let harness = service.harness(EvaluationConfig {
            min_interactions: self.min_interactions,
            top_n: self.top_n,
            ..EvaluationConfig::default()
        });
        let report = match self.user {
            Some(user) => harness
                .evaluate_user(user)
                .with_context(|| format!("Failed to evaluate user {}", user))?,
            None => {
                let mut rng = StdRng::seed_from_u64(self.draw_seed);
                harness
                    .evaluate_random(&mut rng)
                    .context("Failed to draw a user for evaluation")?
            }
        };
        print_json(&render(&session, report)?)
    }
}

fn render(session: &RecommenderSession, report: EvaluationReport) -> Result<EvaluateOutput> {
    let entry = |item_index: usize, value: f32| -> Result<Entry> {
        Ok(Entry {
            item_id: session.item_id(item_index)?,
            title: session.item(item_index)?.title.clone(),
            value,
        })
    };
    let dot_only = report
        .dot_only
        .map(|list| {
            list.iter()
                .map(|s| entry(s.item_index, s.score))
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?;
    Ok(EvaluateOutput {
        user_id: *session.users().id_of(report.user_index)?,
        interactions: report.interactions,
        history: report
            .history
            .iter()
            .map(|h| entry(h.item_index, h.rating))
            .collect::<Result<_>>()?,
        model: report
            .model
            .iter()
            .map(|s| entry(s.item_index, s.score))
            .collect::<Result<_>>()?,
        popularity: report
            .popularity
            .iter()
            .map(|p| entry(p.item_index, p.mean_rating))
            .collect::<Result<_>>()?,
        dot_only,
    })
}
