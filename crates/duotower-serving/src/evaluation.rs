//! Side-by-side qualitative comparison for one user.
//!
//! The harness lines up what a user rated highest, what the model retrieves
//! for them, and what a mean-rating popularity baseline would suggest. With
//! a fused scorer it adds a fourth list scored by raw embeddings only. It is
//! a tool for eyeballing a trained model, not a metric.

use duotower_core::{Interaction, RawId, RecError};
use duotower_layers::PlainEmbeddingScorer;
use duotower_training::RecommenderSession;
use hashbrown::HashSet;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::retrieval::{RetrievalService, ScoredItem, DEFAULT_CHUNK_SIZE};

/// Settings for [`EvaluationHarness`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Users with fewer interactions are never sampled.
    pub min_interactions: usize,
    /// Length of every list in the report.
    pub top_n: usize,
    /// Retrieval chunk size.
    pub chunk_size: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            min_interactions: 20,
            top_n: 10,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// An item from the user's own history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoricalItem {
    /// Dense item index.
    pub item_index: usize,
    /// The user's rating.
    pub rating: f32,
    /// When the rating was given.
    pub timestamp: i64,
}

/// An item of the popularity baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopularItem {
    /// Dense item index.
    pub item_index: usize,
    /// Mean rating across all users.
    pub mean_rating: f32,
    /// Number of ratings.
    pub ratings: usize,
}

/// The lists compared for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Dense user index.
    pub user_index: usize,
    /// Number of interactions the user has.
    pub interactions: usize,
    /// Highest-rated history, most recent first among equal ratings.
    pub history: Vec<HistoricalItem>,
    /// Model retrieval, rated items excluded.
    pub model: Vec<ScoredItem>,
    /// Mean-rating baseline, rated items excluded.
    pub popularity: Vec<PopularItem>,
    /// Raw dot-product retrieval; present only with a fused scorer.
    pub dot_only: Option<Vec<ScoredItem>>,
}

/// Mean rating per item over `interactions`, best first, ties by lower index.
///
/// Items without any rating are left out.
pub fn popularity(interactions: &[Interaction], num_items: usize) -> Vec<PopularItem> {
    let mut sums = vec![0.0f64; num_items];
    let mut counts = vec![0usize; num_items];
    for i in interactions {
        if i.item_index < num_items {
            sums[i.item_index] += f64::from(i.rating);
            counts[i.item_index] += 1;
        }
    }
    let mut items: Vec<PopularItem> = (0..num_items)
        .filter(|&idx| counts[idx] > 0)
        .map(|idx| PopularItem {
            item_index: idx,
            mean_rating: (sums[idx] / counts[idx] as f64) as f32,
            ratings: counts[idx],
        })
        .collect();
    items.sort_by(|a, b| {
        b.mean_rating
            .total_cmp(&a.mean_rating)
            .then(a.item_index.cmp(&b.item_index))
    });
    items
}

/// Builds [`EvaluationReport`]s against a trained session.
#[derive(Debug, Clone)]
pub struct EvaluationHarness<'a> {
    session: &'a RecommenderSession,
    config: EvaluationConfig,
    popularity: Vec<PopularItem>,
}

impl<'a> EvaluationHarness<'a> {
    /// Creates a harness; the popularity baseline is computed once here.
    pub fn new(session: &'a RecommenderSession, config: EvaluationConfig) -> Self {
        let popularity = popularity(session.interactions(), session.items().len());
        Self {
            session,
            config,
            popularity,
        }
    }

    /// User indices with at least `min_interactions` interactions, ascending.
    pub fn qualifying_users(&self) -> Vec<usize> {
        self.session
            .interaction_counts()
            .into_iter()
            .enumerate()
            .filter(|&(_, count)| count >= self.config.min_interactions)
            .map(|(user, _)| user)
            .collect()
    }

    /// Evaluates a user drawn uniformly from the qualifying users.
    ///
    /// # Errors
    ///
    /// [`RecError::InsufficientData`] if no user qualifies.
    pub fn evaluate_random<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<EvaluationReport> {
        let qualified = self.qualifying_users();
        let user = qualified.choose(rng).copied().ok_or_else(|| {
            RecError::insufficient_data(format!(
                "no user has at least {} interactions",
                self.config.min_interactions
            ))
        })?;
        info!(
            user_index = user,
            candidates = qualified.len(),
            "Sampled user for evaluation"
        );
        self.evaluate_user_index(user)
    }

    /// Evaluates the user with raw id `user_id`.
    pub fn evaluate_user(&self, user_id: RawId) -> Result<EvaluationReport> {
        let user = self.session.user_index(user_id)?;
        self.evaluate_user_index(user)
    }

    /// Evaluates one user index.
    pub fn evaluate_user_index(&self, user_index: usize) -> Result<EvaluationReport> {
        let rated = self.session.user_interactions(user_index)?;
        let exclude: HashSet<usize> = rated.iter().map(|i| i.item_index).collect();

        let mut history: Vec<HistoricalItem> = rated
            .iter()
            .map(|i| HistoricalItem {
                item_index: i.item_index,
                rating: i.rating,
                timestamp: i.timestamp,
            })
            .collect();
        history.sort_by(|a, b| {
            b.rating
                .total_cmp(&a.rating)
                .then(b.timestamp.cmp(&a.timestamp))
        });
        history.truncate(self.config.top_n);

        let model = self.session.model();
        let top_n = self.config.top_n;
        let chunk_size = self.config.chunk_size;
        let recommended =
            RetrievalService::new(model).recommend(user_index, &exclude, top_n, chunk_size)?;

        let popular = self
            .popularity
            .iter()
            .filter(|p| !exclude.contains(&p.item_index))
            .take(top_n)
            .copied()
            .collect();

        let dot_only = if model.scorer().is_fused() {
            let plain = PlainEmbeddingScorer;
            Some(
                RetrievalService::with_scorer(model, &plain)
                    .recommend(user_index, &exclude, top_n, chunk_size)?,
            )
        } else {
            None
        };

        Ok(EvaluationReport {
            user_index,
            interactions: rated.len(),
            history,
            model: recommended,
            popularity: popular,
            dot_only,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interaction(user: usize, item: usize, rating: f32) -> Interaction {
        Interaction {
            user_index: user,
            item_index: item,
            rating,
            timestamp: 0,
        }
    }

    #[test]
    fn test_popularity_orders_by_mean_then_index() {
        let log = vec![
            interaction(0, 2, 3.0),
            interaction(1, 2, 5.0),
            interaction(0, 0, 4.0),
            interaction(1, 3, 1.0),
        ];
        let ranked = popularity(&log, 5);
        let order: Vec<usize> = ranked.iter().map(|p| p.item_index).collect();
        assert_eq!(order, vec![0, 2, 3]);
        assert_eq!(ranked[1].ratings, 2);
        assert_eq!(ranked[1].mean_rating, 4.0);
    }

    #[test]
    fn test_popularity_ignores_out_of_range() {
        let log = vec![interaction(0, 9, 5.0)];
        assert!(popularity(&log, 3).is_empty());
    }
}
