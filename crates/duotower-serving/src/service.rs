//! Raw-id facade over a trained session.
//!
//! Everything below this module speaks dense indices. [`RecommenderService`]
//! translates raw user and item ids through the session's registries and
//! attaches catalog titles, which is what the command line prints.

use duotower_core::{RawId, RecError};
use duotower_training::RecommenderSession;
use hashbrown::HashSet;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::evaluation::{EvaluationConfig, EvaluationHarness, EvaluationReport};
use crate::projector::{EmbeddingProjector, ProjectorConfig};
use crate::query::{QueryOutcome, TextQuery};
use crate::retrieval::{RetrievalBudget, RetrievalService, ScoredItem, DEFAULT_CHUNK_SIZE};

/// A retrieved item in raw-id terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Raw item id.
    pub item_id: RawId,
    /// Catalog title.
    pub title: String,
    /// Model score.
    pub score: f32,
}

/// A projected item in raw-id terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedItem {
    /// Raw item id.
    pub item_id: RawId,
    /// Catalog title.
    pub title: String,
    /// First principal coordinate.
    pub x: f32,
    /// Second principal coordinate.
    pub y: f32,
}

/// Serving entry points over a trained [`RecommenderSession`].
#[derive(Debug, Clone, Copy)]
pub struct RecommenderService<'a> {
    session: &'a RecommenderSession,
    chunk_size: usize,
}

impl<'a> RecommenderService<'a> {
    /// Wraps a session.
    ///
    /// # Errors
    ///
    /// [`RecError::Configuration`] if the session has not completed a
    /// training run.
    pub fn new(session: &'a RecommenderSession) -> Result<Self> {
        if !session.is_trained() {
            return Err(RecError::configuration("session has not been trained").into());
        }
        Ok(Self {
            session,
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Sets the retrieval chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// The wrapped session.
    pub fn session(&self) -> &'a RecommenderSession {
        self.session
    }

    /// Top `top_k` items for raw user `user_id`, excluding everything they rated.
    pub fn recommend(&self, user_id: RawId, top_k: usize) -> Result<Vec<Recommendation>> {
        self.recommend_inner(user_id, top_k, None)
    }

    /// Like [`RecommenderService::recommend`], under an external budget.
    pub fn recommend_with_budget(
        &self,
        user_id: RawId,
        top_k: usize,
        budget: &RetrievalBudget,
    ) -> Result<Vec<Recommendation>> {
        self.recommend_inner(user_id, top_k, Some(budget))
    }

    fn recommend_inner(
        &self,
        user_id: RawId,
        top_k: usize,
        budget: Option<&RetrievalBudget>,
    ) -> Result<Vec<Recommendation>> {
        let user = self.session.user_index(user_id)?;
        let exclude: HashSet<usize> = self
            .session
            .user_interactions(user)?
            .iter()
            .map(|i| i.item_index)
            .collect();
        let scored = RetrievalService::new(self.session.model()).recommend_with_budget(
            user,
            &exclude,
            top_k,
            self.chunk_size,
            budget,
        )?;
        scored.iter().map(|s| self.describe(s)).collect()
    }

    /// Scores raw items for a raw user, in input order.
    pub fn score(&self, user_id: RawId, item_ids: &[RawId]) -> Result<Vec<f32>> {
        let user = self.session.user_index(user_id)?;
        let items = item_ids
            .iter()
            .map(|id| self.session.items().index_of(id))
            .collect::<duotower_core::Result<Vec<_>>>()?;
        Ok(self.session.model().score_items(user, &items)?)
    }

    /// Two-dimensional coordinates for the first `sample_size` items.
    pub fn project(&self, sample_size: usize, config: ProjectorConfig) -> Result<Vec<ProjectedItem>> {
        let points =
            EmbeddingProjector::new(config).project_model(self.session.model(), sample_size)?;
        points
            .into_iter()
            .map(|p| {
                Ok(ProjectedItem {
                    item_id: self.session.item_id(p.item_index)?,
                    title: self.session.item(p.item_index)?.title.clone(),
                    x: p.x,
                    y: p.y,
                })
            })
            .collect()
    }

    /// Evaluation harness over this session.
    pub fn harness(&self, config: EvaluationConfig) -> EvaluationHarness<'a> {
        EvaluationHarness::new(self.session, config)
    }

    /// Evaluates a randomly drawn qualifying user.
    pub fn evaluate<R: Rng + ?Sized>(
        &self,
        config: EvaluationConfig,
        rng: &mut R,
    ) -> Result<EvaluationReport> {
        self.harness(config).evaluate_random(rng)
    }

    /// Resolves a free-text query against the catalog.
    pub fn query(&self, text: &str, top_k: usize) -> Result<QueryOutcome> {
        TextQuery::new(self.session.catalog(), self.session.interactions())
            .recommend_by_text(text, top_k)
    }

    /// Raw id and title of a scored item.
    pub fn describe(&self, scored: &ScoredItem) -> Result<Recommendation> {
        Ok(Recommendation {
            item_id: self.session.item_id(scored.item_index)?,
            title: self.session.item(scored.item_index)?.title.clone(),
            score: scored.score,
        })
    }
}
