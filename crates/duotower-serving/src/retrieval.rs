//! Top-K retrieval over the full item catalog.
//!
//! The catalog is cut into contiguous chunks of item indices. Chunks are
//! scored in parallel with rayon and concatenated in chunk order; excluded
//! items are dropped before scoring. A chunk that fails is logged and skipped.
//! A [`RetrievalBudget`] is checked before each chunk starts; once it trips no
//! further chunk is scored and the call fails with
//! [`RecError::ResourceExhausted`].
//!
//! Scores go through [`TwoTowerModel::score_items_with`], the same code the
//! rest of the crate uses, so retrieval never drifts from pointwise scoring.

use std::cmp::Ordering as CmpOrdering;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use duotower_core::{EntityKind, RecError};
use duotower_layers::{Scorer, TwoTowerModel};
use hashbrown::HashSet;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, ServingError};

/// Items scored per chunk when the caller does not say otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// One retrieved item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    /// Dense item index.
    pub item_index: usize,
    /// Model score.
    pub score: f32,
}

/// External limit on a retrieval call.
///
/// Clones share the cancellation flag, so a host can keep one clone and
/// cancel an in-flight call from another thread.
#[derive(Debug, Clone, Default)]
pub struct RetrievalBudget {
    cancelled: Arc<AtomicBool>,
    max_chunks: Option<usize>,
}

impl RetrievalBudget {
    /// A budget that never trips until cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows at most `max_chunks` chunks to be scored.
    pub fn with_max_chunks(mut self, max_chunks: usize) -> Self {
        self.max_chunks = Some(max_chunks);
        self
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`RetrievalBudget::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

enum ChunkOutcome {
    Scored(Vec<ScoredItem>),
    Failed,
    Halted,
}

/// Read-only top-K retrieval against a trained model.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalService<'a> {
    model: &'a TwoTowerModel,
    scorer: &'a dyn Scorer,
}

impl<'a> RetrievalService<'a> {
    /// Retrieval with the model's own scorer.
    pub fn new(model: &'a TwoTowerModel) -> Self {
        Self {
            model,
            scorer: model.scorer(),
        }
    }

    /// Retrieval with an explicit scorer over the model's tables.
    pub fn with_scorer(model: &'a TwoTowerModel, scorer: &'a dyn Scorer) -> Self {
        Self { model, scorer }
    }

    /// Top `top_k` items for `user_index`, never including `exclude`.
    ///
    /// Results are sorted by score descending, ties by lower item index.
    ///
    /// # Errors
    ///
    /// - [`RecError::Configuration`] if `top_k` or `chunk_size` is zero
    /// - [`RecError::UnknownIdentifier`] if `user_index` has no row
    pub fn recommend(
        &self,
        user_index: usize,
        exclude: &HashSet<usize>,
        top_k: usize,
        chunk_size: usize,
    ) -> Result<Vec<ScoredItem>> {
        self.recommend_with_budget(user_index, exclude, top_k, chunk_size, None)
    }

    /// Like [`RetrievalService::recommend`], under an external budget.
    ///
    /// # Errors
    ///
    /// Additionally [`RecError::ResourceExhausted`] with the number of chunks
    /// scored when the budget trips.
    pub fn recommend_with_budget(
        &self,
        user_index: usize,
        exclude: &HashSet<usize>,
        top_k: usize,
        chunk_size: usize,
        budget: Option<&RetrievalBudget>,
    ) -> Result<Vec<ScoredItem>> {
        if top_k == 0 {
            return Err(RecError::configuration("top_k must be > 0, got 0").into());
        }
        if chunk_size == 0 {
            return Err(RecError::configuration("chunk_size must be > 0, got 0").into());
        }
        if user_index >= self.model.num_users() {
            return Err(RecError::unknown(EntityKind::User, format!("index {}", user_index)).into());
        }

        let chunks = chunk_ranges(self.model.num_items(), chunk_size);
        let claimed = AtomicUsize::new(0);
        let outcomes: Vec<ChunkOutcome> = chunks
            .par_iter()
            .enumerate()
            .map(|(chunk, range)| {
                if let Some(budget) = budget {
                    if budget.is_cancelled() {
                        return ChunkOutcome::Halted;
                    }
                    if let Some(max) = budget.max_chunks {
                        if claimed.fetch_add(1, Ordering::SeqCst) >= max {
                            return ChunkOutcome::Halted;
                        }
                    }
                }
                let candidates: Vec<usize> =
                    range.clone().filter(|i| !exclude.contains(i)).collect();
                match self.score_chunk(user_index, &candidates) {
                    Ok(scored) => ChunkOutcome::Scored(scored),
                    Err(e) => {
                        warn!(chunk, error = %e, "Skipping retrieval chunk");
                        ChunkOutcome::Failed
                    }
                }
            })
            .collect();

        let chunks_scored = outcomes
            .iter()
            .filter(|o| matches!(o, ChunkOutcome::Scored(_)))
            .count();
        if outcomes.iter().any(|o| matches!(o, ChunkOutcome::Halted)) {
            let message = match budget {
                Some(b) if b.is_cancelled() => "retrieval cancelled".to_string(),
                Some(RetrievalBudget {
                    max_chunks: Some(max),
                    ..
                }) => format!("chunk budget of {} exhausted", max),
                _ => "retrieval budget exhausted".to_string(),
            };
            return Err(RecError::ResourceExhausted {
                chunks_scored,
                message,
            }
            .into());
        }

        let mut scored: Vec<ScoredItem> = outcomes
            .into_iter()
            .filter_map(|o| match o {
                ChunkOutcome::Scored(items) => Some(items),
                _ => None,
            })
            .flatten()
            .collect();
        rank(&mut scored);
        scored.truncate(top_k);
        debug!(
            user_index,
            chunks = chunks.len(),
            returned = scored.len(),
            scorer = self.scorer.name(),
            "Retrieved top items"
        );
        Ok(scored)
    }

    fn score_chunk(&self, user_index: usize, candidates: &[usize]) -> Result<Vec<ScoredItem>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let scores = self
            .model
            .score_items_with(self.scorer, user_index, candidates)?;
        candidates
            .iter()
            .zip(scores)
            .map(|(&item_index, score)| {
                if score.is_finite() {
                    Ok(ScoredItem { item_index, score })
                } else {
                    Err(ServingError::NonFiniteScore { item_index, score })
                }
            })
            .collect()
    }
}

fn chunk_ranges(len: usize, chunk_size: usize) -> Vec<Range<usize>> {
    (0..len)
        .step_by(chunk_size)
        .map(|start| start..(start + chunk_size).min(len))
        .collect()
}

/// Sorts by score descending, ties by lower item index.
pub fn rank(items: &mut [ScoredItem]) {
    items.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(CmpOrdering::Equal)
            .then(a.item_index.cmp(&b.item_index))
    });
}
