//! The two-tower model: embedding store, item scorer and training objective.
//!
//! [`TwoTowerModel::train_step`] is the only code path that mutates the
//! store. It gathers, runs the loss, and applies gradients only when every
//! earlier stage succeeded; on failure the scorer's cached activations are
//! dropped and no parameter changes.

use duotower_core::LossMode;
use ndarray::{concatenate, Array2, ArrayView2, Axis};
use tracing::debug;

use crate::embedding::EmbeddingStore;
use crate::error::LayerResult;
use crate::loss::{bpr, in_batch_softmax, LossGradients, StepContext};
use crate::scorer::{pair_score, Scorer};

/// Borrowed view of one mini-batch, ready for a gradient step.
#[derive(Debug, Clone, Copy)]
pub struct StepInput<'a> {
    /// User index per example.
    pub users: &'a [usize],
    /// Positive item index per example.
    pub positives: &'a [usize],
    /// Negative item index per example (pairwise loss only).
    pub negatives: Option<&'a [usize]>,
    /// Side-feature rows of the positives.
    pub positive_side: Option<ArrayView2<'a, f32>>,
    /// Side-feature rows of the negatives.
    pub negative_side: Option<ArrayView2<'a, f32>>,
}

/// Embedding store plus scorer plus loss.
#[derive(Debug)]
pub struct TwoTowerModel {
    store: EmbeddingStore,
    scorer: Box<dyn Scorer>,
    loss_mode: LossMode,
}

impl TwoTowerModel {
    /// Assembles a model.
    pub fn new(store: EmbeddingStore, scorer: Box<dyn Scorer>, loss_mode: LossMode) -> Self {
        Self {
            store,
            scorer,
            loss_mode,
        }
    }

    /// The embedding tables.
    pub fn store(&self) -> &EmbeddingStore {
        &self.store
    }

    /// The item scorer.
    pub fn scorer(&self) -> &dyn Scorer {
        self.scorer.as_ref()
    }

    /// The training objective.
    pub fn loss_mode(&self) -> LossMode {
        self.loss_mode
    }

    /// Number of user rows.
    pub fn num_users(&self) -> usize {
        self.store.users().num_rows()
    }

    /// Number of item rows.
    pub fn num_items(&self) -> usize {
        self.store.items().num_rows()
    }

    /// Item vectors as the configured scorer sees them.
    pub fn item_vectors(&self, items: &[usize]) -> LayerResult<Array2<f32>> {
        self.scorer.item_vectors(self.store.items(), items, None)
    }

    /// Scores one user against a list of items with the configured scorer.
    pub fn score_items(&self, user: usize, items: &[usize]) -> LayerResult<Vec<f32>> {
        self.score_items_with(self.scorer.as_ref(), user, items)
    }

    /// Scores one user against a list of items with an explicit scorer.
    ///
    /// Used to compare the configured scorer against a plain dot product over
    /// the same tables.
    pub fn score_items_with(
        &self,
        scorer: &dyn Scorer,
        user: usize,
        items: &[usize],
    ) -> LayerResult<Vec<f32>> {
        let user_vec = self.store.users().row(user)?;
        let user_bias = self.store.users().bias(user)?;
        let item_vecs = scorer.item_vectors(self.store.items(), items, None)?;
        let item_bias = self.store.items().bias_gather(items)?;
        Ok(item_vecs
            .rows()
            .into_iter()
            .zip(item_bias.iter())
            .map(|(item, &b)| pair_score(user_vec, item, user_bias, b))
            .collect())
    }

    /// Runs one optimizer step and returns the batch loss.
    pub fn train_step(&mut self, input: &StepInput<'_>, ctx: StepContext) -> LayerResult<f32> {
        let result = self.compute_and_apply(input, ctx);
        if result.is_err() {
            self.scorer.clear_cache();
        }
        result
    }

    fn compute_and_apply(&mut self, input: &StepInput<'_>, ctx: StepContext) -> LayerResult<f32> {
        let b = input.users.len();
        if input.positives.len() != b {
            return Err(ctx.shape_mismatch(b, input.positives.len()).into());
        }

        let (item_indices, side) = match self.loss_mode {
            LossMode::InBatchSoftmax => (
                input.positives.to_vec(),
                input.positive_side.map(|s| s.to_owned()),
            ),
            LossMode::Bpr => {
                let negatives = input.negatives.unwrap_or(&[]);
                if negatives.len() != b {
                    return Err(ctx.shape_mismatch(b, negatives.len()).into());
                }
                let indices = input
                    .positives
                    .iter()
                    .chain(negatives)
                    .copied()
                    .collect::<Vec<_>>();
                let side = match (input.positive_side, input.negative_side) {
                    (Some(p), Some(n)) => Some(concatenate(Axis(0), &[p, n])?),
                    _ => None,
                };
                (indices, side)
            }
        };
        if let Some(rows) = &side {
            if rows.nrows() != item_indices.len() {
                return Err(ctx.shape_mismatch(item_indices.len(), rows.nrows()).into());
            }
        }

        let users = self.store.users().gather(input.users)?;
        let user_bias = self.store.users().bias_gather(input.users)?;
        let items = self.scorer.item_vectors_train(
            self.store.items(),
            &item_indices,
            side.as_ref().map(|s| s.view()),
        )?;
        let item_bias = self.store.items().bias_gather(&item_indices)?;

        let grads: LossGradients = match self.loss_mode {
            LossMode::InBatchSoftmax => in_batch_softmax(
                users.view(),
                items.view(),
                user_bias.view(),
                item_bias.view(),
                input.positives,
                ctx,
            )?,
            LossMode::Bpr => bpr(
                users.view(),
                items.view(),
                user_bias.view(),
                item_bias.view(),
                ctx,
            )?,
        };
        let item_row_grads = self.scorer.backward(grads.items.view())?;

        self.store.users_mut().apply_gradients(
            input.users,
            grads.users.view(),
            Some(grads.user_bias.view()),
        )?;
        self.store.items_mut().apply_gradients(
            &item_indices,
            item_row_grads.view(),
            Some(grads.item_bias.view()),
        )?;
        self.scorer.apply_gradients()?;

        debug!(
            epoch = ctx.epoch,
            batch = ctx.batch,
            loss = grads.loss,
            "Applied gradient step"
        );
        Ok(grads.loss)
    }
}
