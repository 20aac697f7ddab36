//! Item-side scoring strategies.
//!
//! A [`Scorer`] turns item table rows into the item vectors that are dotted
//! with user vectors. [`PlainEmbeddingScorer`] uses the rows as they are;
//! [`FusedFeatureScorer`] runs them through a [`FeatureFusionTower`] together
//! with the item's side features. Training and retrieval go through the same
//! scorer, so a score is the same number on both paths.

use std::fmt;

use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::embedding::EmbeddingTable;
use crate::error::{LayerError, LayerResult};
use crate::fusion::{FeatureFusionTower, SideFeatureTable};

/// Score of one (user, item) pair from its vectors and biases.
pub fn pair_score(
    user: ArrayView1<'_, f32>,
    item: ArrayView1<'_, f32>,
    user_bias: f32,
    item_bias: f32,
) -> f32 {
    user.dot(&item) + user_bias + item_bias
}

/// Produces item vectors from item table rows.
pub trait Scorer: Send + Sync + fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether item vectors pass through a fusion tower.
    fn is_fused(&self) -> bool {
        false
    }

    /// Item vectors for inference. `side` overrides the scorer's own side
    /// features when present.
    fn item_vectors(
        &self,
        items: &EmbeddingTable,
        indices: &[usize],
        side: Option<ArrayView2<'_, f32>>,
    ) -> LayerResult<Array2<f32>>;

    /// Item vectors for a training step; caches what `backward` needs.
    fn item_vectors_train(
        &mut self,
        items: &EmbeddingTable,
        indices: &[usize],
        side: Option<ArrayView2<'_, f32>>,
    ) -> LayerResult<Array2<f32>>;

    /// Maps gradients w.r.t. item vectors to gradients w.r.t. item table rows.
    fn backward(&mut self, grad: ArrayView2<'_, f32>) -> LayerResult<Array2<f32>>;

    /// Steps the scorer's own trainable parameters, if any.
    fn apply_gradients(&mut self) -> LayerResult<()>;

    /// Drops anything cached by `item_vectors_train`.
    fn clear_cache(&mut self) {}
}

/// Raw table rows are the item vectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainEmbeddingScorer;

impl Scorer for PlainEmbeddingScorer {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn item_vectors(
        &self,
        items: &EmbeddingTable,
        indices: &[usize],
        _side: Option<ArrayView2<'_, f32>>,
    ) -> LayerResult<Array2<f32>> {
        items.gather(indices)
    }

    fn item_vectors_train(
        &mut self,
        items: &EmbeddingTable,
        indices: &[usize],
        side: Option<ArrayView2<'_, f32>>,
    ) -> LayerResult<Array2<f32>> {
        self.item_vectors(items, indices, side)
    }

    fn backward(&mut self, grad: ArrayView2<'_, f32>) -> LayerResult<Array2<f32>> {
        Ok(grad.to_owned())
    }

    fn apply_gradients(&mut self) -> LayerResult<()> {
        Ok(())
    }
}

/// Item vectors are `tower(row, side_features)`.
#[derive(Debug)]
pub struct FusedFeatureScorer {
    tower: FeatureFusionTower,
    side_features: SideFeatureTable,
}

impl FusedFeatureScorer {
    /// Pairs a tower with the side features of every item index.
    pub fn new(tower: FeatureFusionTower, side_features: SideFeatureTable) -> LayerResult<Self> {
        if tower.side_dim() != side_features.width() {
            return Err(LayerError::InvalidInputDimension {
                expected: tower.side_dim(),
                actual: side_features.width(),
            });
        }
        Ok(Self {
            tower,
            side_features,
        })
    }

    /// The fusion tower.
    pub fn tower(&self) -> &FeatureFusionTower {
        &self.tower
    }

    /// Side features by item index.
    pub fn side_features(&self) -> &SideFeatureTable {
        &self.side_features
    }

    fn features(
        &self,
        indices: &[usize],
        side: Option<ArrayView2<'_, f32>>,
    ) -> LayerResult<Array2<f32>> {
        match side {
            Some(rows) => Ok(rows.to_owned()),
            None => self.side_features.gather(indices),
        }
    }
}

impl Scorer for FusedFeatureScorer {
    fn name(&self) -> &'static str {
        "fused"
    }

    fn is_fused(&self) -> bool {
        true
    }

    fn item_vectors(
        &self,
        items: &EmbeddingTable,
        indices: &[usize],
        side: Option<ArrayView2<'_, f32>>,
    ) -> LayerResult<Array2<f32>> {
        let rows = items.gather(indices)?;
        let features = self.features(indices, side)?;
        self.tower.fuse(rows.view(), features.view())
    }

    fn item_vectors_train(
        &mut self,
        items: &EmbeddingTable,
        indices: &[usize],
        side: Option<ArrayView2<'_, f32>>,
    ) -> LayerResult<Array2<f32>> {
        let rows = items.gather(indices)?;
        let features = self.features(indices, side)?;
        self.tower.forward_train(rows.view(), features.view())
    }

    fn backward(&mut self, grad: ArrayView2<'_, f32>) -> LayerResult<Array2<f32>> {
        self.tower.backward(grad)
    }

    fn apply_gradients(&mut self) -> LayerResult<()> {
        self.tower.apply_gradients()
    }

    fn clear_cache(&mut self) {
        self.tower.clear_cache();
    }
}
