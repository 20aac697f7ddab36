//! Feature fusion tower for the item side.
//!
//! The tower refines an item embedding with static side features:
//!
//! ```text
//! h   = relu(concat(embedding, features) @ W1 + b1)
//! out = h @ W2 + b2
//! ```
//!
//! `out` has the embedding dimension, so fused and raw item vectors are
//! interchangeable in the dot-product score.

use duotower_core::{InitializerConfig, RecError};
use duotower_optimizer::OptimizerConfig;
use ndarray::{concatenate, s, Array2, ArrayView1, ArrayView2, Axis};
use rand::RngCore;

use crate::dense::Dense;
use crate::error::{LayerError, LayerResult};

/// Read-only side-feature rows, one per item index.
#[derive(Debug, Clone)]
pub struct SideFeatureTable {
    rows: Array2<f32>,
}

impl SideFeatureTable {
    /// Builds a `num_items x width` table. Items without a row get zeros.
    ///
    /// # Errors
    ///
    /// [`RecError::Configuration`] if a row has the wrong width or an index
    /// is out of range.
    pub fn from_rows<'a, I>(num_items: usize, width: usize, rows: I) -> LayerResult<Self>
    where
        I: IntoIterator<Item = (usize, &'a [f32])>,
    {
        if width == 0 {
            return Err(RecError::configuration("side feature width must be > 0").into());
        }
        let mut table = Array2::zeros((num_items, width));
        for (idx, row) in rows {
            if idx >= num_items {
                return Err(RecError::configuration(format!(
                    "side feature row for item index {} but only {} items",
                    idx, num_items
                ))
                .into());
            }
            if row.len() != width {
                return Err(RecError::configuration(format!(
                    "side feature row for item index {} has width {}, expected {}",
                    idx,
                    row.len(),
                    width
                ))
                .into());
            }
            table.row_mut(idx).assign(&ArrayView1::from(row));
        }
        Ok(Self { rows: table })
    }

    /// Feature width.
    pub fn width(&self) -> usize {
        self.rows.ncols()
    }

    /// Number of item rows.
    pub fn len(&self) -> usize {
        self.rows.nrows()
    }

    /// Returns `true` if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.nrows() == 0
    }

    /// Copies the requested rows in input order.
    pub fn gather(&self, indices: &[usize]) -> LayerResult<Array2<f32>> {
        let mut out = Array2::zeros((indices.len(), self.width()));
        for (mut dst, &idx) in out.rows_mut().into_iter().zip(indices) {
            if idx >= self.len() {
                return Err(RecError::unknown(
                    duotower_core::EntityKind::Item,
                    format!("index {} (side features have {} rows)", idx, self.len()),
                )
                .into());
            }
            dst.assign(&self.rows.row(idx));
        }
        Ok(out)
    }
}

/// Two-layer feed-forward tower mapping `[embedding | side features]` back to
/// the embedding dimension.
#[derive(Debug)]
pub struct FeatureFusionTower {
    embedding_dim: usize,
    side_dim: usize,
    hidden: Dense,
    output: Dense,
    /// Pre-activation of the hidden layer from the last training forward pass.
    cached_pre_activation: Option<Array2<f32>>,
}

impl FeatureFusionTower {
    /// Creates a tower with normal-initialized weights and zero biases.
    pub fn new(
        embedding_dim: usize,
        side_dim: usize,
        hidden_dim: usize,
        init: &InitializerConfig,
        optimizer: &OptimizerConfig,
        rng: &mut dyn RngCore,
    ) -> LayerResult<Self> {
        if embedding_dim == 0 || side_dim == 0 || hidden_dim == 0 {
            return Err(RecError::configuration(format!(
                "fusion tower dimensions must be > 0, got embedding={} side={} hidden={}",
                embedding_dim, side_dim, hidden_dim
            ))
            .into());
        }
        let hidden = Dense::new(embedding_dim + side_dim, hidden_dim, init, optimizer, rng)?;
        let output = Dense::new(hidden_dim, embedding_dim, init, optimizer, rng)?;
        Ok(Self {
            embedding_dim,
            side_dim,
            hidden,
            output,
            cached_pre_activation: None,
        })
    }

    /// Embedding (input and output) dimension.
    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    /// Side-feature width.
    pub fn side_dim(&self) -> usize {
        self.side_dim
    }

    /// Hidden layer width.
    pub fn hidden_dim(&self) -> usize {
        self.hidden.out_features()
    }

    fn concat_input(
        &self,
        embeddings: ArrayView2<'_, f32>,
        features: ArrayView2<'_, f32>,
    ) -> LayerResult<Array2<f32>> {
        if embeddings.ncols() != self.embedding_dim {
            return Err(LayerError::InvalidInputDimension {
                expected: self.embedding_dim,
                actual: embeddings.ncols(),
            });
        }
        if features.ncols() != self.side_dim {
            return Err(LayerError::InvalidInputDimension {
                expected: self.side_dim,
                actual: features.ncols(),
            });
        }
        if features.nrows() != embeddings.nrows() {
            return Err(LayerError::InvalidInputDimension {
                expected: embeddings.nrows(),
                actual: features.nrows(),
            });
        }
        Ok(concatenate(Axis(1), &[embeddings.view(), features.view()])?)
    }

    /// Inference pass: refined vectors for a batch of item rows.
    pub fn fuse(
        &self,
        embeddings: ArrayView2<'_, f32>,
        features: ArrayView2<'_, f32>,
    ) -> LayerResult<Array2<f32>> {
        let input = self.concat_input(embeddings, features)?;
        let h = self.hidden.forward(input.view())?.mapv(relu);
        self.output.forward(h.view())
    }

    /// Training pass; caches what [`FeatureFusionTower::backward`] needs.
    pub fn forward_train(
        &mut self,
        embeddings: ArrayView2<'_, f32>,
        features: ArrayView2<'_, f32>,
    ) -> LayerResult<Array2<f32>> {
        let input = self.concat_input(embeddings, features)?;
        let pre = self.hidden.forward_train(input.view())?;
        let h = pre.mapv(relu);
        let out = self.output.forward_train(h.view())?;
        self.cached_pre_activation = Some(pre);
        Ok(out)
    }

    /// Backpropagates through both layers and returns the gradient with
    /// respect to the embedding part of the input.
    pub fn backward(&mut self, grad: ArrayView2<'_, f32>) -> LayerResult<Array2<f32>> {
        let pre = self
            .cached_pre_activation
            .take()
            .ok_or(LayerError::NotInitialized)?;
        let grad_h = self.output.backward(grad)?;
        let mask = pre.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
        let grad_pre = grad_h * &mask;
        let grad_input = self.hidden.backward(grad_pre.view())?;
        Ok(grad_input.slice(s![.., ..self.embedding_dim]).to_owned())
    }

    /// Steps both layers' optimizers.
    pub fn apply_gradients(&mut self) -> LayerResult<()> {
        self.hidden.apply_gradients()?;
        self.output.apply_gradients()
    }

    /// Drops any cached activations and gradients.
    pub fn clear_cache(&mut self) {
        self.cached_pre_activation = None;
        self.hidden.clear_cache();
        self.output.clear_cache();
    }
}

fn relu(v: f32) -> f32 {
    v.max(0.0)
}
