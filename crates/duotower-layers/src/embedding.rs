//! Trainable embedding tables.
//!
//! An [`EmbeddingTable`] is a dense `num_rows x dim` matrix of `f32` plus an
//! optional per-row scalar bias. Rows are addressed by the dense indices an
//! [`IndexRegistry`](duotower_core::IndexRegistry) hands out; the table never
//! grows after construction.
//!
//! Reads ([`gather`](EmbeddingTable::gather), [`bias_gather`](EmbeddingTable::bias_gather))
//! return copies. The only way to mutate a table is
//! [`apply_gradients`](EmbeddingTable::apply_gradients), which runs the table's
//! own optimizers.
//!
//! # Example
//!
//! ```
//! use duotower_core::{EntityKind, InitializerConfig};
//! use duotower_layers::embedding::EmbeddingTable;
//! use duotower_optimizer::OptimizerConfig;
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let mut rng = StdRng::seed_from_u64(0);
//! let table = EmbeddingTable::new(
//!     EntityKind::User,
//!     4,
//!     8,
//!     &InitializerConfig::default(),
//!     true,
//!     &OptimizerConfig::default(),
//!     &mut rng,
//! )
//! .unwrap();
//!
//! let rows = table.gather(&[3, 0, 3]).unwrap();
//! assert_eq!(rows.dim(), (3, 8));
//! assert_eq!(rows.row(0), rows.row(2));
//! assert!(table.gather(&[4]).is_err());
//! ```

use std::fmt;

use duotower_core::{EntityKind, InitializerConfig, RecError};
use duotower_optimizer::{create_optimizer, OptimizerConfig, OptimizerDyn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::RngCore;

use crate::error::{LayerError, LayerResult};
use crate::initializer::create_initializer;

/// A trainable `num_rows x dim` table with an optional bias column.
pub struct EmbeddingTable {
    kind: EntityKind,
    num_rows: usize,
    dim: usize,
    /// Row-major `num_rows * dim` values.
    weights: Vec<f32>,
    bias: Option<Vec<f32>>,
    weight_optimizer: Box<dyn OptimizerDyn>,
    bias_optimizer: Option<Box<dyn OptimizerDyn>>,
}

impl fmt::Debug for EmbeddingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingTable")
            .field("kind", &self.kind)
            .field("num_rows", &self.num_rows)
            .field("dim", &self.dim)
            .field("has_bias", &self.bias.is_some())
            .field("optimizer", &self.weight_optimizer.config().name())
            .finish()
    }
}

impl EmbeddingTable {
    /// Creates a table with initialized weights and zero biases.
    ///
    /// # Errors
    ///
    /// [`RecError::Configuration`] if `num_rows` or `dim` is zero or the
    /// initializer is invalid; [`LayerError::Optimizer`] if the optimizer
    /// configuration is rejected.
    pub fn new(
        kind: EntityKind,
        num_rows: usize,
        dim: usize,
        init: &InitializerConfig,
        use_bias: bool,
        optimizer: &OptimizerConfig,
        rng: &mut dyn RngCore,
    ) -> LayerResult<Self> {
        if num_rows == 0 {
            return Err(
                RecError::configuration(format!("{} table needs at least one row", kind)).into(),
            );
        }
        if dim == 0 {
            return Err(RecError::configuration(format!(
                "{} embedding dimension must be > 0, got 0",
                kind
            ))
            .into());
        }
        init.validate()?;

        let weights = create_initializer(init).initialize(num_rows * dim, rng);
        let (bias, bias_optimizer) = if use_bias {
            (
                Some(vec![0.0; num_rows]),
                Some(create_optimizer(optimizer.clone())?),
            )
        } else {
            (None, None)
        };

        Ok(Self {
            kind,
            num_rows,
            dim,
            weights,
            bias,
            weight_optimizer: create_optimizer(optimizer.clone())?,
            bias_optimizer,
        })
    }

    /// Which entity this table embeds.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Embedding dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Whether the table carries a bias column.
    pub fn has_bias(&self) -> bool {
        self.bias.is_some()
    }

    fn check(&self, index: usize) -> LayerResult<()> {
        if index >= self.num_rows {
            return Err(RecError::unknown(
                self.kind,
                format!("index {} (table has {} rows)", index, self.num_rows),
            )
            .into());
        }
        Ok(())
    }

    /// Borrows one row.
    pub fn row(&self, index: usize) -> LayerResult<ArrayView1<'_, f32>> {
        self.check(index)?;
        let start = index * self.dim;
        Ok(ArrayView1::from(&self.weights[start..start + self.dim]))
    }

    /// Bias of one row; zero when the table has no bias column.
    pub fn bias(&self, index: usize) -> LayerResult<f32> {
        self.check(index)?;
        Ok(self.bias.as_ref().map_or(0.0, |b| b[index]))
    }

    /// Copies the requested rows, in input order, into a new matrix.
    pub fn gather(&self, indices: &[usize]) -> LayerResult<Array2<f32>> {
        let mut out = Array2::zeros((indices.len(), self.dim));
        for (mut dst, &idx) in out.rows_mut().into_iter().zip(indices) {
            dst.assign(&self.row(idx)?);
        }
        Ok(out)
    }

    /// Copies the requested biases, in input order.
    pub fn bias_gather(&self, indices: &[usize]) -> LayerResult<Array1<f32>> {
        indices
            .iter()
            .map(|&idx| self.bias(idx))
            .collect::<LayerResult<Vec<f32>>>()
            .map(Array1::from)
    }

    /// Applies per-row gradients through this table's optimizers.
    ///
    /// `row_grads` holds one gradient row per entry of `indices`; repeated
    /// indices accumulate. `bias_grads`, when present, holds one scalar per
    /// entry and is ignored for tables without a bias column.
    ///
    /// The optimizer steps the whole table with a zero gradient for rows
    /// not in `indices`: SGD leaves them alone, while Adam keeps moving rows
    /// that still carry momentum from earlier batches.
    pub fn apply_gradients(
        &mut self,
        indices: &[usize],
        row_grads: ArrayView2<'_, f32>,
        bias_grads: Option<ArrayView1<'_, f32>>,
    ) -> LayerResult<()> {
        if row_grads.nrows() != indices.len() {
            return Err(LayerError::InvalidInputDimension {
                expected: indices.len(),
                actual: row_grads.nrows(),
            });
        }
        if row_grads.ncols() != self.dim {
            return Err(LayerError::InvalidInputDimension {
                expected: self.dim,
                actual: row_grads.ncols(),
            });
        }
        if let Some(grads) = bias_grads {
            if grads.len() != indices.len() {
                return Err(LayerError::InvalidInputDimension {
                    expected: indices.len(),
                    actual: grads.len(),
                });
            }
        }
        for &idx in indices {
            self.check(idx)?;
        }

        let mut dense = vec![0.0f32; self.weights.len()];
        for (grad, &idx) in row_grads.rows().into_iter().zip(indices) {
            let start = idx * self.dim;
            for (acc, g) in dense[start..start + self.dim].iter_mut().zip(grad) {
                *acc += g;
            }
        }
        self.weight_optimizer.apply_gradients(&mut self.weights, &dense);

        if let (Some(bias), Some(opt), Some(grads)) =
            (self.bias.as_mut(), self.bias_optimizer.as_mut(), bias_grads)
        {
            let mut dense = vec![0.0f32; bias.len()];
            for (g, &idx) in grads.iter().zip(indices) {
                dense[idx] += g;
            }
            opt.apply_gradients(bias, &dense);
        }
        Ok(())
    }
}

/// The user and item tables of a two-tower model.
#[derive(Debug)]
pub struct EmbeddingStore {
    users: EmbeddingTable,
    items: EmbeddingTable,
}

impl EmbeddingStore {
    /// Builds both tables with the same dimension, initializer and optimizer.
    pub fn initialize(
        num_users: usize,
        num_items: usize,
        dim: usize,
        init: &InitializerConfig,
        use_bias: bool,
        optimizer: &OptimizerConfig,
        rng: &mut dyn RngCore,
    ) -> LayerResult<Self> {
        let users = EmbeddingTable::new(
            EntityKind::User,
            num_users,
            dim,
            init,
            use_bias,
            optimizer,
            rng,
        )?;
        let items = EmbeddingTable::new(
            EntityKind::Item,
            num_items,
            dim,
            init,
            use_bias,
            optimizer,
            rng,
        )?;
        Ok(Self { users, items })
    }

    /// The user table.
    pub fn users(&self) -> &EmbeddingTable {
        &self.users
    }

    /// The item table.
    pub fn items(&self) -> &EmbeddingTable {
        &self.items
    }

    pub(crate) fn users_mut(&mut self) -> &mut EmbeddingTable {
        &mut self.users
    }

    pub(crate) fn items_mut(&mut self) -> &mut EmbeddingTable {
        &mut self.items
    }

    /// Shared embedding dimension.
    pub fn dim(&self) -> usize {
        self.users.dim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn table(rows: usize, dim: usize, bias: bool) -> EmbeddingTable {
        EmbeddingTable::new(
            EntityKind::Item,
            rows,
            dim,
            &InitializerConfig::default(),
            bias,
            &OptimizerConfig::Sgd { learning_rate: 1.0 },
            &mut StdRng::seed_from_u64(5),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_empty_shapes() {
        let mut rng = StdRng::seed_from_u64(0);
        let opt = OptimizerConfig::default();
        let init = InitializerConfig::default();
        for (rows, dim) in [(0, 4), (4, 0)] {
            let err = EmbeddingTable::new(EntityKind::User, rows, dim, &init, true, &opt, &mut rng)
                .unwrap_err();
            assert!(matches!(err, LayerError::Rec(RecError::Configuration { .. })));
        }
    }

    #[test]
    fn test_gather_copies_in_order() {
        let t = table(5, 3, true);
        let rows = t.gather(&[4, 1]).unwrap();
        assert_eq!(rows.row(0), t.row(4).unwrap());
        assert_eq!(rows.row(1), t.row(1).unwrap());
        assert_eq!(t.bias_gather(&[0, 2]).unwrap(), array![0.0f32, 0.0]);
    }

    #[test]
    fn test_out_of_range_is_unknown_identifier() {
        let t = table(2, 3, false);
        let err = t.gather(&[0, 2]).unwrap_err();
        assert!(matches!(
            err,
            LayerError::Rec(RecError::UnknownIdentifier {
                kind: EntityKind::Item,
                ..
            })
        ));
        assert!(t.bias(7).is_err());
    }

    #[test]
    fn test_apply_gradients_accumulates_duplicates() {
        let mut t = table(3, 2, true);
        let before = t.gather(&[0, 1, 2]).unwrap();
        let grads = array![[1.0, 0.0], [0.5, 0.5], [1.0, 0.0]];
        let bias_grads = array![1.0, 2.0, 1.0];
        t.apply_gradients(&[2, 0, 2], grads.view(), Some(bias_grads.view()))
            .unwrap();

        let after = t.gather(&[0, 1, 2]).unwrap();
        assert!((after[[2, 0]] - (before[[2, 0]] - 2.0)).abs() < 1e-6);
        assert!((after[[0, 1]] - (before[[0, 1]] - 0.5)).abs() < 1e-6);
        assert_eq!(after.row(1), before.row(1));
        assert!((t.bias(2).unwrap() + 2.0).abs() < 1e-6);
        assert!((t.bias(0).unwrap() + 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_adam_moves_untouched_rows_with_momentum() {
        let mut t = EmbeddingTable::new(
            EntityKind::User,
            2,
            2,
            &InitializerConfig::default(),
            false,
            &OptimizerConfig::adam(0.1),
            &mut StdRng::seed_from_u64(5),
        )
        .unwrap();
        let grads = array![[1.0f32, 1.0]];
        t.apply_gradients(&[0], grads.view(), None).unwrap();
        let row1 = t.row(1).unwrap().to_owned();
        let row0 = t.row(0).unwrap().to_owned();

        t.apply_gradients(&[1], grads.view(), None).unwrap();
        // Row 0 got no gradient this time but its first moment is non-zero.
        assert!(t.row(0).unwrap()[0] < row0[0]);
        assert!(t.row(1).unwrap()[0] < row1[0]);
    }

    #[test]
    fn test_apply_gradients_shape_check() {
        let mut t = table(3, 2, false);
        let grads = array![[1.0, 0.0, 0.0]];
        assert!(t.apply_gradients(&[0], grads.view(), None).is_err());
    }
}
