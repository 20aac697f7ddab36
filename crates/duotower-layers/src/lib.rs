//! Trainable components of the duotower two-tower model.
//!
//! This crate provides:
//!
//! - [`EmbeddingTable`] / [`EmbeddingStore`] - user and item vectors plus biases
//! - [`Dense`] and [`FeatureFusionTower`] - the optional item-side network
//! - [`Scorer`] with [`PlainEmbeddingScorer`] and [`FusedFeatureScorer`]
//! - [`in_batch_softmax`] and [`bpr`] - losses with analytic gradients
//! - [`TwoTowerModel`] - ties the above into a single `train_step`
//!
//! # Example
//!
//! ```
//! use duotower_core::{InitializerConfig, LossMode};
//! use duotower_layers::{EmbeddingStore, PlainEmbeddingScorer, StepContext, StepInput, TwoTowerModel};
//! use duotower_optimizer::OptimizerConfig;
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let mut rng = StdRng::seed_from_u64(42);
//! let store = EmbeddingStore::initialize(
//!     2,
//!     3,
//!     16,
//!     &InitializerConfig::default(),
//!     true,
//!     &OptimizerConfig::default(),
//!     &mut rng,
//! )
//! .unwrap();
//! let mut model = TwoTowerModel::new(store, Box::new(PlainEmbeddingScorer), LossMode::InBatchSoftmax);
//!
//! let batch = StepInput {
//!     users: &[0, 1],
//!     positives: &[2, 0],
//!     negatives: None,
//!     positive_side: None,
//!     negative_side: None,
//! };
//! let loss = model.train_step(&batch, StepContext::new(0, 0)).unwrap();
//! assert!(loss.is_finite());
//! ```

pub mod dense;
pub mod embedding;
pub mod error;
pub mod fusion;
pub mod initializer;
pub mod loss;
pub mod model;
pub mod scorer;

pub use dense::Dense;
pub use embedding::{EmbeddingStore, EmbeddingTable};
pub use error::{LayerError, LayerResult};
pub use fusion::{FeatureFusionTower, SideFeatureTable};
pub use initializer::{create_initializer, Initializer};
pub use loss::{bpr, in_batch_softmax, logits, sigmoid, LossGradients, StepContext};
pub use model::{StepInput, TwoTowerModel};
pub use scorer::{pair_score, FusedFeatureScorer, PlainEmbeddingScorer, Scorer};
