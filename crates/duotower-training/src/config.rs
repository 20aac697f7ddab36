//! Training run configuration.
//!
//! [`TrainingConfig`] is deserialized from JSON (missing fields take their
//! defaults) and adjusted with `with_*` builders. [`TrainingConfig::validate`]
//! runs before any table is allocated.
//!
//! # Example
//!
//! ```
//! use duotower_core::LossMode;
//! use duotower_training::TrainingConfig;
//!
//! let config = TrainingConfig::default()
//!     .with_embedding_dim(16)
//!     .with_epochs(3)
//!     .with_loss_mode(LossMode::Bpr);
//! assert!(config.validate().is_ok());
//!
//! let parsed: TrainingConfig = serde_json::from_str(r#"{"epochs": 2}"#).unwrap();
//! assert_eq!(parsed.epochs, 2);
//! assert_eq!(parsed.batch_size, 256);
//! ```

use duotower_core::{IndexPolicy, InitializerConfig, LossMode, RecError, Result};
use duotower_optimizer::OptimizerConfig;
use serde::{Deserialize, Serialize};

/// Settings for one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Width of every user and item vector.
    pub embedding_dim: usize,
    /// Full passes over the (truncated) interaction log.
    pub epochs: usize,
    /// Examples per optimizer step.
    pub batch_size: usize,
    /// Training objective.
    pub loss_mode: LossMode,
    /// Only the first `max_interactions` interactions are trained on.
    pub max_interactions: usize,
    /// Route item vectors through the feature fusion tower.
    pub use_side_features: bool,
    /// Optimizer for every trainable tensor.
    pub optimizer: OptimizerConfig,
    /// Hidden width of the fusion tower.
    pub hidden_dim: usize,
    /// Distribution for embedding rows and tower weights.
    pub initializer: InitializerConfig,
    /// Learn a scalar bias per user and per item.
    pub use_bias: bool,
    /// Seed for initialization, shuffling and negative sampling.
    pub seed: u64,
    /// Batches buffered ahead of the training task; `0` builds batches inline.
    pub prefetch_capacity: usize,
    /// Step interval of the logging hook.
    pub log_every_n_steps: u64,
    /// How raw ids are mapped to table rows.
    pub index_policy: IndexPolicy,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 32,
            epochs: 6,
            batch_size: 256,
            loss_mode: LossMode::InBatchSoftmax,
            max_interactions: 80_000,
            use_side_features: false,
            optimizer: OptimizerConfig::default(),
            hidden_dim: 64,
            initializer: InitializerConfig::default(),
            use_bias: true,
            seed: 42,
            prefetch_capacity: 4,
            log_every_n_steps: 50,
            index_policy: IndexPolicy::Sorted,
        }
    }
}

impl TrainingConfig {
    /// Sets the embedding width.
    pub fn with_embedding_dim(mut self, embedding_dim: usize) -> Self {
        self.embedding_dim = embedding_dim;
        self
    }

    /// Sets the number of epochs.
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the loss mode.
    pub fn with_loss_mode(mut self, loss_mode: LossMode) -> Self {
        self.loss_mode = loss_mode;
        self
    }

    /// Sets the interaction cap.
    pub fn with_max_interactions(mut self, max_interactions: usize) -> Self {
        self.max_interactions = max_interactions;
        self
    }

    /// Enables or disables the fusion tower.
    pub fn with_side_features(mut self, enabled: bool) -> Self {
        self.use_side_features = enabled;
        self
    }

    /// Sets the optimizer.
    pub fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Keeps the optimizer family and changes its learning rate.
    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.optimizer = self.optimizer.with_learning_rate(learning_rate);
        self
    }

    /// Sets the fusion tower's hidden width.
    pub fn with_hidden_dim(mut self, hidden_dim: usize) -> Self {
        self.hidden_dim = hidden_dim;
        self
    }

    /// Sets the parameter initializer.
    pub fn with_initializer(mut self, initializer: InitializerConfig) -> Self {
        self.initializer = initializer;
        self
    }

    /// Enables or disables bias terms.
    pub fn with_bias(mut self, use_bias: bool) -> Self {
        self.use_bias = use_bias;
        self
    }

    /// Sets the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the prefetch depth.
    pub fn with_prefetch_capacity(mut self, capacity: usize) -> Self {
        self.prefetch_capacity = capacity;
        self
    }

    /// Sets the logging interval.
    pub fn with_log_every_n_steps(mut self, steps: u64) -> Self {
        self.log_every_n_steps = steps;
        self
    }

    /// Sets the index policy.
    pub fn with_index_policy(mut self, policy: IndexPolicy) -> Self {
        self.index_policy = policy;
        self
    }

    /// Rejects settings that cannot produce a training run.
    ///
    /// # Errors
    ///
    /// [`RecError::Configuration`] naming the first offending field and value.
    pub fn validate(&self) -> Result<()> {
        if self.embedding_dim == 0 {
            return Err(RecError::configuration("embedding_dim must be > 0, got 0"));
        }
        if self.epochs == 0 {
            return Err(RecError::configuration("epochs must be > 0, got 0"));
        }
        if self.batch_size == 0 {
            return Err(RecError::configuration("batch_size must be > 0, got 0"));
        }
        if self.loss_mode == LossMode::InBatchSoftmax && self.batch_size < 2 {
            return Err(RecError::configuration(format!(
                "in-batch softmax needs batch_size >= 2, got {}",
                self.batch_size
            )));
        }
        if self.max_interactions == 0 {
            return Err(RecError::configuration("max_interactions must be > 0, got 0"));
        }
        if self.use_side_features && self.hidden_dim == 0 {
            return Err(RecError::configuration("hidden_dim must be > 0, got 0"));
        }
        self.optimizer
            .validate()
            .map_err(|e| RecError::configuration(e.to_string()))?;
        self.initializer.validate()
    }
}
