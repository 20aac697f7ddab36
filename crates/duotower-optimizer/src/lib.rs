//! Gradient optimizers for duotower.
//!
//! Every trainable tensor in the recommender (user table, item table, bias
//! vectors, fusion tower weights) is a flat `&mut [f32]` that owns one
//! optimizer instance. Optimizer state is allocated lazily on the first
//! update, sized to the tensor it is applied to.
//!
//! # Available Optimizers
//!
//! - [`Sgd`] - Stochastic Gradient Descent
//! - [`Adagrad`] - Adaptive Gradient Algorithm
//! - [`Adam`] - Adaptive Moment Estimation
//!
//! # Example
//!
//! ```
//! use duotower_optimizer::{create_optimizer, OptimizerConfig};
//!
//! let mut optimizer = create_optimizer(OptimizerConfig::default()).unwrap();
//!
//! let mut weights = vec![1.0, 2.0, 3.0];
//! let gradients = vec![0.1, 0.2, 0.3];
//!
//! optimizer.apply_gradients(&mut weights, &gradients);
//! assert!(weights[0] < 1.0);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod adagrad;
mod adam;
mod sgd;

pub use adagrad::Adagrad;
pub use adam::Adam;
pub use sgd::Sgd;

/// Errors that can occur when building optimizers.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Configuration type does not match the optimizer type.
    #[error("Config mismatch: expected {expected}, got {got}")]
    ConfigMismatch { expected: String, got: String },

    /// Invalid configuration parameter.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Configuration for the supported optimizer types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptimizerConfig {
    /// Stochastic Gradient Descent configuration.
    Sgd {
        /// Learning rate for gradient updates.
        learning_rate: f32,
    },

    /// Adagrad configuration.
    Adagrad {
        /// Learning rate for gradient updates.
        learning_rate: f32,
        /// Initial value for the accumulator.
        initial_accumulator: f32,
    },

    /// Adam configuration.
    Adam {
        /// Learning rate for gradient updates.
        learning_rate: f32,
        /// Exponential decay rate for first moment estimates.
        beta1: f32,
        /// Exponential decay rate for second moment estimates.
        beta2: f32,
        /// Small constant for numerical stability.
        epsilon: f32,
    },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::adam(0.001)
    }
}

impl OptimizerConfig {
    /// Adam with the usual moment decay rates.
    pub fn adam(learning_rate: f32) -> Self {
        OptimizerConfig::Adam {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }

    /// Returns the name of the optimizer type.
    pub fn name(&self) -> &'static str {
        match self {
            OptimizerConfig::Sgd { .. } => "Sgd",
            OptimizerConfig::Adagrad { .. } => "Adagrad",
            OptimizerConfig::Adam { .. } => "Adam",
        }
    }

    /// Returns the learning rate for the optimizer.
    pub fn learning_rate(&self) -> f32 {
        match self {
            OptimizerConfig::Sgd { learning_rate } => *learning_rate,
            OptimizerConfig::Adagrad { learning_rate, .. } => *learning_rate,
            OptimizerConfig::Adam { learning_rate, .. } => *learning_rate,
        }
    }

    /// Returns a copy of this configuration with a different learning rate.
    pub fn with_learning_rate(&self, lr: f32) -> Self {
        let mut config = self.clone();
        match &mut config {
            OptimizerConfig::Sgd { learning_rate }
            | OptimizerConfig::Adagrad { learning_rate, .. }
            | OptimizerConfig::Adam { learning_rate, .. } => *learning_rate = lr,
        }
        config
    }

    /// Checks every hyperparameter against its valid range.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::InvalidParameter`] naming the first offending value.
    pub fn validate(&self) -> Result<(), OptimizerError> {
        let lr = self.learning_rate();
        if !(lr.is_finite() && lr > 0.0) {
            return Err(OptimizerError::InvalidParameter(format!(
                "learning_rate must be finite and > 0, got {}",
                lr
            )));
        }
        match *self {
            OptimizerConfig::Sgd { .. } => Ok(()),
            OptimizerConfig::Adagrad {
                initial_accumulator,
                ..
            } => {
                if !(initial_accumulator.is_finite() && initial_accumulator >= 0.0) {
                    return Err(OptimizerError::InvalidParameter(format!(
                        "initial_accumulator must be >= 0, got {}",
                        initial_accumulator
                    )));
                }
                Ok(())
            }
            OptimizerConfig::Adam {
                beta1,
                beta2,
                epsilon,
                ..
            } => {
                for (name, beta) in [("beta1", beta1), ("beta2", beta2)] {
                    if !(0.0..1.0).contains(&beta) {
                        return Err(OptimizerError::InvalidParameter(format!(
                            "{} must be in [0, 1), got {}",
                            name, beta
                        )));
                    }
                }
                if !(epsilon.is_finite() && epsilon > 0.0) {
                    return Err(OptimizerError::InvalidParameter(format!(
                        "epsilon must be > 0, got {}",
                        epsilon
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Trait for parameter optimizers.
///
/// Optimizers update a flat parameter slice in place from a gradient slice of
/// the same length.
pub trait Optimizer: Sized {
    /// Creates a new optimizer from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::ConfigMismatch`] if the configuration type
    /// does not match the optimizer type.
    fn new(config: OptimizerConfig) -> Result<Self, OptimizerError>;

    /// Applies gradients to update the parameters.
    ///
    /// Callers must pass slices of equal length; extra elements on either
    /// side are ignored.
    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]);

    /// Returns a reference to the optimizer's configuration.
    fn config(&self) -> &OptimizerConfig;
}

/// Creates an optimizer from the given configuration.
///
/// # Errors
///
/// Returns [`OptimizerError::InvalidParameter`] if the configuration does not
/// pass [`OptimizerConfig::validate`].
///
/// # Example
///
/// ```
/// use duotower_optimizer::{create_optimizer, OptimizerConfig};
///
/// let optimizer = create_optimizer(OptimizerConfig::Sgd { learning_rate: 0.1 }).unwrap();
/// assert_eq!(optimizer.config().name(), "Sgd");
/// assert!(create_optimizer(OptimizerConfig::Sgd { learning_rate: 0.0 }).is_err());
/// ```
pub fn create_optimizer(config: OptimizerConfig) -> Result<Box<dyn OptimizerDyn>, OptimizerError> {
    config.validate()?;
    Ok(match &config {
        OptimizerConfig::Sgd { .. } => Box::new(Sgd::new(config)?),
        OptimizerConfig::Adagrad { .. } => Box::new(Adagrad::new(config)?),
        OptimizerConfig::Adam { .. } => Box::new(Adam::new(config)?),
    })
}

/// Dynamic dispatch version of the Optimizer trait.
///
/// Boxed optimizers are moved into the training task, so they must be `Send`.
pub trait OptimizerDyn: Send + Sync + fmt::Debug {
    /// Applies gradients to update the parameters.
    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]);

    /// Returns a reference to the optimizer's configuration.
    fn config(&self) -> &OptimizerConfig;
}

impl<T: Optimizer + Send + Sync + fmt::Debug> OptimizerDyn for T {
    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]) {
        Optimizer::apply_gradients(self, params, gradients)
    }

    fn config(&self) -> &OptimizerConfig {
        Optimizer::config(self)
    }
}
