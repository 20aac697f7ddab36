//! Plain stochastic gradient descent.

use crate::{Optimizer, OptimizerConfig, OptimizerError};

/// Stochastic Gradient Descent optimizer.
///
/// `param = param - learning_rate * gradient`
#[derive(Debug, Clone)]
pub struct Sgd {
    learning_rate: f32,
    config: OptimizerConfig,
}

impl Sgd {
    /// Creates a new SGD optimizer with the given learning rate.
    pub fn with_learning_rate(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            config: OptimizerConfig::Sgd { learning_rate },
        }
    }
}

impl Optimizer for Sgd {
    fn new(config: OptimizerConfig) -> Result<Self, OptimizerError> {
        match config {
            OptimizerConfig::Sgd { learning_rate } => Ok(Self {
                learning_rate,
                config,
            }),
            _ => Err(OptimizerError::ConfigMismatch {
                expected: "Sgd".to_string(),
                got: config.name().to_string(),
            }),
        }
    }

    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]) {
        for (p, g) in params.iter_mut().zip(gradients) {
            *p -= self.learning_rate * g;
        }
    }

    fn config(&self) -> &OptimizerConfig {
        &self.config
    }
}
