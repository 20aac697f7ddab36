//! Adagrad optimizer.
//!
//! Rows of an embedding table that appear rarely in batches keep a small
//! accumulator and therefore take larger steps than frequently seen rows.

use crate::{Optimizer, OptimizerConfig, OptimizerError};

/// Adagrad optimizer with per-parameter adaptive learning rates.
///
/// ```text
/// accumulator = accumulator + gradient^2
/// param = param - learning_rate * gradient / sqrt(accumulator)
/// ```
#[derive(Debug, Clone)]
pub struct Adagrad {
    learning_rate: f32,
    initial_accumulator: f32,
    accumulator: Vec<f32>,
    config: OptimizerConfig,
}

impl Adagrad {
    /// Returns the current accumulator state.
    pub fn accumulator(&self) -> &[f32] {
        &self.accumulator
    }
}

impl Optimizer for Adagrad {
    fn new(config: OptimizerConfig) -> Result<Self, OptimizerError> {
        match config {
            OptimizerConfig::Adagrad {
                learning_rate,
                initial_accumulator,
            } => Ok(Self {
                learning_rate,
                initial_accumulator,
                accumulator: Vec::new(),
                config,
            }),
            _ => Err(OptimizerError::ConfigMismatch {
                expected: "Adagrad".to_string(),
                got: config.name().to_string(),
            }),
        }
    }

    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]) {
        if self.accumulator.len() != params.len() {
            self.accumulator = vec![self.initial_accumulator; params.len()];
        }

        for ((p, g), acc) in params
            .iter_mut()
            .zip(gradients)
            .zip(self.accumulator.iter_mut())
        {
            *acc += g * g;
            // Untouched rows have a zero gradient and possibly a zero accumulator.
            if *acc > 0.0 {
                *p -= self.learning_rate * g / acc.sqrt();
            }
        }
    }

    fn config(&self) -> &OptimizerConfig {
        &self.config
    }
}
