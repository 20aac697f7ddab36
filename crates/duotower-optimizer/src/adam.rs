//! Adam optimizer.
//!
//! Adam (Adaptive Moment Estimation) maintains exponential moving averages
//! of the gradients (first moment) and squared gradients (second moment).
//! This is the default optimizer for duotower training runs.
//!
//! # Example
//!
//! ```
//! use duotower_optimizer::{Adam, Optimizer, OptimizerConfig};
//!
//! let mut adam = Adam::new(OptimizerConfig::adam(0.001)).unwrap();
//! let mut params = vec![1.0, 2.0, 3.0];
//! adam.apply_gradients(&mut params, &[0.1, 0.2, 0.3]);
//! assert_eq!(adam.timestep(), 1);
//! ```

use crate::{Optimizer, OptimizerConfig, OptimizerError};

/// Adam optimizer with adaptive learning rates and momentum.
///
/// ```text
/// m = beta1 * m + (1 - beta1) * gradient
/// v = beta2 * v + (1 - beta2) * gradient^2
/// m_hat = m / (1 - beta1^t)
/// v_hat = v / (1 - beta2^t)
/// param = param - learning_rate * m_hat / (sqrt(v_hat) + epsilon)
/// ```
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    /// First moment estimates.
    m: Vec<f32>,
    /// Second moment estimates.
    v: Vec<f32>,
    /// Step counter for bias correction.
    t: u64,
    config: OptimizerConfig,
}

impl Adam {
    /// Returns the current first moment state.
    pub fn first_moment(&self) -> &[f32] {
        &self.m
    }

    /// Returns the current second moment state.
    pub fn second_moment(&self) -> &[f32] {
        &self.v
    }

    /// Returns the current timestep.
    pub fn timestep(&self) -> u64 {
        self.t
    }
}

impl Optimizer for Adam {
    fn new(config: OptimizerConfig) -> Result<Self, OptimizerError> {
        match config {
            OptimizerConfig::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => Ok(Self {
                learning_rate,
                beta1,
                beta2,
                epsilon,
                m: Vec::new(),
                v: Vec::new(),
                t: 0,
                config,
            }),
            _ => Err(OptimizerError::ConfigMismatch {
                expected: "Adam".to_string(),
                got: config.name().to_string(),
            }),
        }
    }

    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]) {
        if self.m.len() != params.len() {
            self.m = vec![0.0; params.len()];
            self.v = vec![0.0; params.len()];
        }

        self.t += 1;
        let t = i32::try_from(self.t).unwrap_or(i32::MAX);
        let bias_correction1 = 1.0 - self.beta1.powi(t);
        let bias_correction2 = 1.0 - self.beta2.powi(t);

        for (i, (p, g)) in params.iter_mut().zip(gradients).enumerate() {
            self.m[i] = self.beta1 * self.m[i] + (1.0 - self.beta1) * g;
            self.v[i] = self.beta2 * self.v[i] + (1.0 - self.beta2) * g * g;

            let m_hat = self.m[i] / bias_correction1;
            let v_hat = self.v[i] / bias_correction2;

            *p -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }
    }

    fn config(&self) -> &OptimizerConfig {
        &self.config
    }
}
