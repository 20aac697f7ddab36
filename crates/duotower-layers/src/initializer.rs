//! Parameter initializers.
//!
//! Initializers draw from a caller-supplied RNG so that a seeded training run
//! produces the same starting tables every time.
//!
//! # Example
//!
//! ```
//! use duotower_core::InitializerConfig;
//! use duotower_layers::initializer::{create_initializer, Initializer};
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let mut rng = StdRng::seed_from_u64(7);
//! let init = create_initializer(&InitializerConfig::default());
//! let values = init.initialize(64, &mut rng);
//! assert_eq!(values.len(), 64);
//! assert!(values.iter().all(|v| v.abs() < 1.0));
//! ```

use duotower_core::InitializerConfig;
use rand::{Rng, RngCore};
use rand_distr::{Distribution, Normal};

/// A strategy for filling a fresh parameter buffer.
pub trait Initializer: Send + Sync {
    /// Produces `len` initial values.
    fn initialize(&self, len: usize, rng: &mut dyn RngCore) -> Vec<f32>;

    /// Returns the name of this initializer.
    fn name(&self) -> &'static str;
}

/// Fills with zeros.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZerosInitializer;

impl Initializer for ZerosInitializer {
    fn initialize(&self, len: usize, _rng: &mut dyn RngCore) -> Vec<f32> {
        vec![0.0; len]
    }

    fn name(&self) -> &'static str {
        "zeros"
    }
}

/// Uniform in `[min, max)`.
#[derive(Debug, Clone, Copy)]
pub struct RandomUniformInitializer {
    min: f32,
    max: f32,
}

impl RandomUniformInitializer {
    /// Creates a uniform initializer. `min` must be below `max`.
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }
}

impl Initializer for RandomUniformInitializer {
    fn initialize(&self, len: usize, rng: &mut dyn RngCore) -> Vec<f32> {
        (0..len).map(|_| rng.gen_range(self.min..self.max)).collect()
    }

    fn name(&self) -> &'static str {
        "random_uniform"
    }
}

/// Normal distribution, optionally truncated at two standard deviations.
#[derive(Debug, Clone, Copy)]
pub struct RandomNormalInitializer {
    mean: f32,
    stddev: f32,
    truncated: bool,
}

impl RandomNormalInitializer {
    /// Plain normal.
    pub fn new(mean: f32, stddev: f32) -> Self {
        Self {
            mean,
            stddev,
            truncated: false,
        }
    }

    /// Normal with values outside `mean +- 2 * stddev` re-drawn.
    pub fn truncated(mean: f32, stddev: f32) -> Self {
        Self {
            mean,
            stddev,
            truncated: true,
        }
    }
}

impl Initializer for RandomNormalInitializer {
    fn initialize(&self, len: usize, rng: &mut dyn RngCore) -> Vec<f32> {
        let normal = match Normal::new(self.mean, self.stddev) {
            Ok(normal) => normal,
            // Rejected by InitializerConfig::validate before we get here.
            Err(_) => return vec![self.mean; len],
        };
        let lower = self.mean - 2.0 * self.stddev;
        let upper = self.mean + 2.0 * self.stddev;

        (0..len)
            .map(|_| loop {
                let val: f32 = normal.sample(&mut *rng);
                if !self.truncated || (lower..=upper).contains(&val) {
                    break val;
                }
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        if self.truncated {
            "truncated_normal"
        } else {
            "random_normal"
        }
    }
}

/// Creates an initializer from the given configuration.
pub fn create_initializer(config: &InitializerConfig) -> Box<dyn Initializer> {
    match *config {
        InitializerConfig::Zeros => Box::new(ZerosInitializer),
        InitializerConfig::RandomUniform { min, max } => {
            Box::new(RandomUniformInitializer::new(min, max))
        }
        InitializerConfig::RandomNormal { mean, stddev } => {
            Box::new(RandomNormalInitializer::new(mean, stddev))
        }
        InitializerConfig::TruncatedNormal { mean, stddev } => {
            Box::new(RandomNormalInitializer::truncated(mean, stddev))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_zeros() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(ZerosInitializer.initialize(3, &mut rng), vec![0.0; 3]);
    }

    #[test]
    fn test_uniform_bounds() {
        let mut rng = StdRng::seed_from_u64(0);
        let values = RandomUniformInitializer::new(-0.5, 0.5).initialize(1000, &mut rng);
        assert!(values.iter().all(|v| (-0.5..0.5).contains(v)));
    }

    #[test]
    fn test_truncated_normal_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        let values = RandomNormalInitializer::truncated(0.0, 0.05).initialize(2000, &mut rng);
        assert!(values.iter().all(|v| v.abs() <= 0.1));
    }

    #[test]
    fn test_seeded_is_reproducible() {
        let init = create_initializer(&InitializerConfig::default());
        let a = init.initialize(16, &mut StdRng::seed_from_u64(42));
        let b = init.initialize(16, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
        assert_eq!(init.name(), "random_normal");
    }

    #[test]
    fn test_normal_statistics() {
        let mut rng = StdRng::seed_from_u64(3);
        let values = RandomNormalInitializer::new(0.0, 0.05).initialize(20_000, &mut rng);
        let mean = values.iter().sum::<f32>() / values.len() as f32;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / values.len() as f32;
        assert!(mean.abs() < 0.005);
        assert!((var.sqrt() - 0.05).abs() < 0.005);
    }
}
