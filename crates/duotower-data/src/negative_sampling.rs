//! Negative sampling for the pairwise ranking loss.
//!
//! A negative is an item index drawn from the catalog to be contrasted with
//! an observed positive. [`UniformNegativeSampler`] draws uniformly and
//! re-draws a bounded number of times when it hits the positive; a collision
//! that survives the attempt budget is returned as is and treated as noise.
//!
//! # Example
//!
//! ```
//! use duotower_data::negative_sampling::{NegativeSampler, UniformNegativeSampler};
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let sampler = UniformNegativeSampler::new(10).unwrap();
//! let mut rng = StdRng::seed_from_u64(7);
//! let negative = sampler.sample(3, &mut rng);
//! assert!(negative < 10);
//! assert_ne!(negative, 3);
//! ```

use duotower_core::{RecError, Result};
use rand::{Rng, RngCore};

/// Default number of draws before a colliding negative is accepted.
pub const DEFAULT_MAX_ATTEMPTS: usize = 100;

/// Strategy for picking one negative item index per positive.
pub trait NegativeSampler: Send + Sync {
    /// Draws a negative item index for `positive`.
    fn sample(&self, positive: usize, rng: &mut dyn RngCore) -> usize;

    /// Draws one negative per positive, in order.
    fn sample_batch(&self, positives: &[usize], rng: &mut dyn RngCore) -> Vec<usize> {
        positives.iter().map(|&p| self.sample(p, rng)).collect()
    }
}

/// Uniform sampling over `[0, num_items)`.
#[derive(Debug, Clone)]
pub struct UniformNegativeSampler {
    num_items: usize,
    max_attempts: usize,
}

impl UniformNegativeSampler {
    /// Creates a sampler over a catalog of `num_items` items.
    ///
    /// # Errors
    ///
    /// [`RecError::Configuration`] if the catalog is empty.
    pub fn new(num_items: usize) -> Result<Self> {
        if num_items == 0 {
            return Err(RecError::configuration(
                "negative sampling needs at least one item",
            ));
        }
        Ok(Self {
            num_items,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        })
    }

    /// Sets the number of draws before a collision is accepted (at least 1).
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Catalog size.
    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// Draw budget per negative.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }
}

impl NegativeSampler for UniformNegativeSampler {
    fn sample(&self, positive: usize, rng: &mut dyn RngCore) -> usize {
        let mut candidate = rng.gen_range(0..self.num_items);
        for _ in 1..self.max_attempts {
            if candidate != positive {
                break;
            }
            candidate = rng.gen_range(0..self.num_items);
        }
        candidate
    }
}
