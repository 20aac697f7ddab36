//! Mini-batch construction.
//!
//! [`BatchSampler`] owns the interaction log and a seeded RNG. Each call to
//! [`BatchSampler::stream`] truncates the log to `max_interactions`, shuffles
//! it, and yields contiguous slices of `batch_size` as [`Batch`]es. The stream
//! is lazy: negatives and side-feature rows are attached only when a batch is
//! pulled.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use duotower_core::Interaction;
//! use duotower_data::BatchSampler;
//!
//! let log: Vec<Interaction> = (0..10)
//!     .map(|i| Interaction { user_index: i % 3, item_index: i, rating: 4.0, timestamp: 0 })
//!     .collect();
//! let mut sampler = BatchSampler::new(Arc::new(log), 4, 100, 42).unwrap();
//! let sizes: Vec<usize> = sampler.stream().map(|b| b.unwrap().len()).collect();
//! assert_eq!(sizes, vec![4, 4, 2]);
//! ```

use std::fmt;
use std::sync::Arc;

use duotower_core::{Interaction, RecError};
use duotower_layers::{SideFeatureTable, StepInput};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::DataResult;
use crate::negative_sampling::NegativeSampler;

/// One mini-batch of training examples.
///
/// All present arrays have the same length (one entry per example).
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Position of this batch within its epoch.
    pub index: usize,
    /// User index per example.
    pub users: Vec<usize>,
    /// Positive item index per example.
    pub positives: Vec<usize>,
    /// Negative item index per example, when a negative sampler is attached.
    pub negatives: Option<Vec<usize>>,
    /// Side-feature rows of the positives.
    pub positive_side: Option<Array2<f32>>,
    /// Side-feature rows of the negatives.
    pub negative_side: Option<Array2<f32>>,
}

impl Batch {
    /// Number of examples.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Returns `true` if the batch has no examples.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Borrows the batch as a model step input.
    pub fn as_step_input(&self) -> StepInput<'_> {
        StepInput {
            users: &self.users,
            positives: &self.positives,
            negatives: self.negatives.as_deref(),
            positive_side: self.positive_side.as_ref().map(|a| a.view()),
            negative_side: self.negative_side.as_ref().map(|a| a.view()),
        }
    }
}

/// Shuffles and slices an interaction log into mini-batches.
pub struct BatchSampler {
    interactions: Arc<Vec<Interaction>>,
    batch_size: usize,
    max_interactions: usize,
    negative_sampler: Option<Arc<dyn NegativeSampler>>,
    side_features: Option<Arc<SideFeatureTable>>,
    rng: StdRng,
}

impl fmt::Debug for BatchSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchSampler")
            .field("interactions", &self.interactions.len())
            .field("batch_size", &self.batch_size)
            .field("max_interactions", &self.max_interactions)
            .field("negatives", &self.negative_sampler.is_some())
            .field("side_features", &self.side_features.is_some())
            .finish()
    }
}

impl BatchSampler {
    /// Creates a sampler over `interactions`.
    ///
    /// # Errors
    ///
    /// [`RecError::Configuration`] if the log is empty or `batch_size` or
    /// `max_interactions` is zero.
    pub fn new(
        interactions: Arc<Vec<Interaction>>,
        batch_size: usize,
        max_interactions: usize,
        seed: u64,
    ) -> DataResult<Self> {
        if interactions.is_empty() {
            return Err(RecError::configuration("interaction set is empty").into());
        }
        if batch_size == 0 {
            return Err(RecError::configuration("batch_size must be > 0, got 0").into());
        }
        if max_interactions == 0 {
            return Err(RecError::configuration("max_interactions must be > 0, got 0").into());
        }
        Ok(Self {
            interactions,
            batch_size,
            max_interactions,
            negative_sampler: None,
            side_features: None,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Attaches one negative per positive to every batch.
    pub fn with_negative_sampler(mut self, sampler: Arc<dyn NegativeSampler>) -> Self {
        self.negative_sampler = Some(sampler);
        self
    }

    /// Attaches side-feature rows for positives (and negatives) to every batch.
    pub fn with_side_features(mut self, table: Arc<SideFeatureTable>) -> Self {
        self.side_features = Some(table);
        self
    }

    /// Examples per full batch.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of interactions that take part in an epoch.
    pub fn epoch_len(&self) -> usize {
        self.interactions.len().min(self.max_interactions)
    }

    /// Number of batches one epoch yields.
    pub fn batches_per_epoch(&self) -> usize {
        self.epoch_len().div_ceil(self.batch_size)
    }

    /// Starts a new epoch: reshuffles and returns a lazy batch sequence.
    pub fn stream(&mut self) -> BatchStream<'_> {
        let mut order: Vec<Interaction> = self.interactions[..self.epoch_len()].to_vec();
        order.shuffle(&mut self.rng);
        BatchStream {
            order,
            cursor: 0,
            next_index: 0,
            batch_size: self.batch_size,
            negative_sampler: self.negative_sampler.as_deref(),
            side_features: self.side_features.as_deref(),
            rng: &mut self.rng,
        }
    }
}

/// Batches of one epoch, in shuffled order.
pub struct BatchStream<'a> {
    order: Vec<Interaction>,
    cursor: usize,
    next_index: usize,
    batch_size: usize,
    negative_sampler: Option<&'a dyn NegativeSampler>,
    side_features: Option<&'a SideFeatureTable>,
    rng: &'a mut StdRng,
}

impl BatchStream<'_> {
    fn build(&mut self, slice: &[Interaction]) -> DataResult<Batch> {
        let users = slice.iter().map(|i| i.user_index).collect::<Vec<_>>();
        let positives = slice.iter().map(|i| i.item_index).collect::<Vec<_>>();
        let negatives = self
            .negative_sampler
            .map(|s| s.sample_batch(&positives, &mut *self.rng));
        let (positive_side, negative_side) = match self.side_features {
            Some(table) => {
                let pos = table.gather(&positives)?;
                let neg = match &negatives {
                    Some(n) => Some(table.gather(n)?),
                    None => None,
                };
                (Some(pos), neg)
            }
            None => (None, None),
        };
        let batch = Batch {
            index: self.next_index,
            users,
            positives,
            negatives,
            positive_side,
            negative_side,
        };
        self.next_index += 1;
        Ok(batch)
    }
}

impl Iterator for BatchStream<'_> {
    type Item = DataResult<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let slice = self.order[self.cursor..end].to_vec();
        self.cursor = end;
        Some(self.build(&slice))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.order.len() - self.cursor).div_ceil(self.batch_size);
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negative_sampling::UniformNegativeSampler;
    use crate::DataError;

    fn log(n: usize) -> Arc<Vec<Interaction>> {
        Arc::new(
            (0..n)
                .map(|i| Interaction {
                    user_index: i % 5,
                    item_index: i % 8,
                    rating: 1.0 + (i % 5) as f32,
                    timestamp: i as i64,
                })
                .collect(),
        )
    }

    fn key(i: &Interaction) -> (usize, usize, i64) {
        (i.user_index, i.item_index, i.timestamp)
    }

    #[test]
    fn test_rejects_bad_configuration() {
        assert!(matches!(
            BatchSampler::new(Arc::new(Vec::new()), 4, 10, 0),
            Err(DataError::Rec(RecError::Configuration { .. }))
        ));
        assert!(BatchSampler::new(log(4), 0, 10, 0).is_err());
        assert!(BatchSampler::new(log(4), 4, 0, 0).is_err());
    }

    #[test]
    fn test_epoch_covers_truncated_log_exactly_once() {
        let data = log(37);
        let mut sampler = BatchSampler::new(data.clone(), 8, 30, 42).unwrap();
        assert_eq!(sampler.batches_per_epoch(), 4);

        let batches: Vec<Batch> = sampler.stream().collect::<DataResult<_>>().unwrap();
        assert_eq!(
            batches.iter().map(Batch::len).collect::<Vec<_>>(),
            vec![8, 8, 8, 6]
        );
        assert_eq!(
            batches.iter().map(|b| b.index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );

        let mut seen: Vec<(usize, usize)> = batches
            .iter()
            .flat_map(|b| b.users.iter().copied().zip(b.positives.iter().copied()))
            .collect();
        let mut expected: Vec<(usize, usize)> = data[..30]
            .iter()
            .map(|i| (i.user_index, i.item_index))
            .collect();
        seen.sort_unstable();
        expected.sort_unstable();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_seed_reproduces_order_and_new_stream_reshuffles() {
        let data = log(40);
        let mut a = BatchSampler::new(data.clone(), 40, 40, 7).unwrap();
        let mut b = BatchSampler::new(data.clone(), 40, 40, 7).unwrap();

        let first_a = a.stream().next().unwrap().unwrap();
        let first_b = b.stream().next().unwrap().unwrap();
        assert_eq!(first_a, first_b);

        let second_a = a.stream().next().unwrap().unwrap();
        assert_ne!(first_a.positives, second_a.positives);

        let unshuffled: Vec<_> = data.iter().map(key).map(|k| k.1).collect();
        assert_ne!(first_a.positives, unshuffled);
    }

    #[test]
    fn test_negatives_and_side_rows_attached() {
        let table = SideFeatureTable::from_rows(8, 2, vec![(3, &[1.0f32, 0.5][..])]).unwrap();
        let sampler = UniformNegativeSampler::new(8).unwrap();
        let mut batches = BatchSampler::new(log(16), 5, 16, 3)
            .unwrap()
            .with_negative_sampler(Arc::new(sampler))
            .with_side_features(Arc::new(table));

        for batch in batches.stream() {
            let batch = batch.unwrap();
            let negatives = batch.negatives.as_ref().unwrap();
            assert_eq!(negatives.len(), batch.len());
            assert!(negatives.iter().zip(&batch.positives).all(|(n, p)| n != p));

            let pos_side = batch.positive_side.as_ref().unwrap();
            let neg_side = batch.negative_side.as_ref().unwrap();
            assert_eq!(pos_side.nrows(), batch.len());
            assert_eq!(neg_side.nrows(), batch.len());
            for (row, &item) in pos_side.rows().into_iter().zip(&batch.positives) {
                let expected = if item == 3 { 1.0 } else { 0.0 };
                assert_eq!(row[0], expected);
            }

            let input = batch.as_step_input();
            assert_eq!(input.users, &batch.users[..]);
            assert!(input.negatives.is_some());
        }
    }

    #[test]
    fn test_size_hint_counts_remaining_batches() {
        let mut sampler = BatchSampler::new(log(10), 3, 10, 1).unwrap();
        let mut stream = sampler.stream();
        assert_eq!(stream.size_hint(), (4, Some(4)));
        stream.next();
        assert_eq!(stream.size_hint(), (3, Some(3)));
    }
}
