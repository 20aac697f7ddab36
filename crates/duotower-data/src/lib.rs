//! Data plumbing for duotower: batches, negatives, prefetching and loading.
//!
//! - [`BatchSampler`] shuffles and slices the interaction log into [`Batch`]es
//! - [`UniformNegativeSampler`] draws pairwise-loss negatives
//! - [`PrefetchedEpoch`] produces an epoch on a blocking worker behind a bounded channel
//! - [`movielens`] reads the MovieLens 100K `u.data` / `u.item` files

pub mod batch;
pub mod error;
pub mod movielens;
pub mod negative_sampling;
pub mod prefetch;

pub use batch::{Batch, BatchSampler, BatchStream};
pub use error::{DataError, DataResult};
pub use movielens::{load_interactions, load_items, MovieLensDataset, GENRES};
pub use negative_sampling::{NegativeSampler, UniformNegativeSampler, DEFAULT_MAX_ATTEMPTS};
pub use prefetch::PrefetchedEpoch;
