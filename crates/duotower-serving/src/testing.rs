//! Shared fixtures for unit tests.

use duotower_core::{InitializerConfig, LossMode};
use duotower_layers::{EmbeddingStore, PlainEmbeddingScorer, TwoTowerModel};
use duotower_optimizer::OptimizerConfig;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// An untrained plain model with 8-dimensional vectors.
pub(crate) fn model(num_users: usize, num_items: usize, init: InitializerConfig) -> TwoTowerModel {
    let mut rng = StdRng::seed_from_u64(17);
    let store = EmbeddingStore::initialize(
        num_users,
        num_items,
        8,
        &init,
        true,
        &OptimizerConfig::default(),
        &mut rng,
    )
    .unwrap();
    TwoTowerModel::new(store, Box::new(PlainEmbeddingScorer), LossMode::InBatchSoftmax)
}
