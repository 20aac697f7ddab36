//! The recommender session: everything one training run owns.
//!
//! A [`RecommenderSession`] is built once from raw interactions and an item
//! catalog. Construction validates the configuration, assigns dense indices,
//! translates the log and allocates the model; nothing is global. Training
//! mutates the session's model in place, and serving reads it afterwards
//! through shared references.

use std::sync::Arc;

use duotower_core::{
    EntityKind, IndexRegistry, Interaction, ItemRecord, LossMode, RawId, RawInteraction, RecError,
};
use duotower_data::{BatchSampler, UniformNegativeSampler};
use duotower_layers::{
    EmbeddingStore, FeatureFusionTower, FusedFeatureScorer, PlainEmbeddingScorer, Scorer,
    SideFeatureTable, TwoTowerModel,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::config::TrainingConfig;
use crate::error::Result;
use crate::metrics::LossTrajectory;
use crate::trainer::Trainer;

/// Offset mixed into the seed of the batch sampler so that shuffling does not
/// replay the initializer's random stream.
const SAMPLER_SEED_OFFSET: u64 = 0x5eed_ba7c;

/// Registries, interaction log, catalog and model of one training run.
#[derive(Debug)]
pub struct RecommenderSession {
    config: TrainingConfig,
    users: IndexRegistry<RawId>,
    items: IndexRegistry<RawId>,
    interactions: Arc<Vec<Interaction>>,
    by_user: Vec<Vec<usize>>,
    catalog: Vec<ItemRecord>,
    side_features: Option<Arc<SideFeatureTable>>,
    model: TwoTowerModel,
    trajectory: Option<LossTrajectory>,
}

impl RecommenderSession {
    /// Builds a session.
    ///
    /// Users are indexed from the interactions; items from the catalog and
    /// the interactions together, so catalog items nobody rated still get a
    /// row.
    ///
    /// # Errors
    ///
    /// [`RecError::Configuration`] for an invalid config, an empty log, or
    /// side features that are enabled but missing or of unequal width.
    pub fn new(
        config: TrainingConfig,
        interactions: Vec<RawInteraction>,
        catalog: Vec<ItemRecord>,
    ) -> Result<Self> {
        config.validate()?;
        if interactions.is_empty() {
            return Err(RecError::configuration("interaction set is empty").into());
        }

        let users = IndexRegistry::assign(
            EntityKind::User,
            interactions.iter().map(|r| r.user_id),
            config.index_policy,
        );
        let items = IndexRegistry::assign(
            EntityKind::Item,
            catalog
                .iter()
                .map(|r| r.id)
                .chain(interactions.iter().map(|r| r.item_id)),
            config.index_policy,
        );

        let mut by_index: Vec<Option<ItemRecord>> = vec![None; items.len()];
        for record in catalog {
            let idx = items.index_of(&record.id)?;
            if by_index[idx].is_none() {
                by_index[idx] = Some(record);
            }
        }
        let catalog = by_index
            .into_iter()
            .zip(items.ids())
            .map(|(record, &id)| record.unwrap_or_else(|| ItemRecord::new(id, format!("Item {}", id))))
            .collect::<Vec<_>>();

        let mut by_user = vec![Vec::new(); users.len()];
        let interactions = interactions
            .iter()
            .enumerate()
            .map(|(pos, raw)| {
                let user_index = users.index_of(&raw.user_id)?;
                by_user[user_index].push(pos);
                Ok(Interaction {
                    user_index,
                    item_index: items.index_of(&raw.item_id)?,
                    rating: raw.rating,
                    timestamp: raw.timestamp,
                })
            })
            .collect::<duotower_core::Result<Vec<_>>>()?;

        let side_features = if config.use_side_features {
            Some(Arc::new(side_feature_table(&catalog)?))
        } else {
            None
        };

        let mut rng = StdRng::seed_from_u64(config.seed);
        let store = EmbeddingStore::initialize(
            users.len(),
            items.len(),
            config.embedding_dim,
            &config.initializer,
            config.use_bias,
            &config.optimizer,
            &mut rng,
        )?;
        let scorer: Box<dyn Scorer> = match &side_features {
            Some(table) => {
                let tower = FeatureFusionTower::new(
                    config.embedding_dim,
                    table.width(),
                    config.hidden_dim,
                    &config.initializer,
                    &config.optimizer,
                    &mut rng,
                )?;
                Box::new(FusedFeatureScorer::new(tower, table.as_ref().clone())?)
            }
            None => Box::new(PlainEmbeddingScorer),
        };
        let model = TwoTowerModel::new(store, scorer, config.loss_mode);

        info!(
            users = users.len(),
            items = items.len(),
            interactions = interactions.len(),
            scorer = model.scorer().name(),
            "Session ready"
        );

        Ok(Self {
            config,
            users,
            items,
            interactions: Arc::new(interactions),
            by_user,
            catalog,
            side_features,
            model,
            trajectory: None,
        })
    }

    /// Trains with a trainer built from the session's configuration.
    pub async fn train(&mut self) -> Result<LossTrajectory> {
        let mut trainer = Trainer::new(self.config.clone());
        self.train_with(&mut trainer).await
    }

    /// Trains with a caller-supplied trainer (hooks, progress, cancellation).
    ///
    /// Calling it again continues from the current parameters. The trainer
    /// may change epochs, logging and prefetching, but batches are drawn with
    /// the session's `batch_size`, `loss_mode` and `max_interactions`, so a
    /// trainer disagreeing on those is rejected with `Configuration`.
    pub async fn train_with(&mut self, trainer: &mut Trainer) -> Result<LossTrajectory> {
        let theirs = trainer.config();
        if theirs.batch_size != self.config.batch_size
            || theirs.loss_mode != self.config.loss_mode
            || theirs.max_interactions != self.config.max_interactions
        {
            return Err(RecError::configuration(format!(
                "trainer config (batch_size {}, loss_mode {}, max_interactions {}) does not match the session (batch_size {}, loss_mode {}, max_interactions {})",
                theirs.batch_size,
                theirs.loss_mode.name(),
                theirs.max_interactions,
                self.config.batch_size,
                self.config.loss_mode.name(),
                self.config.max_interactions
            ))
            .into());
        }
        let sampler = self.batch_sampler()?;
        let trajectory = trainer.train(&mut self.model, sampler).await?;
        self.trajectory = Some(trajectory.clone());
        Ok(trajectory)
    }

    /// A fresh sampler over the session's log, with negatives and side rows
    /// as the configuration requires.
    pub fn batch_sampler(&self) -> Result<BatchSampler> {
        let mut sampler = BatchSampler::new(
            Arc::clone(&self.interactions),
            self.config.batch_size,
            self.config.max_interactions,
            self.config.seed ^ SAMPLER_SEED_OFFSET,
        )?;
        if self.config.loss_mode == LossMode::Bpr {
            let negatives = UniformNegativeSampler::new(self.items.len())?;
            sampler = sampler.with_negative_sampler(Arc::new(negatives));
        }
        if let Some(table) = &self.side_features {
            sampler = sampler.with_side_features(Arc::clone(table));
        }
        Ok(sampler)
    }

    /// The run configuration.
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// User id registry.
    pub fn users(&self) -> &IndexRegistry<RawId> {
        &self.users
    }

    /// Item id registry.
    pub fn items(&self) -> &IndexRegistry<RawId> {
        &self.items
    }

    /// The model.
    pub fn model(&self) -> &TwoTowerModel {
        &self.model
    }

    /// The translated interaction log, in input order.
    pub fn interactions(&self) -> &[Interaction] {
        &self.interactions
    }

    /// Interactions of one user, in input order.
    pub fn user_interactions(&self, user_index: usize) -> Result<Vec<&Interaction>> {
        let positions = self
            .by_user
            .get(user_index)
            .ok_or_else(|| RecError::unknown(EntityKind::User, format!("index {}", user_index)))?;
        Ok(positions.iter().map(|&p| &self.interactions[p]).collect())
    }

    /// Number of interactions per user index.
    pub fn interaction_counts(&self) -> Vec<usize> {
        self.by_user.iter().map(Vec::len).collect()
    }

    /// Catalog entries by item index.
    pub fn catalog(&self) -> &[ItemRecord] {
        &self.catalog
    }

    /// Catalog entry of one item index.
    pub fn item(&self, item_index: usize) -> Result<&ItemRecord> {
        self.catalog
            .get(item_index)
            .ok_or_else(|| RecError::unknown(EntityKind::Item, format!("index {}", item_index)).into())
    }

    /// Dense index of a raw user id.
    pub fn user_index(&self, user_id: RawId) -> Result<usize> {
        Ok(self.users.index_of(&user_id)?)
    }

    /// Raw id of an item index.
    pub fn item_id(&self, item_index: usize) -> Result<RawId> {
        Ok(*self.items.id_of(item_index)?)
    }

    /// Trajectory of the latest completed training run.
    pub fn trajectory(&self) -> Option<&LossTrajectory> {
        self.trajectory.as_ref()
    }

    /// Returns `true` once a training run has completed.
    pub fn is_trained(&self) -> bool {
        self.trajectory.is_some()
    }
}

fn side_feature_table(catalog: &[ItemRecord]) -> duotower_core::Result<SideFeatureTable> {
    let width = catalog
        .iter()
        .find_map(|r| r.side_features.as_ref().map(Vec::len))
        .ok_or_else(|| {
            RecError::configuration("use_side_features is set but no item carries side features")
        })?;
    let rows = catalog
        .iter()
        .enumerate()
        .filter_map(|(idx, r)| r.side_features.as_deref().map(|f| (idx, f)));
    SideFeatureTable::from_rows(catalog.len(), width, rows).map_err(|e| match e {
        duotower_layers::LayerError::Rec(rec) => rec,
        other => RecError::configuration(other.to_string()),
    })
}
