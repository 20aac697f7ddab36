//! Read-only use of a trained duotower model.
//!
//! - [`RetrievalService`] - chunked, parallel top-K retrieval by dense index
//! - [`EmbeddingProjector`] - power-iteration PCA of item vectors to 2D
//! - [`EvaluationHarness`] - history vs. model vs. popularity for one user
//! - [`TextQuery`] - genre and title lookup by free text
//! - [`RecommenderService`] - the same operations keyed by raw ids
//!
//! # Example
//!
//! ```
//! use duotower_core::RawInteraction;
//! use duotower_serving::RecommenderService;
//! use duotower_training::{RecommenderSession, TrainingConfig};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let log = vec![
//!     RawInteraction::new(1, 10, 5.0, 0).unwrap(),
//!     RawInteraction::new(2, 20, 4.0, 0).unwrap(),
//!     RawInteraction::new(1, 30, 3.0, 0).unwrap(),
//!     RawInteraction::new(2, 40, 2.0, 0).unwrap(),
//! ];
//! let config = TrainingConfig::default().with_embedding_dim(8).with_epochs(2).with_batch_size(2);
//! let mut session = RecommenderSession::new(config, log, Vec::new()).unwrap();
//! session.train().await.unwrap();
//!
//! let service = RecommenderService::new(&session).unwrap();
//! let top = service.recommend(1, 5).unwrap();
//! assert_eq!(top.len(), 2);
//! assert!(top.iter().all(|r| r.item_id == 20 || r.item_id == 40));
//! # });
//! ```

pub mod error;
pub mod evaluation;
pub mod projector;
pub mod query;
pub mod retrieval;
pub mod service;

#[cfg(test)]
mod testing;

pub use error::{Result, ServingError};
pub use evaluation::{
    popularity, EvaluationConfig, EvaluationHarness, EvaluationReport, HistoricalItem, PopularItem,
};
pub use projector::{EmbeddingProjector, ProjectedPoint, ProjectorConfig};
pub use query::{QueryHit, QueryOutcome, TextQuery};
pub use retrieval::{rank, RetrievalBudget, RetrievalService, ScoredItem, DEFAULT_CHUNK_SIZE};
pub use service::{ProjectedItem, Recommendation, RecommenderService};
