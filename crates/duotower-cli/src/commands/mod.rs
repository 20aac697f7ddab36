//! CLI Command Implementations
//!
//! - [`train`]: train and summarize the loss trajectory
//! - [`recommend`]: top-K retrieval for one user
//! - [`evaluate`]: qualitative comparison for one user
//! - [`project`]: 2D projection of item vectors
//! - [`query`]: free-text lookup with a model fallback

mod common;
mod evaluate;
mod project;
mod query;
mod recommend;
mod train;

pub use common::{print_json, LossArg, SessionArgs};
pub use evaluate::EvaluateCommand;
pub use project::ProjectCommand;
pub use query::QueryCommand;
pub use recommend::RecommendCommand;
pub use train::TrainCommand;
