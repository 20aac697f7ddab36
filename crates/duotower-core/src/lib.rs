//! Core types for the duotower two-tower recommender.
//!
//! This crate holds the pieces every other duotower crate agrees on:
//!
//! - [`RecError`] - the error taxonomy returned across crate boundaries
//! - [`IndexRegistry`] - raw id to dense index mapping
//! - [`RawInteraction`], [`Interaction`], [`ItemRecord`] - validated records
//! - [`LossMode`], [`InitializerConfig`] - model parameters
//!
//! # Example
//!
//! ```
//! use duotower_core::{EntityKind, IndexPolicy, IndexRegistry, RawInteraction};
//!
//! let log = vec![
//!     RawInteraction::new(7, 100, 4.0, 0).unwrap(),
//!     RawInteraction::new(3, 200, 5.0, 1).unwrap(),
//! ];
//! let users = IndexRegistry::assign(
//!     EntityKind::User,
//!     log.iter().map(|r| r.user_id),
//!     IndexPolicy::Sorted,
//! );
//! assert_eq!(users.index_of(&3).unwrap(), 0);
//! assert_eq!(users.index_of(&7).unwrap(), 1);
//! ```

pub mod error;
pub mod params;
pub mod registry;
pub mod types;

pub use error::{EntityKind, RecError, Result};
pub use params::{InitializerConfig, LossMode};
pub use registry::{IndexPolicy, IndexRegistry};
pub use types::{extract_year, Interaction, ItemRecord, RawId, RawInteraction};
