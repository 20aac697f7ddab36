//! duotower CLI library
//!
//! Every subcommand loads a MovieLens directory (`u.data` and `u.item`),
//! trains a session in-process and prints its result as JSON on stdout:
//!
//! - **train**: the loss trajectory summary
//! - **recommend**: top-K unseen items for one user
//! - **evaluate**: history, model and popularity lists for one user
//! - **project**: 2D coordinates of item vectors
//! - **query**: genre or title lookup by free text
//!
//! # Example
//!
//! ```bash
//! duotower train --data-dir ml-100k --epochs 6
//! duotower recommend --data-dir ml-100k --user 196 --top-k 10
//! duotower query --data-dir ml-100k --text "romantic comedy"
//! ```

pub mod commands;

use clap::{Parser, Subcommand};

pub use commands::{
    print_json, EvaluateCommand, LossArg, ProjectCommand, QueryCommand, RecommendCommand,
    SessionArgs, TrainCommand,
};

/// duotower - a two-tower embedding recommender
#[derive(Parser, Debug)]
#[command(name = "duotower")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train and print the loss trajectory summary
    Train(TrainCommand),

    /// Train, then recommend unseen items for a user
    Recommend(RecommendCommand),

    /// Train, then compare model and popularity lists for one user
    Evaluate(EvaluateCommand),

    /// Train, then project item vectors to two dimensions
    Project(ProjectCommand),

    /// Look items up by genre words or title
    Query(QueryCommand),
}

/// Result type alias for CLI operations
pub type CliResult<T> = anyhow::Result<T>;
