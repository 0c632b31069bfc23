//! Storage Layer
//!
//! Persists fitted artifacts with postcard and moves tables in and out of
//! CSV files.

mod artifacts;
pub mod tabular;

pub use artifacts::ArtifactStore;
pub use tabular::{read_table, write_table};

use std::path::PathBuf;

use feature_engine::FeatureError;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialization error: {0}")]
    SerializationError(#[from] postcard::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Row {row}: column {column} has non-numeric value {value:?}")]
    Parse {
        row: usize,
        column: String,
        value: String,
    },
    #[error("Invalid table: {0}")]
    Table(#[from] FeatureError),
}
