//! Feature Error Types

use thiserror::Error;

/// Errors while building tables or deriving features
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    /// Required columns are absent, in declared order
    #[error("Missing columns: {missing:?}")]
    MissingColumns { missing: Vec<String> },

    /// A column name appears twice
    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),

    /// Column names and value matrix disagree
    #[error("Shape mismatch: {columns} column names for {values} value columns")]
    ShapeMismatch { columns: usize, values: usize },

    /// Identifier column length differs from the row count
    #[error("Identifier count {ids} does not match row count {rows}")]
    IdLengthMismatch { ids: usize, rows: usize },

    /// A record does not carry a column the other records have
    #[error("Record {row} is missing column {column}")]
    InconsistentRecord { row: usize, column: String },
}
