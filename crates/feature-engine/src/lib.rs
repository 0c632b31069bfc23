//! Feature Engineering Engine
//!
//! Provides the raw transaction table and the statistical features derived
//! from its `var_*` columns.

mod error;
mod features;
mod statistics;
mod table;

pub use error::FeatureError;
pub use features::{EngineeredTable, FeatureEngineer, DERIVED_FEATURES};
pub use statistics::RowStatistics;
pub use table::{
    raw_feature_names, RawRecord, Table, ID_COLUMN, RAW_FEATURE_COUNT, RAW_FEATURE_PREFIX,
};
