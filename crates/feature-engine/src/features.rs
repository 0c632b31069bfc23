//! Derived Feature Assembly

use ndarray::{concatenate, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FeatureError;
use crate::statistics::RowStatistics;
use crate::table::{raw_feature_names, Table, RAW_FEATURE_COUNT};

/// Names of the derived columns, in the order they are appended
pub const DERIVED_FEATURES: [&str; 8] = [
    "mean_features",
    "std_features",
    "min_features",
    "max_features",
    "count_positive",
    "count_negative",
    "prop_positive",
    "prop_negative",
];

/// Table with the derived statistical columns appended
#[derive(Debug, Clone, PartialEq)]
pub struct EngineeredTable {
    table: Table,
    created_features: Vec<String>,
}

impl EngineeredTable {
    /// Names of the columns added by feature engineering
    pub fn created_features(&self) -> &[String] {
        &self.created_features
    }

    /// Engineered table, ids included
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Model input matrix: raw and derived columns
    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.table.values()
    }

    /// Number of rows
    pub fn n_rows(&self) -> usize {
        self.table.n_rows()
    }

    /// Consume into the underlying table
    pub fn into_table(self) -> Table {
        self.table
    }
}

/// Stateless feature engineer over the fixed raw schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEngineer {
    /// Number of `var_*` columns every input must carry
    raw_feature_count: usize,
}

impl Default for FeatureEngineer {
    fn default() -> Self {
        Self::new(RAW_FEATURE_COUNT)
    }
}

impl FeatureEngineer {
    /// Create a feature engineer for `raw_feature_count` raw variables
    pub fn new(raw_feature_count: usize) -> Self {
        Self { raw_feature_count }
    }

    /// Raw variables this engineer expects
    pub fn raw_feature_count(&self) -> usize {
        self.raw_feature_count
    }

    /// Raw variable names this engineer reads
    pub fn raw_feature_names(&self) -> Vec<String> {
        raw_feature_names(self.raw_feature_count)
    }

    /// Append the derived statistics to every row of `table`.
    ///
    /// Statistics only read the raw `var_*` columns; other columns pass
    /// through untouched. Derived columns already present are replaced.
    pub fn create_features(&self, table: &Table) -> Result<EngineeredTable, FeatureError> {
        let raw_names = self.raw_feature_names();
        let missing = table.missing_columns(&raw_names);
        if !missing.is_empty() {
            return Err(FeatureError::MissingColumns { missing });
        }

        let raw_indices: Vec<usize> = raw_names
            .iter()
            .filter_map(|name| table.column_index(name))
            .collect();

        let derived = self.derive(table.values().select(Axis(1), &raw_indices).view());

        let base = table.without_columns(&DERIVED_FEATURES);
        let (mut columns, values, ids) = base.into_parts();
        let values = concatenate(Axis(1), &[values.view(), derived.view()]).map_err(|_| {
            FeatureError::ShapeMismatch {
                columns: columns.len() + DERIVED_FEATURES.len(),
                values: values.ncols() + derived.ncols(),
            }
        })?;
        columns.extend(DERIVED_FEATURES.iter().map(|name| name.to_string()));

        debug!(
            "Created {} features for {} rows",
            DERIVED_FEATURES.len(),
            values.nrows()
        );

        Ok(EngineeredTable {
            table: Table::from_parts(columns, values, ids),
            created_features: DERIVED_FEATURES.iter().map(|name| name.to_string()).collect(),
        })
    }

    fn derive(&self, raw: ArrayView2<'_, f64>) -> Array2<f64> {
        let total = self.raw_feature_count;
        let mut derived = Array2::zeros((raw.nrows(), DERIVED_FEATURES.len()));

        for (row, mut out) in raw.outer_iter().zip(derived.outer_iter_mut()) {
            let stats = RowStatistics::compute(row.iter().copied());
            out[0] = stats.mean;
            out[1] = stats.std_dev;
            out[2] = stats.min;
            out[3] = stats.max;
            out[4] = stats.count_positive as f64;
            out[5] = stats.count_negative as f64;
            out[6] = stats.prop_positive(total);
            out[7] = stats.prop_negative(total);
        }

        derived
    }
}
