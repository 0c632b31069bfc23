//! Raw Transaction Table

use std::collections::{BTreeMap, BTreeSet, HashSet};

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::FeatureError;

/// Passthrough identifier column
pub const ID_COLUMN: &str = "ID_code";

/// Prefix shared by all raw variables
pub const RAW_FEATURE_PREFIX: &str = "var_";

/// Number of raw variables in the fixed schema
pub const RAW_FEATURE_COUNT: usize = 200;

/// A single record keyed by column name
pub type RawRecord = BTreeMap<String, f64>;

/// Names `var_0 .. var_{count-1}` in declared order
pub fn raw_feature_names(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("{RAW_FEATURE_PREFIX}{i}"))
        .collect()
}

/// Row-major numeric table with named columns and optional row identifiers
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    values: Array2<f64>,
    ids: Option<Vec<String>>,
}

impl Table {
    /// Create a table from column names and a value matrix
    pub fn new(columns: Vec<String>, values: Array2<f64>) -> Result<Self, FeatureError> {
        if columns.len() != values.ncols() {
            return Err(FeatureError::ShapeMismatch {
                columns: columns.len(),
                values: values.ncols(),
            });
        }

        let mut seen = HashSet::with_capacity(columns.len());
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(FeatureError::DuplicateColumn(name.clone()));
            }
        }

        Ok(Self {
            columns,
            values,
            ids: None,
        })
    }

    /// Create a table from row vectors
    pub fn from_rows(columns: Vec<String>, rows: &[Vec<f64>]) -> Result<Self, FeatureError> {
        let width = columns.len();
        let mut flat = Vec::with_capacity(rows.len() * width);
        for row in rows {
            if row.len() != width {
                return Err(FeatureError::ShapeMismatch {
                    columns: width,
                    values: row.len(),
                });
            }
            flat.extend_from_slice(row);
        }

        let values = Array2::from_shape_vec((rows.len(), width), flat).map_err(|_| {
            FeatureError::ShapeMismatch {
                columns: width,
                values: 0,
            }
        })?;
        Self::new(columns, values)
    }

    /// Wrap a single record into a one-row table
    pub fn from_record(record: &RawRecord) -> Self {
        let columns: Vec<String> = record.keys().cloned().collect();
        let values = Array1::from_iter(record.values().copied()).insert_axis(Axis(0));
        Self {
            columns,
            values,
            ids: None,
        }
    }

    /// Build a table from records; every record must carry the same columns
    pub fn from_records(records: &[RawRecord]) -> Result<Self, FeatureError> {
        let names: BTreeSet<&String> = records.iter().flat_map(|r| r.keys()).collect();
        let columns: Vec<String> = names.into_iter().cloned().collect();

        let mut rows = Vec::with_capacity(records.len());
        for (row, record) in records.iter().enumerate() {
            let mut values = Vec::with_capacity(columns.len());
            for column in &columns {
                match record.get(column) {
                    Some(v) => values.push(*v),
                    None => {
                        return Err(FeatureError::InconsistentRecord {
                            row,
                            column: column.clone(),
                        })
                    }
                }
            }
            rows.push(values);
        }

        Self::from_rows(columns, &rows)
    }

    /// Attach row identifiers
    pub fn with_ids(mut self, ids: Vec<String>) -> Result<Self, FeatureError> {
        if ids.len() != self.n_rows() {
            return Err(FeatureError::IdLengthMismatch {
                ids: ids.len(),
                rows: self.n_rows(),
            });
        }
        self.ids = Some(ids);
        Ok(self)
    }

    /// Row identifiers, if the table carries an `ID_code` column
    pub fn ids(&self) -> Option<&[String]> {
        self.ids.as_deref()
    }

    /// Numeric column names in order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    /// Position of a column
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// View of one column
    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.column_index(name)
            .map(|idx| self.values.column(idx))
    }

    /// View of the whole value matrix
    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    /// Names from `required` that this table lacks, in the order given
    pub fn missing_columns(&self, required: &[String]) -> Vec<String> {
        let present: HashSet<&str> = self.columns.iter().map(String::as_str).collect();
        required
            .iter()
            .filter(|name| !present.contains(name.as_str()))
            .cloned()
            .collect()
    }

    /// Project onto `names` in the given order, keeping identifiers
    pub fn select(&self, names: &[String]) -> Result<Self, FeatureError> {
        let missing = self.missing_columns(names);
        if !missing.is_empty() {
            return Err(FeatureError::MissingColumns { missing });
        }

        let indices: Vec<usize> = names
            .iter()
            .filter_map(|name| self.column_index(name))
            .collect();
        let values = self.values.select(Axis(1), &indices);

        let mut table = Self::new(names.to_vec(), values)?;
        table.ids = self.ids.clone();
        Ok(table)
    }

    /// Drop the named columns if present
    pub fn without_columns(&self, names: &[&str]) -> Self {
        let keep: Vec<usize> = (0..self.columns.len())
            .filter(|&i| !names.contains(&self.columns[i].as_str()))
            .collect();

        Self {
            columns: keep.iter().map(|&i| self.columns[i].clone()).collect(),
            values: self.values.select(Axis(1), &keep),
            ids: self.ids.clone(),
        }
    }

    pub(crate) fn into_parts(self) -> (Vec<String>, Array2<f64>, Option<Vec<String>>) {
        (self.columns, self.values, self.ids)
    }

    pub(crate) fn from_parts(
        columns: Vec<String>,
        values: Array2<f64>,
        ids: Option<Vec<String>>,
    ) -> Self {
        Self {
            columns,
            values,
            ids,
        }
    }
}
