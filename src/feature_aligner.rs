//! Schema alignment for defect classifier inference.
//!
//! Incoming tables carry whatever columns the line exported. This module
//! reconciles them with the ordered feature vector the loaded model was
//! trained on: metadata columns are dropped, cells are cast to numbers,
//! gaps are imputed with the batch median and absent features are zero-filled.

use crate::config::AlignmentConfig;
use crate::types::record::RawTable;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Ordered feature names a classifier was trained on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    /// Returns `None` for an empty name list; an empty schema carries no
    /// ordering information.
    pub fn new(names: Vec<String>) -> Option<Self> {
        if names.is_empty() {
            None
        } else {
            Some(Self { names })
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Numeric model input: one row per record, one column per feature.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignedTable {
    columns: Vec<String>,
    rows: Vec<Vec<f32>>,
}

impl AlignedTable {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Maps raw tables onto a model's feature schema.
pub struct FeatureAligner {
    reserved: HashSet<String>,
}

impl FeatureAligner {
    /// Create an aligner that drops the given metadata columns.
    pub fn new<I, S>(reserved: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            reserved: reserved.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &AlignmentConfig) -> Self {
        Self::new(config.reserved_columns.iter().cloned())
    }

    pub fn is_reserved(&self, column: &str) -> bool {
        self.reserved.contains(column)
    }

    /// Align a table to `schema`, or to its own numeric columns when the
    /// schema is unknown.
    ///
    /// With a schema the output width and order equal the schema exactly.
    /// Without one, every non-reserved column is kept in arrival order and
    /// columns with no numeric value become zeros; that order is not
    /// verifiable against the model.
    pub fn align(&self, table: &RawTable, schema: Option<&FeatureSchema>) -> AlignedTable {
        // First occurrence wins for duplicated header names.
        let mut feature_columns: Vec<(&str, usize)> = Vec::new();
        let mut by_name: HashMap<&str, usize> = HashMap::new();
        for (idx, name) in table.columns().iter().enumerate() {
            if self.is_reserved(name) {
                continue;
            }
            feature_columns.push((name.as_str(), idx));
            by_name.entry(name.as_str()).or_insert(idx);
        }

        let (columns, values): (Vec<String>, Vec<Vec<f64>>) = match schema {
            Some(schema) => schema
                .names()
                .iter()
                .map(|feature| {
                    let column = match by_name.get(feature.as_str()) {
                        Some(&idx) => impute_column(&numeric_column(table, idx)),
                        None => vec![0.0; table.len()],
                    };
                    (feature.clone(), column)
                })
                .unzip(),
            None => {
                warn!(
                    columns = feature_columns.len(),
                    "No feature schema for loaded model; using input columns in arrival order"
                );
                feature_columns
                    .iter()
                    .map(|&(name, idx)| {
                        (name.to_string(), impute_column(&numeric_column(table, idx)))
                    })
                    .unzip()
            }
        };

        let rows = (0..table.len())
            .map(|row| values.iter().map(|column| column[row] as f32).collect())
            .collect();

        debug!(
            rows = table.len(),
            input_columns = table.columns().len(),
            features = columns.len(),
            "Aligned table to feature schema"
        );

        AlignedTable { columns, rows }
    }
}

impl Default for FeatureAligner {
    fn default() -> Self {
        Self::from_config(&AlignmentConfig::default())
    }
}

/// Values outside the f32 range count as missing.
fn numeric_column(table: &RawTable, idx: usize) -> Vec<Option<f64>> {
    table
        .rows()
        .iter()
        .map(|row| row[idx].as_number().filter(|v| v.abs() <= f32::MAX as f64))
        .collect()
}

/// Fill gaps with the column median, or 0 when nothing was observed.
fn impute_column(values: &[Option<f64>]) -> Vec<f64> {
    let mut observed: Vec<f64> = values.iter().flatten().copied().collect();
    let fill = median(&mut observed).unwrap_or(0.0);
    values.iter().map(|v| v.unwrap_or(fill)).collect()
}

pub(crate) fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
