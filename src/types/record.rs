//! Raw tabular input: single records and uploaded tables

use crate::error::{InspectionError, Result};
use serde::{Deserialize, Serialize};

/// A single untyped cell as it arrived from the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl RawValue {
    /// Numeric interpretation of the cell.
    ///
    /// Unparseable text, empty cells and non-finite numbers are missing
    /// rather than errors; imputation deals with them downstream.
    pub fn as_number(&self) -> Option<f64> {
        let value = match self {
            RawValue::Null => return None,
            RawValue::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            RawValue::Number(n) => *n,
            RawValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return None;
                }
                trimmed.parse::<f64>().ok()?
            }
        };

        value.is_finite().then_some(value)
    }

    /// Text interpretation used for timestamp detection.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }

    /// Convert a JSON value; nested arrays/objects are not valid cells.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Null => Ok(RawValue::Null),
            serde_json::Value::Bool(b) => Ok(RawValue::Bool(b)),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(RawValue::Number)
                .ok_or_else(|| InspectionError::Decode(format!("unrepresentable number {}", n))),
            serde_json::Value::String(s) => Ok(RawValue::Text(s)),
            other => Err(InspectionError::Decode(format!(
                "nested values are not supported as cells: {}",
                other
            ))),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            RawValue::Null => serde_json::Value::Null,
            RawValue::Bool(b) => serde_json::Value::Bool(*b),
            RawValue::Number(n) => serde_json::Value::from(*n),
            RawValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

/// One inspected unit: column name to raw value, in arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: Vec<(String, RawValue)>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert; replaces an existing field of the same name.
    pub fn with(mut self, name: &str, value: impl Into<RawValue>) -> Self {
        self.insert(name, value.into());
        self
    }

    pub fn insert(&mut self, name: &str, value: RawValue) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&RawValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parse a record from a JSON object.
    pub fn from_json_object(object: serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        let mut record = RawRecord::new();
        for (name, value) in object {
            record.insert(&name, RawValue::from_json(value)?);
        }
        Ok(record)
    }
}

/// A batch of records sharing one header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<RawValue>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row; its width must match the header.
    pub fn push_row(&mut self, row: Vec<RawValue>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(InspectionError::Decode(format!(
                "row {} has {} cells, header has {}",
                self.rows.len() + 1,
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Build a table from records; columns are the union in first-seen order
    /// and cells absent from a record are null.
    pub fn from_records(records: &[RawRecord]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            for (name, _) in record.iter() {
                if !columns.iter().any(|c| c == name) {
                    columns.push(name.to_string());
                }
            }
        }

        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(c).cloned().unwrap_or(RawValue::Null))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<RawValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Iterate the cells of a named column, if present.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &RawValue> + '_> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_cast() {
        assert_eq!(RawValue::from("12.5").as_number(), Some(12.5));
        assert_eq!(RawValue::from(" 7 ").as_number(), Some(7.0));
        assert_eq!(RawValue::Bool(true).as_number(), Some(1.0));
        assert_eq!(RawValue::from("abc").as_number(), None);
        assert_eq!(RawValue::from("").as_number(), None);
        assert_eq!(RawValue::from("NaN").as_number(), None);
        assert_eq!(RawValue::Number(f64::INFINITY).as_number(), None);
        assert_eq!(RawValue::Null.as_number(), None);
    }

    #[test]
    fn test_record_preserves_order() {
        let object = json!({"zeta": 1, "alpha": "2", "mid": null});
        let record = RawRecord::from_json_object(object.as_object().unwrap().clone()).unwrap();

        let names: Vec<&str> = record.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert_eq!(record.get("mid"), Some(&RawValue::Null));
    }

    #[test]
    fn test_nested_cell_rejected() {
        let object = json!({"a": [1, 2]});
        let result = RawRecord::from_json_object(object.as_object().unwrap().clone());
        assert!(matches!(result, Err(InspectionError::Decode(_))));
    }

    #[test]
    fn test_table_from_records_unions_columns() {
        let records = vec![
            RawRecord::new().with("a", 1.0),
            RawRecord::new().with("b", "x").with("a", 2.0),
        ];
        let table = RawTable::from_records(&records);

        assert_eq!(table.columns(), &["a".to_string(), "b".to_string()]);
        assert_eq!(table.rows()[0][1], RawValue::Null);
        assert_eq!(table.rows()[1][0], RawValue::Number(2.0));
    }

    #[test]
    fn test_push_row_width_mismatch() {
        let mut table = RawTable::new(vec!["a".into(), "b".into()]);
        assert!(table.push_row(vec![RawValue::Null]).is_err());
        assert!(table.push_row(vec![RawValue::Null, RawValue::Null]).is_ok());
        assert_eq!(table.len(), 1);
    }
}
