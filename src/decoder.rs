//! Request payload decoding: CSV batches and JSON records

use crate::error::{InspectionError, Result};
use crate::types::record::{RawRecord, RawTable, RawValue};
use tracing::debug;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Turns uploaded bytes into raw tables and records.
pub struct TableDecoder;

impl TableDecoder {
    /// Decode a CSV file with a header row.
    ///
    /// Cells are kept as text; empty cells become null. A ragged row or
    /// invalid UTF-8 fails the whole file.
    pub fn decode_csv(bytes: &[u8]) -> Result<RawTable> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(InspectionError::Decode("empty file".to_string()));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_reader(bytes);

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if columns.iter().all(String::is_empty) {
            return Err(InspectionError::Decode("missing header row".to_string()));
        }

        let mut table = RawTable::new(columns);
        for record in reader.records() {
            let record = record?;
            let row = record
                .iter()
                .map(|cell| {
                    if cell.trim().is_empty() {
                        RawValue::Null
                    } else {
                        RawValue::Text(cell.to_string())
                    }
                })
                .collect();
            table.push_row(row)?;
        }

        debug!(
            rows = table.len(),
            columns = table.columns().len(),
            "Decoded CSV batch"
        );
        Ok(table)
    }

    /// Decode a single record sent as a JSON object.
    pub fn decode_record(bytes: &[u8]) -> Result<RawRecord> {
        match serde_json::from_slice::<serde_json::Value>(bytes)? {
            serde_json::Value::Object(object) => RawRecord::from_json_object(object),
            other => Err(InspectionError::Decode(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
