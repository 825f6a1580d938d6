//! Response payloads for batch inspection and model management

use super::prediction::Label;
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Sentinel for `critical_defect` when only one class is observed
pub const NO_CRITICAL_DEFECT: &str = "none";

/// Defect-rate summary statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Kpis {
    pub total_inspects: usize,
    pub normal_count: usize,
    pub defect_total: usize,
    /// Percentage rounded to two decimals, 0 for an empty batch
    pub defect_rate_pct: f64,
    pub critical_defect: String,
}

/// One slice of the class distribution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionEntry {
    pub name: String,
    pub value: usize,
}

/// Defect rate for one minute bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatePoint {
    pub time: String,
    pub rate: f64,
}

/// Per-minute sensor averages; serialized flat as `{time, <sensor>: avg, ...}`
#[derive(Debug, Clone, PartialEq)]
pub struct SensorPoint {
    pub time: String,
    pub averages: Vec<(String, f64)>,
}

impl SensorPoint {
    pub fn average(&self, sensor: &str) -> Option<f64> {
        self.averages
            .iter()
            .find(|(name, _)| name == sensor)
            .map(|(_, avg)| *avg)
    }
}

impl Serialize for SensorPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.averages.len() + 1))?;
        map.serialize_entry("time", &self.time)?;
        for (name, avg) in &self.averages {
            map.serialize_entry(name, avg)?;
        }
        map.end()
    }
}

/// First rows of the batch echoed back with their verdict
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRow {
    #[serde(flatten)]
    pub values: serde_json::Map<String, serde_json::Value>,
    pub inspection_label: Label,
    /// Absent when the label came from ground truth
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defect_probability: Option<f64>,
}

/// Full batch-file response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub status: &'static str,
    pub request_id: String,
    /// True when labels came from the ground-truth column instead of the model
    pub ground_truth: bool,
    pub kpis: Kpis,
    pub distribution: Vec<DistributionEntry>,
    pub time_series: Vec<RatePoint>,
    pub head_sensors: Vec<SensorPoint>,
    pub screw_sensors: Vec<SensorPoint>,
    pub preview: Vec<PreviewRow>,
    /// Per-row model probabilities; kept for metrics, not sent to clients
    #[serde(skip)]
    pub probabilities: Option<Vec<f64>>,
}

/// Model upload acknowledgement
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub status: &'static str,
    pub format: String,
    pub feature_count: Option<usize>,
    pub has_schema: bool,
    pub version: u64,
}

/// Health report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub status: &'static str,
    pub model_loaded: bool,
    pub format: Option<String>,
    pub feature_count: Option<usize>,
    pub version: Option<u64>,
    pub loaded_at: Option<DateTime<Utc>>,
}
