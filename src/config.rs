//! Configuration management for the inspection pipeline

use crate::types::prediction::DEFAULT_THRESHOLD;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub models: ModelsConfig,
    pub detection: DetectionConfig,
    #[serde(default)]
    pub alignment: AlignmentConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection and request subjects
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject accepting model bytes
    pub model_upload_subject: String,
    /// Subject accepting a single JSON record
    pub predict_subject: String,
    /// Subject accepting a CSV batch
    pub predict_file_subject: String,
    /// Subject answering health checks
    pub health_subject: String,
}

/// Classifier loading configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Model loaded at startup, if any
    #[serde(default)]
    pub model_path: Option<String>,
    /// Number of threads for ONNX inference (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_onnx_threads() -> usize {
    1
}

/// Detection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Defect probability threshold (inclusive)
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

/// Schema alignment configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AlignmentConfig {
    /// Metadata columns never treated as features
    #[serde(default = "default_reserved_columns")]
    pub reserved_columns: Vec<String>,
}

fn default_reserved_columns() -> Vec<String> {
    [
        "passorfail",
        "label",
        "target",
        "date",
        "timestamp",
        "time",
        "생산일시",
        "id",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            reserved_columns: default_reserved_columns(),
        }
    }
}

/// KPI and time-bucket aggregation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AggregationConfig {
    /// Ground-truth column (0 = normal, 1 = defect)
    #[serde(default = "default_label_column")]
    pub label_column: String,
    /// Timestamp column candidates, highest priority first
    #[serde(default = "default_timestamp_candidates")]
    pub timestamp_candidates: Vec<String>,
    /// Heater head sensor columns
    #[serde(default = "default_head_sensors")]
    pub head_sensors: Vec<String>,
    /// Screw zone sensor columns
    #[serde(default = "default_screw_sensors")]
    pub screw_sensors: Vec<String>,
    /// Number of rows echoed back in the batch preview
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,
}

fn default_label_column() -> String {
    "passorfail".to_string()
}

fn default_timestamp_candidates() -> Vec<String> {
    ["timestamp", "time", "date", "생산일시"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_head_sensors() -> Vec<String> {
    ["EX1.H2_PV", "EX1.H3_PV", "EX1.H4_PV"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_screw_sensors() -> Vec<String> {
    ["EX1.Z1_PV", "EX1.Z2_PV", "EX1.Z4_PV"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_preview_rows() -> usize {
    10
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            label_column: default_label_column(),
            timestamp_candidates: default_timestamp_candidates(),
            head_sensors: default_head_sensors(),
            screw_sensors: default_screw_sensors(),
            preview_rows: default_preview_rows(),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum requests processed concurrently
    pub workers: usize,
    /// Metrics summary interval in seconds
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path, with `INSPECTION__*`
    /// environment variables layered on top
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("INSPECTION").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                model_upload_subject: "inspection.model.upload".to_string(),
                predict_subject: "inspection.predict".to_string(),
                predict_file_subject: "inspection.predict.file".to_string(),
                health_subject: "inspection.health".to_string(),
            },
            models: ModelsConfig {
                model_path: None,
                onnx_threads: 1,
            },
            detection: DetectionConfig {
                threshold: DEFAULT_THRESHOLD,
            },
            alignment: AlignmentConfig::default(),
            aggregation: AggregationConfig::default(),
            pipeline: PipelineConfig {
                workers: 4,
                metrics_interval_secs: 30,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
