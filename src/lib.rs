//! Defect Inspection Pipeline Library
//!
//! Scores injection-molding inspection records with a gradient-boosted
//! classifier and summarises uploaded batches into quality-control KPIs,
//! per-minute defect trends and sensor averages.

pub mod aggregation;
pub mod config;
pub mod consumer;
pub mod decoder;
pub mod error;
pub mod feature_aligner;
pub mod handler;
pub mod metrics;
pub mod models;
pub mod producer;
pub mod service;
pub mod types;

pub use config::AppConfig;
pub use consumer::RequestConsumer;
pub use error::{InspectionError, Result};
pub use feature_aligner::{FeatureAligner, FeatureSchema};
pub use handler::RequestHandler;
pub use models::{InferenceEngine, ModelStore};
pub use producer::ReplyPublisher;
pub use service::InspectionService;
pub use types::{BatchResult, Label, RawRecord, RawTable, RecordPrediction};
