//! Type definitions for the inspection pipeline

pub mod prediction;
pub mod record;
pub mod report;

pub use prediction::{Label, Prediction, RecordPrediction};
pub use record::{RawRecord, RawTable, RawValue};
pub use report::{BatchResult, Kpis, ModelInfo, ServiceStatus};
