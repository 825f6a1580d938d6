//! Classifier abstraction shared by all model formats

use crate::error::Result;
use serde::Serialize;
use std::fmt;

/// On-disk model format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelFormat {
    /// XGBoost `save_model` JSON
    XgboostJson,
    /// ONNX graph (requires the `onnx` feature)
    Onnx,
}

impl ModelFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFormat::XgboostJson => "xgboost-json",
            ModelFormat::Onnx => "onnx",
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A loaded binary classifier.
///
/// Implementations must be usable from many requests at once; any
/// runtime that needs exclusive access guards itself internally.
pub trait Classifier: Send + Sync {
    fn format(&self) -> ModelFormat;

    /// Input width the model was built for, when the format records it.
    fn num_features(&self) -> Option<usize>;

    /// Class-1 (defect) probability for one feature vector.
    fn predict_proba(&self, features: &[f32]) -> Result<f64>;
}
