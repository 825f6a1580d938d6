//! Error types for the inspection pipeline

use serde::Serialize;
use thiserror::Error;

/// Errors surfaced to callers of the inspection service.
#[derive(Error, Debug)]
pub enum InspectionError {
    /// No classifier has been loaded yet
    #[error("model not loaded")]
    ModelNotLoaded,

    /// Model bytes could not be decoded into a classifier
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Uploaded table or record could not be decoded
    #[error("failed to decode input: {0}")]
    Decode(String),

    /// Aligned input is incompatible with the loaded model
    #[error("inference failed: {0}")]
    Inference(String),

    /// Input decoded but violates a value constraint
    #[error("invalid input: {0}")]
    Validation(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, InspectionError>;

impl InspectionError {
    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            InspectionError::ModelNotLoaded => "model_not_loaded",
            InspectionError::ModelLoad(_) => "model_load_error",
            InspectionError::Decode(_) => "decode_error",
            InspectionError::Inference(_) => "inference_error",
            InspectionError::Validation(_) => "validation_error",
        }
    }

    /// Structured failure payload returned at the request boundary.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            status: "error",
            code: self.code(),
            message: self.to_string(),
        }
    }
}

impl From<serde_json::Error> for InspectionError {
    fn from(err: serde_json::Error) -> Self {
        InspectionError::Decode(err.to_string())
    }
}

impl From<csv::Error> for InspectionError {
    fn from(err: csv::Error) -> Self {
        InspectionError::Decode(err.to_string())
    }
}

/// Failure payload sent back to the client.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub code: &'static str,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(InspectionError::ModelNotLoaded.code(), "model_not_loaded");
        assert_eq!(InspectionError::ModelLoad("x".into()).code(), "model_load_error");
        assert_eq!(InspectionError::Decode("x".into()).code(), "decode_error");
        assert_eq!(InspectionError::Inference("x".into()).code(), "inference_error");
        assert_eq!(InspectionError::Validation("x".into()).code(), "validation_error");
    }

    #[test]
    fn test_error_response_serialization() {
        let response = InspectionError::Inference("expected 3 features, got 2".into()).to_response();
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["status"], "error");
        assert_eq!(json["code"], "inference_error");
        assert_eq!(json["message"], "inference failed: expected 3 features, got 2");
    }
}
