//! Model loader: bytes or files to classifier plus feature schema

use super::classifier::{Classifier, ModelFormat};
use super::xgboost::XgbClassifier;
use crate::error::{InspectionError, Result};
use crate::feature_aligner::FeatureSchema;
use std::path::Path;
use tracing::info;

/// Freshly decoded model, not yet published
pub struct LoadedModel {
    pub classifier: Box<dyn Classifier>,
    pub schema: Option<FeatureSchema>,
}

/// Loader for classifier models
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    #[cfg_attr(not(feature = "onnx"), allow(dead_code))]
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with default settings (1 thread)
    pub fn new() -> Self {
        Self::with_threads(1)
    }

    /// Create a new model loader with specified number of ONNX threads
    pub fn with_threads(onnx_threads: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
        }
    }

    /// JSON documents are XGBoost models; anything else is treated as ONNX.
    pub fn detect_format(bytes: &[u8]) -> Result<ModelFormat> {
        match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
            None => Err(InspectionError::ModelLoad("model file is empty".to_string())),
            Some(b'{') => Ok(ModelFormat::XgboostJson),
            Some(_) => Ok(ModelFormat::Onnx),
        }
    }

    /// Decode model bytes
    pub fn load_bytes(&self, bytes: &[u8]) -> Result<LoadedModel> {
        let format = Self::detect_format(bytes)?;
        info!(format = %format, size = bytes.len(), "Loading model");

        match format {
            ModelFormat::XgboostJson => {
                let (classifier, schema) = XgbClassifier::from_json_slice(bytes)?;
                Ok(LoadedModel {
                    classifier: Box::new(classifier),
                    schema,
                })
            }
            ModelFormat::Onnx => self.load_onnx(bytes),
        }
    }

    #[cfg(feature = "onnx")]
    fn load_onnx(&self, bytes: &[u8]) -> Result<LoadedModel> {
        let (classifier, schema) = super::onnx::OnnxClassifier::from_bytes(bytes, self.onnx_threads)?;
        Ok(LoadedModel {
            classifier: Box::new(classifier),
            schema,
        })
    }

    #[cfg(not(feature = "onnx"))]
    fn load_onnx(&self, _bytes: &[u8]) -> Result<LoadedModel> {
        Err(InspectionError::ModelLoad(
            "binary model given but ONNX support is not compiled in; rebuild with --features onnx"
                .to_string(),
        ))
    }

    /// Load a model from file
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<LoadedModel> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading model file");

        let bytes = std::fs::read(path).map_err(|e| {
            InspectionError::ModelLoad(format!("failed to read {}: {}", path.display(), e))
        })?;
        self.load_bytes(&bytes)
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::xgboost::tests::stump_model;
    use std::io::Write;

    #[test]
    fn test_detect_format() {
        assert_eq!(
            ModelLoader::detect_format(b"  \n{\"learner\": {}}").unwrap(),
            ModelFormat::XgboostJson
        );
        assert_eq!(ModelLoader::detect_format(&[0x08, 0x07]).unwrap(), ModelFormat::Onnx);
        assert!(ModelLoader::detect_format(b"   ").is_err());
    }

    #[test]
    fn test_load_xgboost_bytes() {
        let bytes = serde_json::to_vec(&stump_model("5E-1")).unwrap();
        let loaded = ModelLoader::new().load_bytes(&bytes).unwrap();

        assert_eq!(loaded.classifier.format(), ModelFormat::XgboostJson);
        assert_eq!(loaded.schema.unwrap().len(), 2);
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&serde_json::to_vec(&stump_model("5E-1")).unwrap())
            .unwrap();

        let loaded = ModelLoader::new().load_file(file.path()).unwrap();
        assert_eq!(loaded.classifier.num_features(), Some(2));

        let missing = ModelLoader::new().load_file("/nonexistent/best_xgb.json");
        assert!(matches!(missing, Err(InspectionError::ModelLoad(_))));
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_binary_model_without_onnx_support() {
        let result = ModelLoader::new().load_bytes(&[0x08, 0x07, 0x12]);
        assert!(matches!(result, Err(InspectionError::ModelLoad(_))));
    }
}
