//! Inference engine for defect classification

use super::store::ModelSnapshot;
use crate::config::DetectionConfig;
use crate::error::{InspectionError, Result};
use crate::feature_aligner::AlignedTable;
use crate::types::prediction::{Prediction, DEFAULT_THRESHOLD};
use tracing::debug;

/// Scores aligned rows against a model snapshot.
///
/// Holds no model state of its own; callers pass the snapshot they captured
/// for the request, so repeated calls with the same row and snapshot give
/// identical predictions.
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    /// Defect probability threshold (inclusive)
    threshold: f64,
}

impl InferenceEngine {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(config.threshold)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Run inference on one aligned feature vector
    pub fn predict(&self, snapshot: &ModelSnapshot, features: &[f32]) -> Result<Prediction> {
        if let Some(expected) = snapshot.feature_count() {
            if features.len() != expected {
                return Err(InspectionError::Inference(format!(
                    "aligned input has {} features, model expects {}",
                    features.len(),
                    expected
                )));
            }
        }

        let probability = snapshot.classifier().predict_proba(features)?;
        if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
            return Err(InspectionError::Inference(format!(
                "model returned invalid probability {}",
                probability
            )));
        }

        Ok(Prediction::new(probability, self.threshold))
    }

    /// Run inference on every row; the first failing row fails the batch
    pub fn predict_batch(
        &self,
        snapshot: &ModelSnapshot,
        table: &AlignedTable,
    ) -> Result<Vec<Prediction>> {
        let predictions = table
            .rows()
            .iter()
            .map(|row| self.predict(snapshot, row))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            rows = predictions.len(),
            model_version = snapshot.version(),
            threshold = self.threshold,
            "Batch inference complete"
        );

        Ok(predictions)
    }
}

impl Default for InferenceEngine {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::feature_aligner::{FeatureAligner, FeatureSchema};
    use crate::models::classifier::{Classifier, ModelFormat};
    use crate::models::store::ModelStore;
    use crate::types::prediction::Label;
    use crate::types::record::{RawRecord, RawTable};

    /// Echoes the first feature back as the defect probability.
    pub(crate) struct EchoClassifier {
        pub width: Option<usize>,
    }

    impl Classifier for EchoClassifier {
        fn format(&self) -> ModelFormat {
            ModelFormat::XgboostJson
        }

        fn num_features(&self) -> Option<usize> {
            self.width
        }

        fn predict_proba(&self, features: &[f32]) -> Result<f64> {
            Ok(features.first().copied().unwrap_or(0.0) as f64)
        }
    }

    fn snapshot(width: Option<usize>, schema: Option<&[&str]>) -> std::sync::Arc<ModelSnapshot> {
        let schema = schema
            .and_then(|names| FeatureSchema::new(names.iter().map(|s| s.to_string()).collect()));
        ModelStore::default().publish(Box::new(EchoClassifier { width }), schema)
    }

    #[test]
    fn test_threshold_boundary_is_defect() {
        let engine = InferenceEngine::default();
        let snap = snapshot(Some(2), None);

        assert_eq!(engine.predict(&snap, &[0.5, 0.0]).unwrap().label, Label::Defect);
        assert_eq!(engine.predict(&snap, &[0.49, 0.0]).unwrap().label, Label::Normal);
    }

    #[test]
    fn test_width_mismatch() {
        let engine = InferenceEngine::default();
        let snap = snapshot(Some(3), None);

        let err = engine.predict(&snap, &[0.1, 0.2]).unwrap_err();
        assert!(matches!(err, InspectionError::Inference(_)));
    }

    #[test]
    fn test_invalid_probability_rejected() {
        let engine = InferenceEngine::default();
        let snap = snapshot(None, None);

        assert!(engine.predict(&snap, &[1.5]).is_err());
        assert!(engine.predict(&snap, &[f32::NAN]).is_err());
    }

    #[test]
    fn test_prediction_is_idempotent() {
        let engine = InferenceEngine::default();
        let snap = snapshot(Some(2), None);

        let first = engine.predict(&snap, &[0.73, 1.0]).unwrap();
        let second = engine.predict(&snap, &[0.73, 1.0]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_batch_from_aligned_table() {
        let engine = InferenceEngine::new(0.6);
        let snap = snapshot(None, Some(&["score", "other"]));

        let raw = RawTable::from_records(&[
            RawRecord::new().with("score", "0.9"),
            RawRecord::new().with("score", "0.2"),
            RawRecord::new().with("score", "n/a"),
        ]);
        let aligned = FeatureAligner::default().align(&raw, snap.schema());
        let predictions = engine.predict_batch(&snap, &aligned).unwrap();

        assert_eq!(predictions.len(), 3);
        assert_eq!(predictions[0].label, Label::Defect);
        assert_eq!(predictions[1].label, Label::Normal);
        // imputed median of [0.9, 0.2] = 0.55 < 0.6
        assert_eq!(predictions[2].label, Label::Normal);
    }
}
