//! ONNX Runtime classifier

use super::classifier::{Classifier, ModelFormat};
use crate::error::{InspectionError, Result};
use crate::feature_aligner::FeatureSchema;
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use parking_lot::Mutex;
use tracing::{debug, info};

/// Custom metadata key holding comma-separated training feature names
const FEATURE_NAMES_KEY: &str = "feature_names";

/// Binary classifier backed by an ONNX Runtime session
pub struct OnnxClassifier {
    /// `Session::run` needs exclusive access
    session: Mutex<Session>,
    /// Input name for the model
    input_name: String,
    /// Output name for probabilities
    output_name: String,
}

impl OnnxClassifier {
    /// Build a session from in-memory model bytes
    pub fn from_bytes(bytes: &[u8], onnx_threads: usize) -> Result<(Self, Option<FeatureSchema>)> {
        let load_err = |e: ort::Error| InspectionError::ModelLoad(format!("ONNX: {}", e));

        let session = Session::builder()
            .map_err(load_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(load_err)?
            .with_intra_threads(onnx_threads)
            .map_err(load_err)?
            .commit_from_memory(bytes)
            .map_err(load_err)?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob") || o.name.contains("output"))
            .map(|o| o.name.clone())
            .unwrap_or_else(|| {
                session
                    .outputs
                    .last()
                    .map(|o| o.name.clone())
                    .unwrap_or_else(|| "probabilities".to_string())
            });

        let schema = session
            .metadata()
            .and_then(|m| m.custom(FEATURE_NAMES_KEY))
            .ok()
            .flatten()
            .and_then(|names| {
                FeatureSchema::new(
                    names
                        .split(',')
                        .map(|n| n.trim().to_string())
                        .filter(|n| !n.is_empty())
                        .collect(),
                )
            });

        info!(
            input = %input_name,
            output = %output_name,
            threads = onnx_threads,
            has_schema = schema.is_some(),
            "ONNX model loaded"
        );

        Ok((
            Self {
                session: Mutex::new(session),
                input_name,
                output_name,
            },
            schema,
        ))
    }
}

impl Classifier for OnnxClassifier {
    fn format(&self) -> ModelFormat {
        ModelFormat::Onnx
    }

    fn num_features(&self) -> Option<usize> {
        None
    }

    fn predict_proba(&self, features: &[f32]) -> Result<f64> {
        let infer_err = |e: ort::Error| InspectionError::Inference(e.to_string());

        // Prepare input tensor - shape [1, num_features]
        let shape = vec![1_i64, features.len() as i64];
        let input_tensor = Tensor::from_array((shape, features.to_vec())).map_err(infer_err)?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(infer_err)?;

        extract_probability(&outputs, &self.output_name)
    }
}

/// Extract defect probability from model output.
/// Handles tensor outputs (XGBoost, RandomForest) and seq(map) outputs (CatBoost, LightGBM).
fn extract_probability(outputs: &SessionOutputs, output_name: &str) -> Result<f64> {
    if let Some(output) = outputs.get(output_name) {
        if let Some(prob) = extract_from_value(&output) {
            return Ok(prob);
        }
    }

    // Fallback: any non-label output that yields a probability
    for (name, output) in outputs.iter() {
        if name.contains("label") {
            continue;
        }
        if let Some(prob) = extract_from_value(&output) {
            debug!(output = %name, prob = prob, "Extracted probability from fallback output");
            return Ok(prob);
        }
    }

    Err(InspectionError::Inference(
        "model produced no probability output".to_string(),
    ))
}

fn extract_from_value(output: &DynValue) -> Option<f64> {
    if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
        let dims: Vec<i64> = shape.iter().copied().collect();
        return extract_from_tensor(&dims, data);
    }

    let dtype = output.dtype();
    if DynSequenceValueType::can_downcast(&dtype) {
        return extract_from_sequence_map(output);
    }
    None
}

/// `[batch, classes]`, `[classes]` or single-probability tensors
fn extract_from_tensor(dims: &[i64], data: &[f32]) -> Option<f64> {
    let classes = *dims.last()?;
    let prob = if classes >= 2 {
        data.get(1)
    } else {
        data.first()
    };
    prob.map(|&p| p as f64)
}

/// seq(map(int64, float)) as exported by CatBoost and LightGBM
fn extract_from_sequence_map(output: &DynValue) -> Option<f64> {
    let allocator = Allocator::default();
    let sequence = output.downcast_ref::<DynSequenceValueType>().ok()?;
    let maps = sequence
        .try_extract_sequence::<DynMapValueType>(&allocator)
        .ok()?;
    let kv_pairs = maps.first()?.try_extract_key_values::<i64, f32>().ok()?;

    if let Some((_, prob)) = kv_pairs.iter().find(|(class_id, _)| *class_id == 1) {
        return Some(*prob as f64);
    }
    kv_pairs
        .iter()
        .find(|(class_id, _)| *class_id == 0)
        .map(|(_, prob)| 1.0 - *prob as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_from_tensor_shapes() {
        assert_eq!(extract_from_tensor(&[1, 2], &[0.25, 0.75]), Some(0.75));
        assert_eq!(extract_from_tensor(&[2], &[0.4, 0.6]), Some(0.6f32 as f64));
        assert_eq!(extract_from_tensor(&[1, 1], &[0.5]), Some(0.5));
        assert_eq!(extract_from_tensor(&[], &[]), None);
    }

    #[test]
    fn test_garbage_bytes_fail_to_load() {
        let result = OnnxClassifier::from_bytes(b"definitely not onnx", 1);
        assert!(matches!(result, Err(InspectionError::ModelLoad(_))));
    }
}
