//! Native evaluator for XGBoost JSON tree ensembles.
//!
//! Reads the document written by `Booster.save_model("*.json")` and scores
//! rows without an external runtime. Supported: `gbtree` and `dart`
//! boosters, numerical splits, and the logistic binary objectives.

use super::classifier::{Classifier, ModelFormat};
use crate::error::{InspectionError, Result};
use crate::feature_aligner::FeatureSchema;
use serde::Deserialize;
use tracing::debug;

#[derive(Deserialize)]
struct ModelDocument {
    learner: LearnerDocument,
}

#[derive(Deserialize)]
struct LearnerDocument {
    #[serde(default)]
    feature_names: Vec<String>,
    gradient_booster: BoosterDocument,
    learner_model_param: LearnerModelParam,
    objective: ObjectiveDocument,
}

#[derive(Deserialize)]
struct LearnerModelParam {
    base_score: String,
    #[serde(default)]
    num_class: Option<String>,
    num_feature: String,
}

#[derive(Deserialize)]
struct ObjectiveDocument {
    name: String,
}

#[derive(Deserialize)]
#[serde(tag = "name")]
enum BoosterDocument {
    #[serde(rename = "gbtree")]
    GbTree { model: TreeModelDocument },
    #[serde(rename = "dart")]
    Dart {
        gbtree: DartInnerDocument,
        weight_drop: Vec<f64>,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Deserialize)]
struct DartInnerDocument {
    model: TreeModelDocument,
}

#[derive(Deserialize)]
struct TreeModelDocument {
    trees: Vec<TreeDocument>,
}

#[derive(Deserialize)]
struct TreeDocument {
    left_children: Vec<i64>,
    right_children: Vec<i64>,
    split_indices: Vec<i64>,
    split_conditions: Vec<f32>,
    default_left: Vec<Flag>,
    #[serde(default)]
    split_type: Vec<i64>,
}

/// Older writers emit booleans, newer ones 0/1 integers.
#[derive(Deserialize, Clone, Copy)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    fn is_set(self) -> bool {
        match self {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
        }
    }
}

/// Link applied to the summed margin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Objective {
    /// `binary:logistic` / `reg:logistic`: base score is a probability
    Logistic,
    /// `binary:logitraw`: base score is already a margin
    LogitRaw,
}

const LEAF: usize = usize::MAX;

/// One regression tree in flattened array form.
#[derive(Debug, Clone)]
struct Tree {
    left: Vec<usize>,
    right: Vec<usize>,
    feature: Vec<usize>,
    /// Split threshold for internal nodes, leaf value for leaves
    value: Vec<f32>,
    default_left: Vec<bool>,
}

impl Tree {
    fn from_document(doc: TreeDocument, num_feature: usize, tree_idx: usize) -> Result<Self> {
        let nodes = doc.left_children.len();
        let invalid = |msg: String| InspectionError::ModelLoad(format!("tree {}: {}", tree_idx, msg));

        if nodes == 0 {
            return Err(invalid("no nodes".to_string()));
        }
        if doc.right_children.len() != nodes
            || doc.split_indices.len() != nodes
            || doc.split_conditions.len() != nodes
            || doc.default_left.len() != nodes
        {
            return Err(invalid("node arrays have different lengths".to_string()));
        }
        if doc.split_type.iter().any(|&t| t != 0) {
            return Err(invalid("categorical splits are not supported".to_string()));
        }

        let mut left = Vec::with_capacity(nodes);
        let mut right = Vec::with_capacity(nodes);
        let mut feature = Vec::with_capacity(nodes);

        for node in 0..nodes {
            let (l, r) = (doc.left_children[node], doc.right_children[node]);
            if l == -1 && r == -1 {
                left.push(LEAF);
                right.push(LEAF);
                feature.push(0);
                continue;
            }
            // Children are always stored after their parent; this also
            // guarantees traversal terminates.
            let child_ok = |c: i64| c > node as i64 && (c as usize) < nodes;
            if !child_ok(l) || !child_ok(r) {
                return Err(invalid(format!("node {} has invalid children ({}, {})", node, l, r)));
            }
            let split = doc.split_indices[node];
            if split < 0 || split as usize >= num_feature {
                return Err(invalid(format!(
                    "node {} splits on feature {} but model has {} features",
                    node, split, num_feature
                )));
            }
            left.push(l as usize);
            right.push(r as usize);
            feature.push(split as usize);
        }

        Ok(Self {
            left,
            right,
            feature,
            value: doc.split_conditions,
            default_left: doc.default_left.into_iter().map(Flag::is_set).collect(),
        })
    }

    fn leaf_value(&self, features: &[f32]) -> f32 {
        let mut node = 0;
        while self.left[node] != LEAF {
            let x = features.get(self.feature[node]).copied().unwrap_or(f32::NAN);
            node = if x.is_nan() {
                if self.default_left[node] {
                    self.left[node]
                } else {
                    self.right[node]
                }
            } else if x < self.value[node] {
                self.left[node]
            } else {
                self.right[node]
            };
        }
        self.value[node]
    }
}

/// Gradient-boosted tree ensemble scored natively.
#[derive(Debug, Clone)]
pub struct XgbClassifier {
    trees: Vec<Tree>,
    /// Per-tree output scale (1.0 for gbtree, `weight_drop` for dart)
    weights: Vec<f64>,
    base_margin: f64,
    num_feature: usize,
}

impl XgbClassifier {
    /// Parse a JSON model document, returning the classifier and the
    /// training feature order when the document records one.
    pub fn from_json_slice(bytes: &[u8]) -> Result<(Self, Option<FeatureSchema>)> {
        let doc: ModelDocument = serde_json::from_slice(bytes)
            .map_err(|e| InspectionError::ModelLoad(format!("invalid XGBoost JSON: {}", e)))?;
        let learner = doc.learner;

        let objective = match learner.objective.name.as_str() {
            "binary:logistic" | "reg:logistic" => Objective::Logistic,
            "binary:logitraw" => Objective::LogitRaw,
            other => {
                return Err(InspectionError::ModelLoad(format!(
                    "unsupported objective '{}', expected a binary logistic model",
                    other
                )))
            }
        };

        let params = &learner.learner_model_param;
        let num_class = params
            .num_class
            .as_deref()
            .map(parse_param_usize)
            .transpose()?
            .unwrap_or(0);
        if num_class > 1 {
            return Err(InspectionError::ModelLoad(format!(
                "multi-class model ({} classes) is not a binary classifier",
                num_class
            )));
        }
        let num_feature = parse_param_usize(&params.num_feature)?;
        let base_score = parse_param_f64(&params.base_score)?;
        let base_margin = match objective {
            Objective::Logistic => {
                if !(base_score > 0.0 && base_score < 1.0) {
                    return Err(InspectionError::ModelLoad(format!(
                        "base_score {} outside (0, 1) for logistic objective",
                        base_score
                    )));
                }
                (base_score / (1.0 - base_score)).ln()
            }
            Objective::LogitRaw => base_score,
        };

        let (tree_docs, weights) = match learner.gradient_booster {
            BoosterDocument::GbTree { model } => {
                let n = model.trees.len();
                (model.trees, vec![1.0; n])
            }
            BoosterDocument::Dart {
                gbtree,
                weight_drop,
            } => {
                if weight_drop.len() != gbtree.model.trees.len() {
                    return Err(InspectionError::ModelLoad(format!(
                        "dart model has {} trees but {} weights",
                        gbtree.model.trees.len(),
                        weight_drop.len()
                    )));
                }
                (gbtree.model.trees, weight_drop)
            }
            BoosterDocument::Unsupported => {
                return Err(InspectionError::ModelLoad(
                    "only gbtree and dart boosters are supported".to_string(),
                ))
            }
        };

        let trees = tree_docs
            .into_iter()
            .enumerate()
            .map(|(idx, doc)| Tree::from_document(doc, num_feature, idx))
            .collect::<Result<Vec<_>>>()?;

        if !learner.feature_names.is_empty() && learner.feature_names.len() != num_feature {
            return Err(InspectionError::ModelLoad(format!(
                "model lists {} feature names but num_feature is {}",
                learner.feature_names.len(),
                num_feature
            )));
        }
        let schema = FeatureSchema::new(learner.feature_names);

        debug!(
            trees = trees.len(),
            num_feature = num_feature,
            objective = %learner.objective.name,
            has_schema = schema.is_some(),
            "Parsed XGBoost model"
        );

        Ok((
            Self {
                trees,
                weights,
                base_margin,
                num_feature,
            },
            schema,
        ))
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Raw margin before the logistic link
    pub fn margin(&self, features: &[f32]) -> f64 {
        self.trees
            .iter()
            .zip(&self.weights)
            .map(|(tree, weight)| tree.leaf_value(features) as f64 * weight)
            .sum::<f64>()
            + self.base_margin
    }
}

impl Classifier for XgbClassifier {
    fn format(&self) -> ModelFormat {
        ModelFormat::XgboostJson
    }

    fn num_features(&self) -> Option<usize> {
        Some(self.num_feature)
    }

    fn predict_proba(&self, features: &[f32]) -> Result<f64> {
        if features.len() != self.num_feature {
            return Err(InspectionError::Inference(format!(
                "model expects {} features, got {}",
                self.num_feature,
                features.len()
            )));
        }
        Ok(sigmoid(self.margin(features)))
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Learner params are stored as strings, sometimes bracketed (`"[5E-1]"`).
fn strip_param(raw: &str) -> &str {
    raw.trim().trim_start_matches('[').trim_end_matches(']').trim()
}

fn parse_param_f64(raw: &str) -> Result<f64> {
    strip_param(raw)
        .parse::<f64>()
        .map_err(|_| InspectionError::ModelLoad(format!("invalid numeric parameter '{}'", raw)))
}

fn parse_param_usize(raw: &str) -> Result<usize> {
    strip_param(raw)
        .parse::<usize>()
        .map_err(|_| InspectionError::ModelLoad(format!("invalid integer parameter '{}'", raw)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// Two stumps over `[temp, pressure]`:
    /// tree 0: temp < 200 ? -1.0 : 1.0 (missing goes left)
    /// tree 1: pressure < 5 ? 0.5 : -0.5 (missing goes right)
    pub(crate) fn stump_model(base_score: &str) -> serde_json::Value {
        json!({
            "learner": {
                "attributes": {},
                "feature_names": ["temp", "pressure"],
                "feature_types": ["float", "float"],
                "gradient_booster": {
                    "model": {
                        "gbtree_model_param": {"num_parallel_tree": "1", "num_trees": "2"},
                        "iteration_indptr": [0, 1, 2],
                        "tree_info": [0, 0],
                        "trees": [
                            {
                                "id": 0,
                                "left_children": [1, -1, -1],
                                "right_children": [2, -1, -1],
                                "split_indices": [0, 0, 0],
                                "split_conditions": [200.0, -1.0, 1.0],
                                "default_left": [1, 0, 0],
                                "split_type": [0, 0, 0],
                                "base_weights": [0.0, -1.0, 1.0]
                            },
                            {
                                "id": 1,
                                "left_children": [1, -1, -1],
                                "right_children": [2, -1, -1],
                                "split_indices": [1, 0, 0],
                                "split_conditions": [5.0, 0.5, -0.5],
                                "default_left": [0, 0, 0],
                                "split_type": [0, 0, 0],
                                "base_weights": [0.0, 0.5, -0.5]
                            }
                        ]
                    },
                    "name": "gbtree"
                },
                "learner_model_param": {
                    "base_score": base_score,
                    "num_class": "0",
                    "num_feature": "2",
                    "num_target": "1"
                },
                "objective": {"name": "binary:logistic", "reg_loss_param": {"scale_pos_weight": "1"}}
            },
            "version": [2, 0, 3]
        })
    }

    fn load(doc: &serde_json::Value) -> Result<(XgbClassifier, Option<FeatureSchema>)> {
        XgbClassifier::from_json_slice(&serde_json::to_vec(doc).unwrap())
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_parses_schema_and_width() {
        let (model, schema) = load(&stump_model("5E-1")).unwrap();

        assert_eq!(model.tree_count(), 2);
        assert_eq!(model.num_features(), Some(2));
        assert_eq!(schema.unwrap().names(), &["temp", "pressure"]);
    }

    #[test]
    fn test_predict_proba() {
        let (model, _) = load(&stump_model("5E-1")).unwrap();

        // 1.0 + 0.5
        assert!(approx(model.predict_proba(&[250.0, 3.0]).unwrap(), sigmoid(1.5)));
        // -1.0 - 0.5
        assert!(approx(model.predict_proba(&[150.0, 10.0]).unwrap(), sigmoid(-1.5)));
        // split boundary goes right
        assert!(approx(model.predict_proba(&[200.0, 5.0]).unwrap(), sigmoid(0.5)));
    }

    #[test]
    fn test_missing_values_follow_default_direction() {
        let (model, _) = load(&stump_model("5E-1")).unwrap();
        assert!(approx(model.margin(&[f32::NAN, f32::NAN]), -1.5));
    }

    #[test]
    fn test_base_score_shifts_margin() {
        let (model, _) = load(&stump_model("[7.5E-1]")).unwrap();
        let expected = 1.5 + (0.75f64 / 0.25).ln();
        assert!(approx(model.margin(&[250.0, 3.0]), expected));
    }

    #[test]
    fn test_dart_weights() {
        let mut doc = stump_model("5E-1");
        let model = doc["learner"]["gradient_booster"]["model"].take();
        doc["learner"]["gradient_booster"] = json!({
            "name": "dart",
            "gbtree": {"name": "gbtree", "model": model},
            "weight_drop": [1.0, 0.5]
        });

        let (model, _) = load(&doc).unwrap();
        assert!(approx(model.margin(&[250.0, 3.0]), 1.25));
    }

    #[test]
    fn test_width_mismatch_is_inference_error() {
        let (model, _) = load(&stump_model("5E-1")).unwrap();
        let err = model.predict_proba(&[1.0]).unwrap_err();
        assert!(matches!(err, InspectionError::Inference(_)));
    }

    #[test]
    fn test_rejects_unsupported_models() {
        let mut multiclass = stump_model("5E-1");
        multiclass["learner"]["objective"]["name"] = json!("multi:softprob");
        assert!(matches!(load(&multiclass), Err(InspectionError::ModelLoad(_))));

        let mut linear = stump_model("5E-1");
        linear["learner"]["gradient_booster"] = json!({"name": "gblinear", "model": {}});
        assert!(matches!(load(&linear), Err(InspectionError::ModelLoad(_))));

        let mut cyclic = stump_model("5E-1");
        cyclic["learner"]["gradient_booster"]["model"]["trees"][0]["left_children"] = json!([0, -1, -1]);
        assert!(matches!(load(&cyclic), Err(InspectionError::ModelLoad(_))));

        assert!(matches!(
            XgbClassifier::from_json_slice(b"{\"not\": \"a model\"}"),
            Err(InspectionError::ModelLoad(_))
        ));
    }

    #[test]
    fn test_without_feature_names() {
        let mut doc = stump_model("5E-1");
        doc["learner"].as_object_mut().unwrap().remove("feature_names");

        let (_, schema) = load(&doc).unwrap();
        assert!(schema.is_none());
    }
}
