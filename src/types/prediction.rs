//! Inspection verdict data structures

use serde::{Deserialize, Serialize};

/// Default probability cut-off; the boundary itself is a defect.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Binary inspection outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Label {
    Normal,
    Defect,
}

impl Label {
    /// Determine label from a class-1 probability and threshold
    pub fn from_probability(probability: f64, threshold: f64) -> Self {
        if probability >= threshold {
            Label::Defect
        } else {
            Label::Normal
        }
    }

    /// Map a ground-truth class id (0 = normal, 1 = defect)
    pub fn from_class_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Label::Normal),
            1 => Some(Label::Defect),
            _ => None,
        }
    }

    pub fn class_id(&self) -> u8 {
        match self {
            Label::Normal => 0,
            Label::Defect => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Normal => "NORMAL",
            Label::Defect => "DEFECT",
        }
    }
}

/// Model verdict for one aligned row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Class-1 (defect) probability in [0, 1]
    pub probability: f64,
    pub label: Label,
}

impl Prediction {
    pub fn new(probability: f64, threshold: f64) -> Self {
        Self {
            probability,
            label: Label::from_probability(probability, threshold),
        }
    }
}

/// Single-record response payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPrediction {
    /// 0 = normal, 1 = defect
    pub prediction: u8,
    pub label: Label,
    pub probability: f64,
}

impl From<Prediction> for RecordPrediction {
    fn from(p: Prediction) -> Self {
        Self {
            prediction: p.label.class_id(),
            label: p.label,
            probability: p.probability,
        }
    }
}
