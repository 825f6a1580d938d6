//! ML model loading and inference components

pub mod classifier;
pub mod inference;
pub mod loader;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod store;
pub mod xgboost;

pub use classifier::{Classifier, ModelFormat};
pub use inference::InferenceEngine;
pub use loader::ModelLoader;
pub use store::{ModelSnapshot, ModelStore};
