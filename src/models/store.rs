//! Process-wide model snapshot with atomic reload.
//!
//! A reload decodes the replacement model completely before taking the
//! write lock, and the lock is only held to swap one `Arc`. Requests clone
//! the `Arc` once and keep using that snapshot even if a reload lands
//! mid-request, so classifier and schema always come from the same upload.

use super::classifier::Classifier;
use super::loader::{LoadedModel, ModelLoader};
use crate::error::{InspectionError, Result};
use crate::feature_aligner::FeatureSchema;
use crate::types::report::{ModelInfo, ServiceStatus};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Immutable pairing of a classifier and its feature order
pub struct ModelSnapshot {
    classifier: Box<dyn Classifier>,
    schema: Option<FeatureSchema>,
    version: u64,
    loaded_at: DateTime<Utc>,
}

impl ModelSnapshot {
    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    pub fn schema(&self) -> Option<&FeatureSchema> {
        self.schema.as_ref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Input width: the schema length, else whatever the classifier declares
    pub fn feature_count(&self) -> Option<usize> {
        self.schema
            .as_ref()
            .map(FeatureSchema::len)
            .or_else(|| self.classifier.num_features())
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            status: "ok",
            format: self.classifier.format().to_string(),
            feature_count: self.feature_count(),
            has_schema: self.schema.is_some(),
            version: self.version,
        }
    }
}

/// Holder of the currently published model
pub struct ModelStore {
    loader: ModelLoader,
    current: RwLock<Option<Arc<ModelSnapshot>>>,
    versions: AtomicU64,
}

impl ModelStore {
    pub fn new(loader: ModelLoader) -> Self {
        Self {
            loader,
            current: RwLock::new(None),
            versions: AtomicU64::new(0),
        }
    }

    /// Decode and publish model bytes. On failure the current snapshot is kept.
    pub fn load_model(&self, bytes: &[u8]) -> Result<Arc<ModelSnapshot>> {
        let LoadedModel { classifier, schema } = self.loader.load_bytes(bytes)?;
        Ok(self.publish(classifier, schema))
    }

    /// Decode and publish a model file.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<Arc<ModelSnapshot>> {
        let LoadedModel { classifier, schema } = self.loader.load_file(path)?;
        Ok(self.publish(classifier, schema))
    }

    /// Publish an already constructed classifier as the new snapshot.
    pub fn publish(
        &self,
        classifier: Box<dyn Classifier>,
        schema: Option<FeatureSchema>,
    ) -> Arc<ModelSnapshot> {
        // Versions are assigned under the write lock so publish order and
        // version order agree.
        let mut current = self.current.write();
        let snapshot = Arc::new(ModelSnapshot {
            classifier,
            schema,
            version: self.versions.fetch_add(1, Ordering::Relaxed) + 1,
            loaded_at: Utc::now(),
        });
        let previous = current.replace(Arc::clone(&snapshot));
        drop(current);

        info!(
            version = snapshot.version,
            format = %snapshot.classifier.format(),
            features = ?snapshot.feature_count(),
            has_schema = snapshot.schema.is_some(),
            replaced = ?previous.as_ref().map(|p| p.version),
            "Model snapshot published"
        );

        snapshot
    }

    /// Snapshot to use for the whole of one request
    pub fn current_snapshot(&self) -> Option<Arc<ModelSnapshot>> {
        self.current.read().clone()
    }

    /// Like `current_snapshot`, failing with `ModelNotLoaded` when empty
    pub fn require_snapshot(&self) -> Result<Arc<ModelSnapshot>> {
        self.current_snapshot().ok_or(InspectionError::ModelNotLoaded)
    }

    pub fn status(&self) -> ServiceStatus {
        let snapshot = self.current_snapshot();
        ServiceStatus {
            status: "ok",
            model_loaded: snapshot.is_some(),
            format: snapshot.as_ref().map(|s| s.classifier.format().to_string()),
            feature_count: snapshot.as_ref().and_then(|s| s.feature_count()),
            version: snapshot.as_ref().map(|s| s.version),
            loaded_at: snapshot.as_ref().map(|s| s.loaded_at),
        }
    }
}

impl Default for ModelStore {
    fn default() -> Self {
        Self::new(ModelLoader::default())
    }
}
