//! Inspection service: the request boundary over model store, aligner,
//! inference engine and aggregators.

use crate::aggregation::{KpiAggregator, TimeBucketAggregator};
use crate::config::AppConfig;
use crate::decoder::TableDecoder;
use crate::error::{InspectionError, Result};
use crate::feature_aligner::FeatureAligner;
use crate::models::inference::InferenceEngine;
use crate::models::loader::ModelLoader;
use crate::models::store::ModelStore;
use crate::types::prediction::{Label, RecordPrediction};
use crate::types::record::{RawRecord, RawTable, RawValue};
use crate::types::report::{BatchResult, ModelInfo, PreviewRow, ServiceStatus};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Labels for one batch and where they came from
struct BatchLabels {
    labels: Vec<Label>,
    /// Present only when the model produced the labels
    probabilities: Option<Vec<f64>>,
}

pub struct InspectionService {
    store: Arc<ModelStore>,
    aligner: FeatureAligner,
    engine: InferenceEngine,
    buckets: TimeBucketAggregator,
    label_column: String,
    preview_rows: usize,
}

impl InspectionService {
    pub fn new(
        store: Arc<ModelStore>,
        aligner: FeatureAligner,
        engine: InferenceEngine,
        buckets: TimeBucketAggregator,
        label_column: impl Into<String>,
        preview_rows: usize,
    ) -> Self {
        Self {
            store,
            aligner,
            engine,
            buckets,
            label_column: label_column.into(),
            preview_rows,
        }
    }

    /// Wire the service from configuration around a shared store.
    pub fn from_config(config: &AppConfig, store: Arc<ModelStore>) -> Self {
        Self::new(
            store,
            FeatureAligner::from_config(&config.alignment),
            InferenceEngine::from_config(&config.detection),
            TimeBucketAggregator::from_config(&config.aggregation),
            config.aggregation.label_column.clone(),
            config.aggregation.preview_rows,
        )
    }

    pub fn store(&self) -> &Arc<ModelStore> {
        &self.store
    }

    /// Replace the active model. A rejected upload keeps the previous one.
    pub fn upload_model(&self, bytes: &[u8]) -> Result<ModelInfo> {
        let snapshot = self.store.load_model(bytes)?;
        let info = snapshot.info();
        info!(
            version = info.version,
            format = %info.format,
            features = ?info.feature_count,
            bytes = bytes.len(),
            "Model uploaded"
        );
        Ok(info)
    }

    pub fn status(&self) -> ServiceStatus {
        self.store.status()
    }

    /// Score one record against the active model.
    pub fn predict_record(&self, record: &RawRecord) -> Result<RecordPrediction> {
        let snapshot = self.store.require_snapshot()?;
        let table = RawTable::from_records(std::slice::from_ref(record));
        let aligned = self.aligner.align(&table, snapshot.schema());

        let row = aligned
            .rows()
            .first()
            .ok_or_else(|| InspectionError::Inference("record produced no aligned row".to_string()))?;
        let prediction = self.engine.predict(&snapshot, row)?;

        debug!(
            model_version = snapshot.version(),
            probability = prediction.probability,
            label = prediction.label.as_str(),
            "Record scored"
        );
        Ok(prediction.into())
    }

    /// Decode an uploaded CSV file and summarise it.
    pub fn predict_file(&self, bytes: &[u8]) -> Result<BatchResult> {
        let table = TableDecoder::decode_csv(bytes)?;
        self.predict_batch(&table)
    }

    /// Label every row (ground truth when present, the model otherwise) and
    /// build the KPI, trend and preview payload.
    pub fn predict_batch(&self, table: &RawTable) -> Result<BatchResult> {
        let request_id = Uuid::new_v4().to_string();

        let ground_truth = table.has_column(&self.label_column);
        let batch = if ground_truth {
            self.ground_truth_labels(table)?
        } else {
            self.model_labels(table)?
        };

        let summary = KpiAggregator::summarize(&batch.labels);
        let buckets = self.buckets.aggregate(table, &batch.labels);
        let preview = self.preview(table, &batch);

        info!(
            request_id = %request_id,
            rows = table.len(),
            ground_truth = ground_truth,
            defects = summary.kpis.defect_total,
            defect_rate_pct = summary.kpis.defect_rate_pct,
            "Batch inspected"
        );

        Ok(BatchResult {
            status: "ok",
            request_id,
            ground_truth,
            kpis: summary.kpis,
            distribution: summary.distribution,
            time_series: buckets.time_series,
            head_sensors: buckets.head_sensors,
            screw_sensors: buckets.screw_sensors,
            preview,
            probabilities: batch.probabilities,
        })
    }

    fn ground_truth_labels(&self, table: &RawTable) -> Result<BatchLabels> {
        let labels = table
            .column(&self.label_column)
            .into_iter()
            .flatten()
            .enumerate()
            .map(|(row, value)| {
                parse_ground_truth(value).ok_or_else(|| {
                    InspectionError::Validation(format!(
                        "row {}: {} must be 0 or 1, got {}",
                        row + 1,
                        self.label_column,
                        value.to_json()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(BatchLabels {
            labels,
            probabilities: None,
        })
    }

    fn model_labels(&self, table: &RawTable) -> Result<BatchLabels> {
        let snapshot = self.store.require_snapshot()?;
        let aligned = self.aligner.align(table, snapshot.schema());
        let predictions = self.engine.predict_batch(&snapshot, &aligned)?;

        Ok(BatchLabels {
            labels: predictions.iter().map(|p| p.label).collect(),
            probabilities: Some(predictions.iter().map(|p| p.probability).collect()),
        })
    }

    fn preview(&self, table: &RawTable, batch: &BatchLabels) -> Vec<PreviewRow> {
        table
            .rows()
            .iter()
            .zip(&batch.labels)
            .take(self.preview_rows)
            .enumerate()
            .map(|(idx, (row, label))| PreviewRow {
                values: table
                    .columns()
                    .iter()
                    .zip(row)
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect(),
                inspection_label: *label,
                defect_probability: batch.probabilities.as_ref().map(|p| p[idx]),
            })
            .collect()
    }
}

impl Default for InspectionService {
    fn default() -> Self {
        Self::from_config(&AppConfig::default(), Arc::new(ModelStore::new(ModelLoader::default())))
    }
}

/// Accepts 0/1 as numbers, numeric text or booleans.
fn parse_ground_truth(value: &RawValue) -> Option<Label> {
    match value.as_number()? {
        v if v == 0.0 => Some(Label::Normal),
        v if v == 1.0 => Some(Label::Defect),
        _ => None,
    }
}
