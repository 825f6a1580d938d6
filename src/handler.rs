//! Routes inbound request subjects to service operations and builds replies.

use crate::config::NatsConfig;
use crate::decoder::TableDecoder;
use crate::error::{InspectionError, Result};
use crate::metrics::PipelineMetrics;
use crate::service::InspectionService;
use crate::types::prediction::Label;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Request kinds accepted over the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ModelUpload,
    Predict,
    PredictFile,
    Health,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::ModelUpload => "model_upload",
            Operation::Predict => "predict",
            Operation::PredictFile => "predict_file",
            Operation::Health => "health",
        }
    }
}

/// Subject to operation table
#[derive(Debug, Clone)]
pub struct SubjectRoutes {
    routes: Vec<(String, Operation)>,
}

impl SubjectRoutes {
    pub fn from_config(config: &NatsConfig) -> Self {
        Self {
            routes: vec![
                (config.model_upload_subject.clone(), Operation::ModelUpload),
                (config.predict_subject.clone(), Operation::Predict),
                (config.predict_file_subject.clone(), Operation::PredictFile),
                (config.health_subject.clone(), Operation::Health),
            ],
        }
    }

    pub fn resolve(&self, subject: &str) -> Option<Operation> {
        self.routes
            .iter()
            .find(|(s, _)| s == subject)
            .map(|&(_, op)| op)
    }

    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|(s, _)| s.as_str())
    }
}

/// Outcome of one handled request
#[derive(Debug)]
pub struct Reply {
    pub operation: Option<Operation>,
    pub ok: bool,
    pub payload: Vec<u8>,
}

/// Synchronous request handler; run it on a blocking thread.
pub struct RequestHandler {
    service: Arc<InspectionService>,
    routes: SubjectRoutes,
    metrics: Arc<PipelineMetrics>,
}

impl RequestHandler {
    pub fn new(
        service: Arc<InspectionService>,
        routes: SubjectRoutes,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            service,
            routes,
            metrics,
        }
    }

    pub fn routes(&self) -> &SubjectRoutes {
        &self.routes
    }

    /// Handle one request. Every failure is turned into an error payload.
    pub fn handle(&self, subject: &str, payload: &[u8]) -> Reply {
        let start = Instant::now();
        let operation = self.routes.resolve(subject);

        let result = match operation {
            Some(op) => self.dispatch(op, payload),
            None => Err(InspectionError::Validation(format!(
                "unknown subject {}",
                subject
            ))),
        };

        let elapsed = start.elapsed();
        let op_name = operation.map_or("unknown", |op| op.as_str());
        self.metrics.record_request(op_name, elapsed);

        match result {
            Ok(body) => {
                debug!(
                    operation = op_name,
                    bytes_in = payload.len(),
                    bytes_out = body.len(),
                    elapsed_us = elapsed.as_micros() as u64,
                    "Request handled"
                );
                Reply {
                    operation,
                    ok: true,
                    payload: body,
                }
            }
            Err(e) => {
                self.metrics.record_failure(e.code());
                match e {
                    InspectionError::ModelNotLoaded
                    | InspectionError::Decode(_)
                    | InspectionError::Validation(_) => {
                        warn!(operation = op_name, code = e.code(), error = %e, "Request rejected")
                    }
                    _ => error!(operation = op_name, code = e.code(), error = %e, "Request failed"),
                }
                Reply {
                    operation,
                    ok: false,
                    payload: error_payload(&e),
                }
            }
        }
    }

    fn dispatch(&self, operation: Operation, payload: &[u8]) -> Result<Vec<u8>> {
        match operation {
            Operation::ModelUpload => to_json(&self.service.upload_model(payload)?),
            Operation::Predict => {
                let record = TableDecoder::decode_record(payload)?;
                let prediction = self.service.predict_record(&record)?;
                self.metrics.record_probabilities([prediction.probability]);
                self.metrics
                    .record_defects(u64::from(prediction.label == Label::Defect));
                to_json(&prediction)
            }
            Operation::PredictFile => {
                let result = self.service.predict_file(payload)?;
                if let Some(probabilities) = &result.probabilities {
                    self.metrics.record_probabilities(probabilities.iter().copied());
                }
                self.metrics.record_defects(result.kpis.defect_total as u64);
                to_json(&result)
            }
            Operation::Health => to_json(&self.service.status()),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| InspectionError::Inference(format!("encoding reply: {}", e)))
}

fn error_payload(err: &InspectionError) -> Vec<u8> {
    serde_json::to_vec(&err.to_response()).unwrap_or_else(|_| {
        br#"{"status":"error","code":"inference_error","message":"unencodable error"}"#.to_vec()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::models::xgboost::tests::stump_model;
    use serde_json::Value;

    fn handler() -> RequestHandler {
        let config = AppConfig::default();
        RequestHandler::new(
            Arc::new(InspectionService::default()),
            SubjectRoutes::from_config(&config.nats),
            Arc::new(PipelineMetrics::new()),
        )
    }

    fn json(reply: &Reply) -> Value {
        serde_json::from_slice(&reply.payload).unwrap()
    }

    #[test]
    fn test_routes_resolve_default_subjects() {
        let routes = SubjectRoutes::from_config(&AppConfig::default().nats);

        assert_eq!(routes.resolve("inspection.predict"), Some(Operation::Predict));
        assert_eq!(routes.resolve("inspection.predict.file"), Some(Operation::PredictFile));
        assert_eq!(routes.resolve("inspection.model.upload"), Some(Operation::ModelUpload));
        assert_eq!(routes.resolve("inspection.health"), Some(Operation::Health));
        assert_eq!(routes.resolve("inspection.other"), None);
        assert_eq!(routes.subjects().count(), 4);
    }

    #[test]
    fn test_health_without_model() {
        let reply = handler().handle("inspection.health", b"");
        let body = json(&reply);

        assert!(reply.ok);
        assert_eq!(body["modelLoaded"], false);
        assert!(body["version"].is_null());
    }

    #[test]
    fn test_predict_without_model_is_structured_error() {
        let handler = handler();
        let reply = handler.handle("inspection.predict", br#"{"temp": 210}"#);
        let body = json(&reply);

        assert!(!reply.ok);
        assert_eq!(body["status"], "error");
        assert_eq!(body["code"], "model_not_loaded");
        assert_eq!(handler.metrics.failures_by_code()["model_not_loaded"], 1);
    }

    #[test]
    fn test_upload_then_predict() {
        let handler = handler();
        let model = serde_json::to_vec(&stump_model("5E-1")).unwrap();

        let reply = handler.handle("inspection.model.upload", &model);
        let body = json(&reply);
        assert!(reply.ok);
        assert_eq!(body["format"], "xgboost-json");
        assert_eq!(body["featureCount"], 2);

        let reply = handler.handle("inspection.predict", br#"{"temp": 250, "pressure": "3"}"#);
        let body = json(&reply);
        assert!(reply.ok);
        assert_eq!(body["label"], "DEFECT");
        assert_eq!(body["prediction"], 1);
        assert_eq!(handler.metrics.defects_found.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[test]
    fn test_predict_file_payload_shape() {
        let reply = handler().handle(
            "inspection.predict.file",
            b"time,EX1.H2_PV,passorfail\n08:00:01,230,0\n08:00:31,232,1\n",
        );
        let body = json(&reply);

        assert!(reply.ok);
        assert_eq!(body["kpis"]["totalInspects"], 2);
        assert_eq!(body["kpis"]["defectRatePct"], 50.0);
        assert_eq!(body["timeSeries"][0]["time"], "08:00");
        assert_eq!(body["headSensors"][0]["EX1.H2_PV"], 231.0);
        assert_eq!(body["preview"][1]["inspectionLabel"], "DEFECT");
        assert!(body["screwSensors"].as_array().unwrap().len() == 1);
    }

    #[test]
    fn test_bad_payloads() {
        let handler = handler();

        let body = json(&handler.handle("inspection.predict", b"[1,2]"));
        assert_eq!(body["code"], "decode_error");

        let body = json(&handler.handle("inspection.model.upload", b"garbage"));
        assert_eq!(body["code"], "model_load_error");

        let body = json(&handler.handle("inspection.unknown", b"{}"));
        assert_eq!(body["code"], "validation_error");
    }
}
