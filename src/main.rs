//! Defect Inspection Pipeline - Main Entry Point
//!
//! Serves model upload, single-record prediction, batch-file inspection and
//! health checks over NATS request/reply.

use anyhow::{Context, Result};
use defect_inspection_pipeline::{
    config::{AppConfig, LoggingConfig},
    consumer::{acquire_worker, RequestConsumer},
    handler::{RequestHandler, SubjectRoutes},
    metrics::{MetricsReporter, PipelineMetrics},
    models::{ModelLoader, ModelStore},
    producer::ReplyPublisher,
    service::InspectionService,
};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Config path: first argument, then INSPECTION_CONFIG, then the default
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("INSPECTION_CONFIG").ok())
        .unwrap_or_else(|| "config/config.toml".to_string());
    let config = AppConfig::load_from_path(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    init_logging(&config.logging)?;

    info!("Starting Defect Inspection Pipeline");
    info!(
        path = %config_path,
        threshold = config.detection.threshold,
        workers = config.pipeline.workers,
        "Configuration loaded"
    );

    let metrics = Arc::new(PipelineMetrics::new());

    // Start without a model if the configured one cannot be loaded
    let store = Arc::new(ModelStore::new(ModelLoader::with_threads(
        config.models.onnx_threads,
    )));
    match &config.models.model_path {
        Some(path) => match store.load_file(path) {
            Ok(snapshot) => info!(
                path = %path,
                format = %snapshot.classifier().format(),
                features = ?snapshot.feature_count(),
                "Startup model loaded"
            ),
            Err(e) => warn!(
                path = %path,
                error = %e,
                "Startup model unavailable; waiting for an upload"
            ),
        },
        None => info!("No startup model configured; waiting for an upload"),
    }

    let service = Arc::new(InspectionService::from_config(&config, store));
    let routes = SubjectRoutes::from_config(&config.nats);
    let handler = Arc::new(RequestHandler::new(service, routes.clone(), metrics.clone()));

    let client = async_nats::connect(&config.nats.url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", config.nats.url))?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = RequestConsumer::new(client.clone(), routes.subjects());
    let publisher = ReplyPublisher::new(client.clone());

    let num_workers = config.pipeline.workers.max(1);
    info!(
        "Listening on {:?} with {} parallel workers",
        consumer.subjects(),
        num_workers
    );

    let semaphore = Arc::new(Semaphore::new(num_workers));

    let reporter = MetricsReporter::new(metrics.clone(), config.pipeline.metrics_interval_secs);
    tokio::spawn(reporter.start());

    let mut requests = consumer.subscribe().await?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let message = tokio::select! {
            message = requests.next() => match message {
                Some(message) => message,
                None => {
                    warn!("Request subscriptions closed");
                    break;
                }
            },
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        };

        // All workers may be busy; keep listening for the shutdown signal
        let Some(permit) = acquire_worker(semaphore.clone(), &mut shutdown).await else {
            info!("Shutdown signal received while workers were busy");
            break;
        };

        let handler = handler.clone();
        let publisher = publisher.clone();

        tokio::spawn(async move {
            let subject = message.subject.to_string();
            let reply_to = message.reply.clone();
            let payload = message.payload;

            // Inference and CSV decoding are CPU bound
            let reply =
                tokio::task::spawn_blocking(move || handler.handle(&subject, &payload)).await;

            match reply {
                Ok(reply) => {
                    if let Err(e) = publisher.publish(reply_to, reply).await {
                        error!(error = %e, "Failed to publish reply");
                    }
                }
                Err(e) => error!(error = %e, "Request worker panicked"),
            }

            drop(permit);
        });
    }

    // Let in-flight requests finish
    let _ = semaphore.acquire_many(num_workers as u32).await;
    if let Err(e) = publisher.flush().await {
        warn!(error = %e, "Failed to flush pending replies");
    }

    info!("Pipeline shutting down...");
    metrics.print_summary();

    Ok(())
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!(
            "defect_inspection_pipeline={},async_nats=warn",
            logging.level
        ))
    })?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
