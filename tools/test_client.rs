//! Test Inspection Client
//!
//! Generates synthetic injection-molding inspection data and exercises the
//! service over NATS request/reply: optional model upload, health check,
//! single-record predictions and one batch-file inspection.
//!
//! Usage: test-client [nats_url] [rows] [defect_rate] [model_path] [labeled]

use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use rand::Rng;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

const HEAD_SENSORS: [&str; 3] = ["EX1.H2_PV", "EX1.H3_PV", "EX1.H4_PV"];
const SCREW_SENSORS: [&str; 3] = ["EX1.Z1_PV", "EX1.Z2_PV", "EX1.Z4_PV"];

/// One generated inspection row
struct InspectionRow {
    timestamp: NaiveDateTime,
    head: [f64; 3],
    screw: [f64; 3],
    cycle_time: f64,
    injection_pressure: f64,
    defect: bool,
}

/// Produces sensor readings with a drift on defective parts
struct RowGenerator {
    rng: rand::rngs::ThreadRng,
    clock: NaiveDateTime,
}

impl RowGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            clock: Utc::now().naive_utc() - ChronoDuration::minutes(30),
        }
    }

    fn generate(&mut self, defect: bool) -> InspectionRow {
        self.clock += ChronoDuration::seconds(self.rng.gen_range(5..25));
        let drift = if defect { self.rng.gen_range(8.0..20.0) } else { 0.0 };

        InspectionRow {
            timestamp: self.clock,
            head: [
                self.rng.gen_range(228.0..234.0) + drift,
                self.rng.gen_range(224.0..230.0) + drift,
                self.rng.gen_range(218.0..224.0) + drift,
            ],
            screw: [
                self.rng.gen_range(178.0..184.0) - drift / 2.0,
                self.rng.gen_range(188.0..194.0),
                self.rng.gen_range(198.0..204.0),
            ],
            cycle_time: self.rng.gen_range(28.0..32.0) + if defect { 4.0 } else { 0.0 },
            injection_pressure: self.rng.gen_range(95.0..105.0) - drift,
            defect,
        }
    }
}

impl InspectionRow {
    fn csv_header(labeled: bool) -> Vec<String> {
        let mut columns = vec!["timestamp".to_string()];
        columns.extend(HEAD_SENSORS.iter().map(|s| s.to_string()));
        columns.extend(SCREW_SENSORS.iter().map(|s| s.to_string()));
        columns.push("cycle_time".to_string());
        columns.push("injection_pressure".to_string());
        if labeled {
            columns.push("passorfail".to_string());
        }
        columns
    }

    fn csv_record(&self, labeled: bool) -> Vec<String> {
        let mut cells = vec![self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()];
        cells.extend(self.head.iter().map(|v| format!("{:.2}", v)));
        cells.extend(self.screw.iter().map(|v| format!("{:.2}", v)));
        cells.push(format!("{:.2}", self.cycle_time));
        cells.push(format!("{:.2}", self.injection_pressure));
        if labeled {
            cells.push(u8::from(self.defect).to_string());
        }
        cells
    }

    /// Single-record payload; sensor values as text to exercise numeric casting
    fn record(&self) -> Value {
        let mut record = serde_json::Map::new();
        for (name, value) in HEAD_SENSORS.iter().zip(self.head) {
            record.insert(name.to_string(), json!(format!("{:.2}", value)));
        }
        for (name, value) in SCREW_SENSORS.iter().zip(self.screw) {
            record.insert(name.to_string(), json!(value));
        }
        record.insert("cycle_time".to_string(), json!(self.cycle_time));
        record.insert("injection_pressure".to_string(), Value::Null);
        Value::Object(record)
    }
}

fn build_batch(
    rows: usize,
    defect_rate: f64,
    labeled: bool,
) -> anyhow::Result<(Vec<u8>, Vec<InspectionRow>)> {
    let mut generator = RowGenerator::new();
    let mut rng = rand::thread_rng();

    let rows: Vec<InspectionRow> = (0..rows)
        .map(|_| generator.generate(rng.gen_bool(defect_rate)))
        .collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(InspectionRow::csv_header(labeled))?;
    for row in &rows {
        writer.write_record(row.csv_record(labeled))?;
    }
    let csv = writer.into_inner().map_err(|e| anyhow::anyhow!("flushing CSV: {}", e))?;
    Ok((csv, rows))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_client=info".parse()?),
        )
        .init();

    info!("Starting Test Inspection Client");

    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let rows: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(200);
    let defect_rate: f64 = args
        .get(3)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.08_f64)
        .clamp(0.0, 1.0);
    let model_path = args.get(4).filter(|s| !s.is_empty() && s.as_str() != "-");
    let labeled = args.get(5).is_some_and(|s| s == "labeled");

    info!(
        nats_url = %nats_url,
        rows = rows,
        defect_rate = defect_rate,
        model = ?model_path,
        labeled = labeled,
        "Configuration loaded"
    );

    let (csv, generated) = build_batch(rows, defect_rate, labeled)?;

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(&csv, &generated);
        }
    };

    if let Some(path) = model_path {
        let bytes = tokio::fs::read(path).await?;
        let reply = request(&client, "inspection.model.upload", bytes).await?;
        info!("Model upload reply:\n{}", reply);
    }

    let reply = request(&client, "inspection.health", Vec::new()).await?;
    info!("Health reply:\n{}", reply);

    for row in generated.iter().take(3) {
        let payload = serde_json::to_vec(&row.record())?;
        let reply = request(&client, "inspection.predict", payload).await?;
        info!(expected_defect = row.defect, "Predict reply:\n{}", reply);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let reply = request(&client, "inspection.predict.file", csv).await?;
    info!("Batch reply:\n{}", reply);

    Ok(())
}

/// Send one request and pretty-print the JSON reply
async fn request(client: &async_nats::Client, subject: &str, payload: Vec<u8>) -> anyhow::Result<String> {
    let message = client.request(subject.to_string(), payload.into()).await?;
    let body: Value = serde_json::from_slice(&message.payload)?;
    Ok(serde_json::to_string_pretty(&body)?)
}

fn run_dry_mode(csv: &[u8], generated: &[InspectionRow]) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let defects = generated.iter().filter(|r| r.defect).count();
    info!(
        "Generated {} rows ({} defective)",
        generated.len(),
        defects
    );

    let text = String::from_utf8_lossy(csv);
    let preview: Vec<&str> = text.lines().take(6).collect();
    info!("CSV preview:\n{}", preview.join("\n"));

    if let Some(row) = generated.first() {
        info!(
            "Sample record:\n{}",
            serde_json::to_string_pretty(&row.record())?
        );
    }

    Ok(())
}
