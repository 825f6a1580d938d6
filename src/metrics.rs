//! Request metrics and periodic summaries for the inspection service.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

const MAX_LATENCY_SAMPLES: usize = 10_000;

/// Metrics collector shared by all request workers
pub struct PipelineMetrics {
    /// Requests handled, by operation
    requests: RwLock<HashMap<&'static str, u64>>,
    /// Failed requests, by error code
    failures: RwLock<HashMap<&'static str, u64>>,
    /// Rows scored by the model (ground-truth rows excluded)
    pub records_scored: AtomicU64,
    /// Rows labeled DEFECT, from either source
    pub defects_found: AtomicU64,
    /// Request latencies in microseconds, most recent window
    latencies: RwLock<Vec<u64>>,
    /// Defect probability histogram, 10 equal-width buckets
    probability_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
            failures: RwLock::new(HashMap::new()),
            records_scored: AtomicU64::new(0),
            defects_found: AtomicU64::new(0),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            probability_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a completed request and its latency
    pub fn record_request(&self, operation: &'static str, elapsed: Duration) {
        *self.requests.write().entry(operation).or_insert(0) += 1;

        let mut latencies = self.latencies.write();
        latencies.push(elapsed.as_micros() as u64);
        if latencies.len() > MAX_LATENCY_SAMPLES {
            latencies.drain(0..MAX_LATENCY_SAMPLES / 2);
        }
    }

    pub fn record_failure(&self, code: &'static str) {
        *self.failures.write().entry(code).or_insert(0) += 1;
    }

    /// Record model probabilities for scored rows
    pub fn record_probabilities(&self, probabilities: impl IntoIterator<Item = f64>) {
        let mut buckets = self.probability_buckets.write();
        let mut scored = 0;
        for p in probabilities {
            let bucket = (p.clamp(0.0, 1.0) * 10.0).min(9.0) as usize;
            buckets[bucket] += 1;
            scored += 1;
        }
        self.records_scored.fetch_add(scored, Ordering::Relaxed);
    }

    pub fn record_defects(&self, count: u64) {
        self.defects_found.fetch_add(count, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.requests.read().values().sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.failures.read().values().sum()
    }

    pub fn requests_by_operation(&self) -> HashMap<&'static str, u64> {
        self.requests.read().clone()
    }

    pub fn failures_by_code(&self) -> HashMap<&'static str, u64> {
        self.failures.read().clone()
    }

    pub fn get_latency_stats(&self) -> LatencyStats {
        let mut sorted = self.latencies.read().clone();
        if sorted.is_empty() {
            return LatencyStats::default();
        }
        sorted.sort_unstable();

        let count = sorted.len();
        let percentile = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sorted.iter().sum::<u64>() / count as u64,
            p50_us: percentile(0.50),
            p95_us: percentile(0.95),
            p99_us: percentile(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Requests per second since startup
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.total_requests() as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_probability_distribution(&self) -> [u64; 10] {
        *self.probability_buckets.read()
    }

    pub fn print_summary(&self) {
        let requests = self.total_requests();
        let failures = self.total_failures();
        let failure_rate = if requests > 0 {
            failures as f64 / requests as f64 * 100.0
        } else {
            0.0
        };
        let scored = self.records_scored.load(Ordering::Relaxed);
        let defects = self.defects_found.load(Ordering::Relaxed);
        let latency = self.get_latency_stats();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║          DEFECT INSPECTION SERVICE - METRICS SUMMARY         ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Requests Handled: {:>8}  │  Throughput: {:>8.2} req/s     ║",
            requests,
            self.get_throughput()
        );
        info!(
            "║ Failed Requests:  {:>8}  │  Failure Rate: {:>6.1}%         ║",
            failures, failure_rate
        );
        info!(
            "║ Rows Scored:      {:>8}  │  Defects Found: {:>8}       ║",
            scored, defects
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Latency (μs): mean={:>6} p50={:>6} p95={:>6} p99={:>6}    ║",
            latency.mean_us, latency.p50_us, latency.p95_us, latency.p99_us
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Requests by Operation:                                       ║");
        let mut by_operation: Vec<_> = self.requests_by_operation().into_iter().collect();
        by_operation.sort();
        for (operation, count) in by_operation {
            info!("║   {:12}: {:>8}", operation, count);
        }
        let mut by_code: Vec<_> = self.failures_by_code().into_iter().collect();
        if !by_code.is_empty() {
            by_code.sort();
            info!("║ Failures by Code:                                            ║");
            for (code, count) in by_code {
                info!("║   {:18}: {:>8}", code, count);
            }
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Defect Probability Distribution:                             ║");
        let dist = self.get_probability_distribution();
        let total: u64 = dist.iter().sum();
        for (i, &count) in dist.iter().enumerate() {
            let pct = if total > 0 {
                count as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            let bar = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Request latency statistics
#[derive(Debug, Default)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Logs a metrics summary on a fixed interval
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            if self.metrics.total_requests() > 0 {
                self.metrics.print_summary();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_and_failure_counters() {
        let metrics = PipelineMetrics::new();

        metrics.record_request("predict", Duration::from_micros(100));
        metrics.record_request("predict", Duration::from_micros(300));
        metrics.record_request("health", Duration::from_micros(20));
        metrics.record_failure("model_not_loaded");

        assert_eq!(metrics.total_requests(), 3);
        assert_eq!(metrics.requests_by_operation()["predict"], 2);
        assert_eq!(metrics.failures_by_code()["model_not_loaded"], 1);
        assert_eq!(metrics.total_failures(), 1);
    }

    #[test]
    fn test_latency_stats() {
        let metrics = PipelineMetrics::new();
        assert_eq!(metrics.get_latency_stats().count, 0);

        for us in 1..=100 {
            metrics.record_request("predict", Duration::from_micros(us));
        }
        let stats = metrics.get_latency_stats();

        assert_eq!(stats.count, 100);
        assert_eq!(stats.max_us, 100);
        assert_eq!(stats.p50_us, 51);
        assert_eq!(stats.p99_us, 100);
    }

    #[test]
    fn test_probability_histogram() {
        let metrics = PipelineMetrics::new();
        metrics.record_probabilities([0.0, 0.05, 0.55, 1.0, 0.999]);

        let dist = metrics.get_probability_distribution();
        assert_eq!(dist[0], 2);
        assert_eq!(dist[5], 1);
        assert_eq!(dist[9], 2);
        assert_eq!(metrics.records_scored.load(Ordering::Relaxed), 5);
    }
}
