//! Request metrics and statistics tracking for the prediction service.

use crate::types::prediction::Prediction;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Latency samples kept for percentile estimates
const LATENCY_WINDOW: usize = 10_000;

/// Metrics collector for `/predict` traffic
pub struct ServiceMetrics {
    /// Requests received by `/predict`
    pub requests: AtomicU64,
    /// Requests answered with a prediction
    pub predictions: AtomicU64,
    /// Predictions labelled 1
    pub positive_labels: AtomicU64,
    /// Failed requests by error kind
    failures: RwLock<BTreeMap<String, u64>>,
    /// Request latencies (in microseconds)
    latencies: RwLock<Vec<u64>>,
    /// Probability distribution buckets
    probability_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl ServiceMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            predictions: AtomicU64::new(0),
            positive_labels: AtomicU64::new(0),
            failures: RwLock::new(BTreeMap::new()),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            probability_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Count an incoming request
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful prediction
    pub fn record_prediction(&self, latency: Duration, prediction: &Prediction) {
        self.predictions.fetch_add(1, Ordering::Relaxed);
        if prediction.is_positive() {
            self.positive_labels.fetch_add(1, Ordering::Relaxed);
        }
        self.record_latency(latency);

        let bucket = (prediction.probability * 10.0).clamp(0.0, 9.0) as usize;
        if let Ok(mut buckets) = self.probability_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    /// Record a failed request
    pub fn record_failure(&self, kind: &str, latency: Duration) {
        if let Ok(mut failures) = self.failures.write() {
            *failures.entry(kind.to_string()).or_insert(0) += 1;
        }
        self.record_latency(latency);
    }

    fn record_latency(&self, latency: Duration) {
        if let Ok(mut times) = self.latencies.write() {
            times.push(latency.as_micros() as u64);
            if times.len() > LATENCY_WINDOW {
                times.drain(0..LATENCY_WINDOW / 2);
            }
        }
    }

    /// Get request latency statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let Ok(times) = self.latencies.read() else {
            return ProcessingStats::default();
        };
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: sorted[count - 1],
        }
    }

    /// Failed requests by error kind
    pub fn get_failures(&self) -> BTreeMap<String, u64> {
        self.failures
            .read()
            .map(|f| f.clone())
            .unwrap_or_default()
    }

    pub fn total_failures(&self) -> u64 {
        self.get_failures().values().sum()
    }

    /// Get current throughput (requests per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.requests.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get probability distribution
    pub fn get_probability_distribution(&self) -> [u64; 10] {
        self.probability_buckets
            .read()
            .map(|b| *b)
            .unwrap_or_default()
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let requests = self.requests.load(Ordering::Relaxed);
        let predictions = self.predictions.load(Ordering::Relaxed);
        let positives = self.positive_labels.load(Ordering::Relaxed);
        let positive_rate = if predictions > 0 {
            (positives as f64 / predictions as f64) * 100.0
        } else {
            0.0
        };

        let latency = self.get_processing_stats();
        let throughput = self.get_throughput();
        let failures = self.get_failures();
        let distribution = self.get_probability_distribution();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║            STROKE RISK SERVICE - METRICS SUMMARY             ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Requests:    {:>8}  │  Throughput: {:>8.2} req/s          ║",
            requests, throughput
        );
        info!(
            "║ Predictions: {:>8}  │  Positive:   {:>8} ({:>5.1}%)      ║",
            predictions, positives, positive_rate
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Latency (μs): mean={:>6} p50={:>6} p95={:>6} p99={:>6}  ║",
            latency.mean_us, latency.p50_us, latency.p95_us, latency.p99_us
        );
        if !failures.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Failures by Kind:                                            ║");
            for (kind, count) in &failures {
                info!("║   {:16}: {:>6}                                   ║", kind, count);
            }
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Probability Distribution:                                    ║");
        let total: u64 = distribution.iter().sum();
        for (i, &count) in distribution.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
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

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Request latency statistics
#[derive(Debug, Default, PartialEq)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Periodic metrics reporter
pub struct MetricsReporter {
    metrics: Arc<ServiceMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServiceMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let period = Duration::from_secs(self.interval_secs.max(1));
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
