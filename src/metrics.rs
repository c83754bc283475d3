//! Decision statistics for the anomaly engine.

use crate::types::{DecisionState, Evaluation};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::info;

/// Score histogram covers [-0.5, 0.5) in 0.1 steps; outside values land in the edge buckets
const SCORE_BUCKETS: usize = 10;
const SCORE_RANGE_START: f64 = -0.5;
const SCORE_BUCKET_WIDTH: f64 = 0.1;

/// Counters per terminal state plus latency and score distribution
pub struct DetectorMetrics {
    /// Total evaluations
    pub evaluations: AtomicU64,
    /// Short-circuited by a quick rule
    pub rule_fired: AtomicU64,
    /// Scored at or below the cutoff
    pub model_anomalies: AtomicU64,
    /// Scored above the cutoff
    pub normal: AtomicU64,
    /// Degraded because the model could not be consulted
    pub unknown: AtomicU64,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    score_buckets: RwLock<[u64; SCORE_BUCKETS]>,
    start_time: Instant,
}

impl DetectorMetrics {
    pub fn new() -> Self {
        Self {
            evaluations: AtomicU64::new(0),
            rule_fired: AtomicU64::new(0),
            model_anomalies: AtomicU64::new(0),
            normal: AtomicU64::new(0),
            unknown: AtomicU64::new(0),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; SCORE_BUCKETS]),
            start_time: Instant::now(),
        }
    }

    /// Record one finished evaluation
    pub fn record(&self, evaluation: &Evaluation, processing_time: Duration) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);

        let counter = match evaluation.decision {
            DecisionState::RuleFired { .. } => &self.rule_fired,
            DecisionState::Anomaly => &self.model_anomalies,
            DecisionState::Normal => &self.normal,
            DecisionState::Unknown { .. } => &self.unknown,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        if let Some(score) = evaluation.result.score {
            let bucket = score_bucket(score);
            if let Ok(mut buckets) = self.score_buckets.write() {
                buckets[bucket] += 1;
            }
        }
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let Ok(times) = self.processing_times.read() else {
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
            p95_us: sorted[((count as f64 * 0.95) as usize).min(count - 1)],
            p99_us: sorted[((count as f64 * 0.99) as usize).min(count - 1)],
            max_us: sorted[count - 1],
        }
    }

    /// Share of evaluations flagged anomalous (rule or model)
    pub fn anomaly_rate(&self) -> f64 {
        let total = self.evaluations.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        let flagged =
            self.rule_fired.load(Ordering::Relaxed) + self.model_anomalies.load(Ordering::Relaxed);
        flagged as f64 / total as f64
    }

    /// Evaluations per second since creation
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.evaluations.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_score_distribution(&self) -> [u64; SCORE_BUCKETS] {
        self.score_buckets
            .read()
            .map(|b| *b)
            .unwrap_or([0; SCORE_BUCKETS])
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let total = self.evaluations.load(Ordering::Relaxed);
        let processing = self.get_processing_stats();

        info!(
            evaluations = total,
            rule_fired = self.rule_fired.load(Ordering::Relaxed),
            model_anomalies = self.model_anomalies.load(Ordering::Relaxed),
            normal = self.normal.load(Ordering::Relaxed),
            unknown = self.unknown.load(Ordering::Relaxed),
            anomaly_rate = format!("{:.1}%", self.anomaly_rate() * 100.0),
            throughput = format!("{:.1} tx/s", self.get_throughput()),
            "Anomaly engine summary"
        );
        info!(
            mean_us = processing.mean_us,
            p50_us = processing.p50_us,
            p95_us = processing.p95_us,
            p99_us = processing.p99_us,
            max_us = processing.max_us,
            "Processing time"
        );

        let distribution = self.get_score_distribution();
        let scored: u64 = distribution.iter().sum();
        for (i, &count) in distribution.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let low = SCORE_RANGE_START + i as f64 * SCORE_BUCKET_WIDTH;
            let pct = (count as f64 / scored as f64) * 100.0;
            let bar: String = "█".repeat(((pct / 5.0) as usize).min(20));
            info!(
                "score {:+.1}..{:+.1}: {:>6} ({:>5.1}%) {}",
                low,
                low + SCORE_BUCKET_WIDTH,
                count,
                pct,
                bar
            );
        }
    }
}

impl Default for DetectorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn score_bucket(score: f64) -> usize {
    let idx = ((score - SCORE_RANGE_START) / SCORE_BUCKET_WIDTH).floor();
    idx.clamp(0.0, (SCORE_BUCKETS - 1) as f64) as usize
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}
