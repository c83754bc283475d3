//! Expense Anomaly Engine - Main Entry Point
//!
//! Reads newline-delimited JSON transactions from stdin, runs the hybrid
//! rule + model check on each, and writes one JSON result per line to stdout.

use anyhow::{Context, Result};
use expense_anomaly_engine::{
    config::{AppConfig, DEFAULT_CONFIG_PATH},
    detector::{AnomalyDetector, PredictOptions},
    metrics::DetectorMetrics,
    types::{Label, Status},
};
use serde::Serialize;
use std::io::{self, BufRead, BufWriter, Write};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// One output line
#[derive(Serialize)]
struct Output<'a> {
    line: u64,
    status: Status,
    label: Label,
    is_anomaly: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<f64>,
    decision: &'a expense_anomaly_engine::types::DecisionState,
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("expense_anomaly_engine={}", config.logging.level)))
        .context("Invalid log level")?;

    // Logs go to stderr; stdout carries results
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);

    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn main() -> Result<()> {
    // An explicit path must exist; the default file is optional
    let (config_path, config) = match std::env::args().nth(1) {
        Some(path) => {
            let config = AppConfig::load_from_path(&path)?;
            (path, config)
        }
        None => (DEFAULT_CONFIG_PATH.to_string(), AppConfig::load()?),
    };
    init_logging(&config)?;

    info!("Starting Expense Anomaly Engine");
    info!(
        config = %config_path,
        bundle = %config.bundle.path.display(),
        amount_min = config.rules.amount_min,
        amount_max = config.rules.amount_max,
        cutoff = config.scoring.cutoff,
        "Configuration loaded"
    );

    let metrics = Arc::new(DetectorMetrics::new());
    let detector = AnomalyDetector::from_config(&config).with_metrics(metrics.clone());
    let options = PredictOptions {
        return_score: config.scoring.return_score,
        ..Default::default()
    };

    let stdin = io::stdin();
    let mut out = BufWriter::new(io::stdout().lock());
    let mut line_no = 0u64;
    let mut rejected = 0u64;

    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let record: serde_json::Value = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(e) => {
                rejected += 1;
                warn!(line = line_no, error = %e, "Failed to parse transaction");
                continue;
            }
        };

        let evaluation = match detector.evaluate_json(&record, &options) {
            Ok(evaluation) => evaluation,
            Err(e) => {
                rejected += 1;
                warn!(line = line_no, error = %e, "Transaction rejected");
                continue;
            }
        };

        let output = Output {
            line: line_no,
            status: evaluation.status(),
            label: Label::from_anomaly(evaluation.result.is_anomaly),
            is_anomaly: evaluation.result.is_anomaly,
            score: evaluation.result.score,
            decision: &evaluation.decision,
        };
        serde_json::to_writer(&mut out, &output).context("Failed to write result")?;
        out.write_all(b"\n").context("Failed to write result")?;

        if line_no % 100 == 0 {
            out.flush().context("Failed to flush results")?;
            let stats = metrics.get_processing_stats();
            debug!(
                processed = line_no,
                avg_latency_us = stats.mean_us,
                "Processing milestone"
            );
        }
    }
    out.flush().context("Failed to flush results")?;

    info!(lines = line_no, rejected = rejected, "Input exhausted, shutting down");
    metrics.print_summary();

    Ok(())
}
