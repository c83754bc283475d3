//! Expense Anomaly Engine Library
//!
//! Flags unusual expense transactions with a hybrid check: deterministic
//! amount rules first, then an Isolation Forest scored from a JSON model bundle.

pub mod config;
pub mod detector;
pub mod error;
pub mod feature_extractor;
pub mod metrics;
pub mod models;
pub mod rules;
pub mod types;

pub use config::AppConfig;
pub use detector::{AnomalyDetector, CheckRequest, PredictOptions};
pub use error::{DetectorError, Result};
pub use feature_extractor::FeatureBuilder;
pub use models::{BundleStore, LoadedBundle, Scorer};
pub use rules::{RuleEngine, RuleHit};
pub use types::{AnomalyResult, Evaluation, Label, PredictOutput, Status, Transaction};
