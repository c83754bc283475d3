//! Error types for the anomaly engine

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by bundle loading, feature construction and scoring.
#[derive(Debug, Error)]
pub enum DetectorError {
    /// Bundle file does not exist
    #[error("model bundle not found: {}", path.display())]
    BundleNotFound { path: PathBuf },

    /// Bundle parsed but is missing a required logical field
    #[error("model bundle is invalid: {reason} (found keys: {found_keys:?})")]
    BundleInvalid {
        reason: String,
        found_keys: Vec<String>,
    },

    /// Bundle file could not be decoded
    #[error("failed to parse model bundle {}: {source}", path.display())]
    BundleParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// No declared feature column looks like the monetary amount
    #[error("no amount column found in feature columns {columns:?}")]
    NoAmountColumn { columns: Vec<String> },

    /// Caller-supplied date string could not be parsed
    #[error("invalid date '{input}': {reason}")]
    InvalidDate { input: String, reason: String },

    /// Caller-supplied transaction is missing a field or has the wrong shape
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Scaler or model failed on a built feature row
    #[error("scoring failed: {0}")]
    Scoring(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DetectorError {
    /// Errors caused by the caller's input rather than the environment.
    ///
    /// These always propagate out of the decision pipeline; everything else
    /// is contained unless the caller asked for strict scoring.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            DetectorError::InvalidDate { .. } | DetectorError::InvalidInput(_)
        )
    }

    pub(crate) fn invalid_bundle(reason: impl Into<String>, found_keys: Vec<String>) -> Self {
        DetectorError::BundleInvalid {
            reason: reason.into(),
            found_keys,
        }
    }
}

pub type Result<T> = std::result::Result<T, DetectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_error_classification() {
        let date = DetectorError::InvalidDate {
            input: "not-a-date".to_string(),
            reason: "bad".to_string(),
        };
        assert!(date.is_input_error());
        assert!(DetectorError::InvalidInput("missing amount".to_string()).is_input_error());

        let missing = DetectorError::BundleNotFound {
            path: PathBuf::from("/nope.json"),
        };
        assert!(!missing.is_input_error());
        assert!(!DetectorError::Scoring("boom".to_string()).is_input_error());
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = DetectorError::InvalidDate {
            input: "2025-13-40".to_string(),
            reason: "unrecognized date format".to_string(),
        };
        assert!(err.to_string().contains("2025-13-40"));

        let err = DetectorError::invalid_bundle("missing scaler", vec!["model".to_string()]);
        let msg = err.to_string();
        assert!(msg.contains("missing scaler"));
        assert!(msg.contains("model"));
    }
}
