//! Outlier scoring: scaler forward transform followed by the model's decision function

use crate::error::{DetectorError, Result};
use crate::feature_extractor::FeatureRow;
use crate::models::bundle::LoadedBundle;
use crate::models::scaler::Scaler;
use ndarray::{Array1, Array2, ArrayView2};
use tracing::debug;

/// Scores at or below this value are anomalous. Tuned offline on validation data.
pub const DEFAULT_CUTOFF: f64 = -0.20;

/// An unsupervised outlier estimator.
///
/// Lower decision values mean "more anomalous".
pub trait OutlierModel: Send + Sync + std::fmt::Debug {
    /// Short model family name for logs
    fn name(&self) -> &str;

    /// Input width the model was fitted on, if known
    fn n_features(&self) -> Option<usize>;

    /// One decision value per input row
    fn decision_function(&self, features: ArrayView2<f64>) -> Result<Array1<f64>>;
}

/// Result of scoring a single feature row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreOutcome {
    pub score: f64,
    pub is_anomaly: bool,
}

/// Runs a feature row through scaler and model and applies the cutoff.
#[derive(Debug, Clone)]
pub struct Scorer {
    cutoff: f64,
}

impl Scorer {
    pub fn new(cutoff: f64) -> Self {
        Self { cutoff }
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Score one row.
    ///
    /// The row is projected into `feature_columns` order before scaling; that
    /// order must match the one the scaler and model were fitted with.
    pub fn score(
        &self,
        row: &FeatureRow,
        feature_columns: &[String],
        scaler: &Scaler,
        model: &dyn OutlierModel,
    ) -> Result<f64> {
        let values = row.project(feature_columns)?;
        let width = values.len();
        let features = Array2::from_shape_vec((1, width), values)
            .map_err(|e| DetectorError::Scoring(format!("failed to shape feature row: {}", e)))?;

        let scaled = scaler.transform(features.view())?;
        let scores = model.decision_function(scaled.view())?;

        let score = scores
            .first()
            .copied()
            .ok_or_else(|| DetectorError::Scoring("model returned no scores".to_string()))?;

        if !score.is_finite() {
            return Err(DetectorError::Scoring(format!(
                "model returned non-finite score {}",
                score
            )));
        }

        debug!(model = model.name(), score = score, "Feature row scored");
        Ok(score)
    }

    /// Score a row against every component of a loaded bundle.
    pub fn score_with_bundle(&self, row: &FeatureRow, bundle: &LoadedBundle) -> Result<ScoreOutcome> {
        let score = self.score(
            row,
            &bundle.feature_columns,
            &bundle.scaler,
            bundle.model.as_ref(),
        )?;
        Ok(ScoreOutcome {
            score,
            is_anomaly: self.is_anomaly(score),
        })
    }

    /// Apply the fixed cutoff.
    pub fn is_anomaly(&self, score: f64) -> bool {
        score <= self.cutoff
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(DEFAULT_CUTOFF)
    }
}
