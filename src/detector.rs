//! Hybrid decision pipeline: quick rules, then the outlier model

use crate::config::AppConfig;
use crate::error::{DetectorError, Result};
use crate::feature_extractor::{parse_date, CalendarFields, FeatureBuilder};
use crate::metrics::DetectorMetrics;
use crate::models::inference::ScoreOutcome;
use crate::models::{BundleStore, Scorer};
use crate::rules::RuleEngine;
use crate::types::{AnomalyResult, DecisionState, Evaluation, Label, PredictOutput, Prediction, Transaction};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// One call to the hybrid check
#[derive(Debug, Clone, PartialEq)]
pub struct CheckRequest {
    pub amount: f64,
    pub category: String,
    /// Today (local) when absent
    pub date: Option<String>,
    /// Off by default; rule hits and degraded calls carry no score either way
    pub return_score: bool,
    /// Overrides the store's default bundle path
    pub bundle_path: Option<PathBuf>,
    pub amount_min: Option<f64>,
    pub amount_max: Option<f64>,
    /// Propagate bundle and scoring failures instead of degrading to unknown
    pub strict: bool,
}

impl CheckRequest {
    pub fn new(amount: f64, category: impl Into<String>) -> Self {
        Self {
            amount,
            category: category.into(),
            date: None,
            return_score: false,
            bundle_path: None,
            amount_min: None,
            amount_max: None,
            strict: false,
        }
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn with_return_score(mut self, return_score: bool) -> Self {
        self.return_score = return_score;
        self
    }

    pub fn with_bundle_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.bundle_path = Some(path.into());
        self
    }

    pub fn with_amount_bounds(mut self, amount_min: f64, amount_max: f64) -> Self {
        self.amount_min = Some(amount_min);
        self.amount_max = Some(amount_max);
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// Options for the JSON-record entry point
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictOptions {
    pub return_score: bool,
    pub bundle_path: Option<PathBuf>,
    pub amount_min: Option<f64>,
    pub amount_max: Option<f64>,
}

impl PredictOptions {
    pub fn with_score() -> Self {
        Self {
            return_score: true,
            ..Default::default()
        }
    }
}

/// Rule engine and outlier model behind one entry point.
///
/// Cheap to share: the bundle cache lives in an injected [`BundleStore`].
#[derive(Clone)]
pub struct AnomalyDetector {
    store: Arc<BundleStore>,
    rules: RuleEngine,
    scorer: Scorer,
    features: FeatureBuilder,
    metrics: Option<Arc<DetectorMetrics>>,
}

impl AnomalyDetector {
    pub fn new(store: Arc<BundleStore>) -> Self {
        Self {
            store,
            rules: RuleEngine::default(),
            scorer: Scorer::default(),
            features: FeatureBuilder::new(),
            metrics: None,
        }
    }

    pub fn with_rules(mut self, rules: RuleEngine) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_scorer(mut self, scorer: Scorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<DetectorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Detector wired from configuration, with its own bundle store.
    pub fn from_config(config: &AppConfig) -> Self {
        let store = BundleStore::with_capacity(&config.bundle.path, config.bundle.cache_capacity);
        Self::new(Arc::new(store))
            .with_rules(config.rules.to_engine())
            .with_scorer(Scorer::new(config.scoring.cutoff))
    }

    pub fn store(&self) -> &Arc<BundleStore> {
        &self.store
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    /// Hybrid check returning only the result.
    pub fn check_anomaly(&self, request: &CheckRequest) -> Result<AnomalyResult> {
        self.evaluate(request).map(|evaluation| evaluation.result)
    }

    /// Hybrid check returning the result and the state that produced it.
    ///
    /// Input errors (`InvalidDate`, `InvalidInput`) always propagate. Bundle,
    /// feature and scoring failures degrade to an unknown, non-anomalous
    /// result unless the request is strict.
    pub fn evaluate(&self, request: &CheckRequest) -> Result<Evaluation> {
        let start = Instant::now();
        let mut evaluation = self.decide(request)?;

        if let Some(metrics) = &self.metrics {
            metrics.record(&evaluation, start.elapsed());
        }
        if !request.return_score {
            evaluation.result.score = None;
        }

        debug!(
            amount = request.amount,
            category = %request.category,
            is_anomaly = evaluation.result.is_anomaly,
            score = ?evaluation.result.score,
            decision = ?evaluation.decision,
            "Transaction evaluated"
        );
        Ok(evaluation)
    }

    fn decide(&self, request: &CheckRequest) -> Result<Evaluation> {
        if !request.amount.is_finite() {
            return Err(DetectorError::InvalidInput(format!(
                "amount must be a finite number, got {}",
                request.amount
            )));
        }

        let amount_min = request.amount_min.unwrap_or(self.rules.amount_min);
        let amount_max = request.amount_max.unwrap_or(self.rules.amount_max);
        if let Some(hit) =
            self.rules
                .evaluate_within(request.amount, &request.category, amount_min, amount_max)
        {
            return Ok(Evaluation {
                result: AnomalyResult {
                    is_anomaly: true,
                    score: None,
                },
                decision: DecisionState::RuleFired { hit },
            });
        }

        let calendar = match request.date.as_deref() {
            Some(date) => parse_date(date)?,
            None => CalendarFields::today(),
        };

        match self.score(request, &calendar) {
            Ok(outcome) => Ok(Evaluation {
                result: AnomalyResult {
                    is_anomaly: outcome.is_anomaly,
                    score: Some(outcome.score),
                },
                decision: if outcome.is_anomaly {
                    DecisionState::Anomaly
                } else {
                    DecisionState::Normal
                },
            }),
            Err(e) if request.strict || e.is_input_error() => Err(e),
            Err(e) => {
                match &e {
                    DetectorError::NoAmountColumn { .. } => {
                        error!(error = %e, "Model unusable, returning unknown")
                    }
                    _ => warn!(error = %e, "Model unavailable, returning unknown"),
                }
                Ok(unknown(e.to_string()))
            }
        }
    }

    fn score(&self, request: &CheckRequest, calendar: &CalendarFields) -> Result<ScoreOutcome> {
        let bundle = self.store.load(request.bundle_path.as_deref())?;
        let row = self.features.build_with_calendar(
            request.amount,
            &request.category,
            calendar,
            &bundle.feature_columns,
            |category| bundle.encode_category(category),
        )?;
        self.scorer.score_with_bundle(&row, &bundle)
    }

    /// Evaluate a loosely shaped JSON transaction record.
    ///
    /// Unlike [`evaluate`](Self::evaluate), an unparseable date degrades to
    /// unknown instead of propagating.
    pub fn evaluate_json(&self, input: &Value, options: &PredictOptions) -> Result<Evaluation> {
        let transaction = Transaction::from_json(input)?;
        let request = CheckRequest {
            amount: transaction.amount,
            category: transaction.category,
            date: transaction.date,
            return_score: options.return_score,
            bundle_path: options.bundle_path.clone(),
            amount_min: options.amount_min,
            amount_max: options.amount_max,
            strict: false,
        };

        let start = Instant::now();
        match self.evaluate(&request) {
            Err(e @ DetectorError::InvalidDate { .. }) => {
                warn!(error = %e, "Unparseable transaction date, returning unknown");
                let evaluation = unknown(e.to_string());
                if let Some(metrics) = &self.metrics {
                    metrics.record(&evaluation, start.elapsed());
                }
                Ok(evaluation)
            }
            other => other,
        }
    }

    /// Label a JSON transaction record as `Normal` or `Outlier`.
    pub fn predict_anomaly(&self, input: &Value, options: &PredictOptions) -> Result<PredictOutput> {
        let evaluation = self.evaluate_json(input, options)?;
        if options.return_score {
            Ok(PredictOutput::Detailed(Prediction::from(evaluation.result)))
        } else {
            Ok(PredictOutput::Label(Label::from_anomaly(
                evaluation.result.is_anomaly,
            )))
        }
    }
}

impl std::fmt::Debug for AnomalyDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnomalyDetector")
            .field("bundle", &self.store.default_path())
            .field("rules", &self.rules)
            .field("cutoff", &self.scorer.cutoff())
            .finish()
    }
}

fn unknown(reason: String) -> Evaluation {
    Evaluation {
        result: AnomalyResult::default(),
        decision: DecisionState::Unknown { reason },
    }
}
