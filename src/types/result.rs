//! Anomaly decision result shapes

use crate::rules::RuleHit;
use serde::{Deserialize, Serialize};

/// Result of the hybrid check
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub is_anomaly: bool,
    /// Model score; present only when the model ran successfully and a score was requested
    pub score: Option<f64>,
}

/// Terminal state of the decision pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DecisionState {
    /// A quick rule fired; the model was not consulted
    RuleFired { hit: RuleHit },
    /// Model score at or below the cutoff
    Anomaly,
    /// Model score above the cutoff
    Normal,
    /// Model could not be consulted; result defaults to non-anomalous
    Unknown { reason: String },
}

/// Persisted status vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Normal,
    Anomaly,
    Unknown,
}

/// Legacy label vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Label {
    Normal,
    Outlier,
}

impl Label {
    pub fn from_anomaly(is_anomaly: bool) -> Self {
        if is_anomaly {
            Label::Outlier
        } else {
            Label::Normal
        }
    }
}

/// Result plus the state that produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    #[serde(flatten)]
    pub result: AnomalyResult,
    pub decision: DecisionState,
}

impl Evaluation {
    pub fn status(&self) -> Status {
        match self.decision {
            DecisionState::RuleFired { .. } | DecisionState::Anomaly => Status::Anomaly,
            DecisionState::Normal => Status::Normal,
            DecisionState::Unknown { .. } => Status::Unknown,
        }
    }

    /// Whether the model actually produced a score
    pub fn was_scored(&self) -> bool {
        matches!(self.decision, DecisionState::Anomaly | DecisionState::Normal)
    }
}

/// Detailed legacy prediction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: Label,
    pub score: Option<f64>,
    pub is_anomaly: bool,
}

impl From<AnomalyResult> for Prediction {
    fn from(result: AnomalyResult) -> Self {
        Self {
            label: Label::from_anomaly(result.is_anomaly),
            score: result.score,
            is_anomaly: result.is_anomaly,
        }
    }
}

/// Output of the legacy entry point: bare label, or label with score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictOutput {
    Label(Label),
    Detailed(Prediction),
}

impl PredictOutput {
    pub fn label(&self) -> Label {
        match self {
            PredictOutput::Label(label) => *label,
            PredictOutput::Detailed(prediction) => prediction.label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_mapping() {
        let rule = Evaluation {
            result: AnomalyResult {
                is_anomaly: true,
                score: None,
            },
            decision: DecisionState::RuleFired {
                hit: RuleHit::BelowMinimum {
                    amount: 40.0,
                    minimum: 50.0,
                },
            },
        };
        assert_eq!(rule.status(), Status::Anomaly);
        assert!(!rule.was_scored());

        let unknown = Evaluation {
            result: AnomalyResult::default(),
            decision: DecisionState::Unknown {
                reason: "bundle missing".to_string(),
            },
        };
        assert_eq!(unknown.status(), Status::Unknown);
        assert!(!unknown.result.is_anomaly);
    }

    #[test]
    fn test_predict_output_shapes() {
        let bare = PredictOutput::Label(Label::Outlier);
        assert_eq!(serde_json::to_value(bare).unwrap(), json!("Outlier"));

        let detailed = PredictOutput::Detailed(Prediction::from(AnomalyResult {
            is_anomaly: false,
            score: Some(0.12),
        }));
        assert_eq!(
            serde_json::to_value(detailed).unwrap(),
            json!({"label": "Normal", "score": 0.12, "is_anomaly": false})
        );
        assert_eq!(detailed.label(), Label::Normal);
    }

    #[test]
    fn test_evaluation_serializes_flat() {
        let eval = Evaluation {
            result: AnomalyResult {
                is_anomaly: true,
                score: Some(-0.3),
            },
            decision: DecisionState::Anomaly,
        };
        let value = serde_json::to_value(&eval).unwrap();
        assert_eq!(value["is_anomaly"], json!(true));
        assert_eq!(value["score"], json!(-0.3));
        assert_eq!(value["decision"]["state"], json!("anomaly"));
    }
}
