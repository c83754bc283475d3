//! Type definitions for the anomaly engine

pub mod result;
pub mod transaction;

pub use result::{AnomalyResult, DecisionState, Evaluation, Label, PredictOutput, Prediction, Status};
pub use transaction::Transaction;
