//! Fitted feature scalers
//!
//! Parameters are fitted offline; at inference time the forward transform must
//! be applied with exactly the column order the scaler was fitted on.

use crate::error::{DetectorError, Result};
use ndarray::{Array2, ArrayView2, Axis};
use serde::Deserialize;

/// Scaler shipped in the model bundle.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scaler {
    /// Standard scaling: (x - mean) / scale
    Standard { mean: Vec<f64>, scale: Vec<f64> },
    /// MinMax scaling with fitted parameters: x * scale + min
    MinMax { min: Vec<f64>, scale: Vec<f64> },
    /// Pass-through
    Identity,
}

impl Scaler {
    /// Number of columns the scaler was fitted on, if it constrains width.
    pub fn n_features(&self) -> Option<usize> {
        match self {
            Scaler::Standard { mean, .. } => Some(mean.len()),
            Scaler::MinMax { min, .. } => Some(min.len()),
            Scaler::Identity => None,
        }
    }

    /// Check that parameter vectors agree with each other.
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Scaler::Standard { mean, scale } if mean.len() != scale.len() => Err(format!(
                "standard scaler has {} means but {} scales",
                mean.len(),
                scale.len()
            )),
            Scaler::MinMax { min, scale } if min.len() != scale.len() => Err(format!(
                "min_max scaler has {} mins but {} scales",
                min.len(),
                scale.len()
            )),
            _ => Ok(()),
        }
    }

    /// Apply the forward transform to every row of `features`.
    pub fn transform(&self, features: ArrayView2<f64>) -> Result<Array2<f64>> {
        if let Some(width) = self.n_features() {
            if features.ncols() != width {
                return Err(DetectorError::Scoring(format!(
                    "scaler expects {} features, got {}",
                    width,
                    features.ncols()
                )));
            }
        }

        let mut scaled = features.to_owned();
        match self {
            Scaler::Standard { mean, scale } => {
                for mut row in scaled.axis_iter_mut(Axis(0)) {
                    for (col_idx, value) in row.iter_mut().enumerate() {
                        // Zero-variance columns were fitted with scale 1
                        let s = if scale[col_idx].abs() < f64::EPSILON {
                            1.0
                        } else {
                            scale[col_idx]
                        };
                        *value = (*value - mean[col_idx]) / s;
                    }
                }
            }
            Scaler::MinMax { min, scale } => {
                for mut row in scaled.axis_iter_mut(Axis(0)) {
                    for (col_idx, value) in row.iter_mut().enumerate() {
                        *value = *value * scale[col_idx] + min[col_idx];
                    }
                }
            }
            Scaler::Identity => {}
        }

        Ok(scaled)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Scaler::Standard { .. } => "standard",
            Scaler::MinMax { .. } => "min_max",
            Scaler::Identity => "identity",
        }
    }
}
