//! Native Isolation Forest evaluator
//!
//! Evaluates a forest fitted offline by scikit-learn's `IsolationForest`,
//! exported as flat node arrays per estimator. Reproduces `score_samples`
//! and `decision_function` exactly:
//!
//! ```text
//! h(x)             = edges from root to leaf + c(n_node_samples(leaf))
//! score_samples(x) = -2 ^ (-mean_trees(h(x)) / c(max_samples))
//! decision(x)      = score_samples(x) - offset
//! ```

use crate::error::{DetectorError, Result};
use crate::models::inference::OutlierModel;
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::Deserialize;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Marker used for "no child" in the node arrays
const TREE_LEAF: i64 = -1;

/// Average path length of an unsuccessful BST search over `n` samples.
pub fn average_path_length(n: f64) -> f64 {
    if n <= 1.0 {
        0.0
    } else if n <= 2.0 {
        1.0
    } else {
        2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
    }
}

/// One fitted isolation tree in array form.
#[derive(Debug, Clone, Deserialize)]
pub struct IsolationTree {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    pub n_node_samples: Vec<u64>,
    /// Row positions this estimator was fitted on (all columns when absent)
    #[serde(default)]
    pub features: Option<Vec<usize>>,
}

impl IsolationTree {
    fn node_count(&self) -> usize {
        self.children_left.len()
    }

    fn validate(&self, n_features: Option<usize>) -> std::result::Result<(), String> {
        let n = self.node_count();
        if n == 0 {
            return Err("estimator has no nodes".to_string());
        }
        if self.children_right.len() != n
            || self.feature.len() != n
            || self.threshold.len() != n
            || self.n_node_samples.len() != n
        {
            return Err("estimator node arrays have different lengths".to_string());
        }

        for node in 0..n {
            let (left, right) = (self.children_left[node], self.children_right[node]);
            if left == TREE_LEAF && right == TREE_LEAF {
                continue;
            }
            // Children always come after their parent in depth-first order
            for child in [left, right] {
                if child <= node as i64 || child >= n as i64 {
                    return Err(format!("node {} has out-of-range child {}", node, child));
                }
            }

            let local = self.feature[node];
            if local < 0 {
                return Err(format!("split node {} has no feature", node));
            }
            let column = match &self.features {
                Some(subset) => *subset
                    .get(local as usize)
                    .ok_or_else(|| format!("node {} feature {} outside subset", node, local))?,
                None => local as usize,
            };
            if let Some(width) = n_features {
                if column >= width {
                    return Err(format!(
                        "node {} splits on column {} but model has {} features",
                        node, column, width
                    ));
                }
            }
        }

        Ok(())
    }

    /// Path length h(x) for a single row.
    fn path_length(&self, row: ArrayView1<f64>) -> Result<f64> {
        let mut node = 0usize;
        let mut edges = 0usize;

        loop {
            let left = self.children_left[node];
            if left == TREE_LEAF {
                let leaf_samples = self.n_node_samples[node] as f64;
                return Ok(edges as f64 + average_path_length(leaf_samples));
            }

            let local = self.feature[node] as usize;
            let column = match &self.features {
                Some(subset) => subset[local],
                None => local,
            };
            let value = *row.get(column).ok_or_else(|| {
                DetectorError::Scoring(format!(
                    "row has {} columns, tree needs column {}",
                    row.len(),
                    column
                ))
            })?;

            // Trees are fitted on float32 inputs
            let value = value as f32 as f64;
            node = if value <= self.threshold[node] {
                left as usize
            } else {
                self.children_right[node] as usize
            };
            edges += 1;
        }
    }
}

/// Fitted Isolation Forest.
#[derive(Debug, Clone, Deserialize)]
pub struct IsolationForest {
    /// Sub-sample size each tree was grown on
    pub max_samples: usize,
    /// Fitted offset subtracted by the decision function
    pub offset: f64,
    /// Width of the training matrix, when recorded
    #[serde(default)]
    pub n_features: Option<usize>,
    pub estimators: Vec<IsolationTree>,
}

impl IsolationForest {
    /// Structural checks run once at bundle load.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.estimators.is_empty() {
            return Err("isolation forest has no estimators".to_string());
        }
        if self.max_samples < 2 {
            return Err(format!(
                "isolation forest max_samples must be at least 2, got {}",
                self.max_samples
            ));
        }
        if !self.offset.is_finite() {
            return Err("isolation forest offset is not finite".to_string());
        }
        for (idx, tree) in self.estimators.iter().enumerate() {
            tree.validate(self.n_features)
                .map_err(|e| format!("estimator {}: {}", idx, e))?;
        }
        Ok(())
    }

    /// Opposite of the anomaly score: lower is more abnormal.
    pub fn score_samples(&self, features: ArrayView2<f64>) -> Result<Array1<f64>> {
        let denominator = self.estimators.len() as f64 * average_path_length(self.max_samples as f64);

        features
            .rows()
            .into_iter()
            .map(|row| {
                let mut depths = 0.0;
                for tree in &self.estimators {
                    depths += tree.path_length(row)?;
                }
                Ok(-(2f64.powf(-depths / denominator)))
            })
            .collect::<Result<Vec<f64>>>()
            .map(Array1::from)
    }
}

impl OutlierModel for IsolationForest {
    fn name(&self) -> &str {
        "isolation_forest"
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    fn decision_function(&self, features: ArrayView2<f64>) -> Result<Array1<f64>> {
        if let Some(width) = self.n_features {
            if features.ncols() != width {
                return Err(DetectorError::Scoring(format!(
                    "model expects {} features, got {}",
                    width,
                    features.ncols()
                )));
            }
        }
        Ok(self.score_samples(features)? - self.offset)
    }
}
