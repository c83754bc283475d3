//! ONNX-exported outlier estimator

use crate::error::{DetectorError, Result};
use crate::models::bundle::OnnxSpec;
use crate::models::inference::OutlierModel;
use ndarray::{Array1, ArrayView2};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

fn load_error(e: impl std::fmt::Display) -> DetectorError {
    DetectorError::invalid_bundle(format!("failed to load ONNX model: {}", e), Vec::new())
}

fn scoring_error(e: impl std::fmt::Display) -> DetectorError {
    DetectorError::Scoring(format!("ONNX inference failed: {}", e))
}

/// Explicit name, else the first graph input, else `X`.
fn select_input(explicit: Option<&str>, inputs: &[&str]) -> String {
    explicit
        .or_else(|| inputs.first().copied())
        .unwrap_or("X")
        .to_string()
}

/// Explicit name, else the first output mentioning "score", else `scores`.
fn select_output(explicit: Option<&str>, outputs: &[&str]) -> String {
    explicit
        .or_else(|| outputs.iter().copied().find(|name| name.contains("score")))
        .unwrap_or("scores")
        .to_string()
}

/// Loaded ONNX session
pub struct OnnxOutlierModel {
    name: String,
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    n_features: Option<usize>,
}

impl std::fmt::Debug for OnnxOutlierModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxOutlierModel")
            .field("name", &self.name)
            .field("input_name", &self.input_name)
            .field("output_name", &self.output_name)
            .finish()
    }
}

impl OnnxOutlierModel {
    /// Load the session described by `spec`, resolving relative paths against `base_dir`.
    pub fn load(spec: &OnnxSpec, base_dir: &Path) -> Result<Self> {
        let path = if spec.path.is_absolute() {
            spec.path.clone()
        } else {
            base_dir.join(&spec.path)
        };
        if !path.exists() {
            return Err(DetectorError::BundleNotFound { path });
        }

        ort::init().commit().map_err(load_error)?;
        info!(path = %path.display(), threads = spec.threads, "Loading ONNX model");

        let session = Session::builder()
            .map_err(load_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(load_error)?
            .with_intra_threads(spec.threads)
            .map_err(load_error)?
            .commit_from_file(&path)
            .map_err(load_error)?;

        let inputs: Vec<&str> = session.inputs.iter().map(|i| i.name.as_str()).collect();
        let outputs: Vec<&str> = session.outputs.iter().map(|o| o.name.as_str()).collect();
        let input_name = select_input(spec.input.as_deref(), &inputs);
        let output_name = select_output(spec.output.as_deref(), &outputs);

        info!(input = %input_name, output = %output_name, "ONNX model loaded");

        Ok(Self {
            name: path.display().to_string(),
            session: Mutex::new(session),
            input_name,
            output_name,
            n_features: spec.n_features,
        })
    }
}

impl OutlierModel for OnnxOutlierModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    fn decision_function(&self, features: ArrayView2<f64>) -> Result<Array1<f64>> {
        let shape = vec![features.nrows() as i64, features.ncols() as i64];
        let data: Vec<f32> = features.iter().map(|&v| v as f32).collect();
        let input_tensor = Tensor::from_array((shape, data)).map_err(scoring_error)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| DetectorError::Scoring(format!("Lock error: {}", e)))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(scoring_error)?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            DetectorError::Scoring(format!("model has no output '{}'", self.output_name))
        })?;
        let (_, data) = output.try_extract_tensor::<f32>().map_err(scoring_error)?;

        Ok(data.iter().map(|&v| v as f64).collect())
    }
}
