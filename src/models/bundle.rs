//! Model bundle schema
//!
//! A bundle is a JSON object carrying the fitted model, the scaler, the ordered
//! feature column list and an optional category encoder. The schema grew over
//! several training pipelines, so each logical field accepts a few legacy key
//! names. Aliases are resolved once here into [`LoadedBundle`]; nothing else
//! in the crate looks at raw keys.

use crate::error::{DetectorError, Result};
use crate::models::encoder::{CategoryEncoder, LabelEncoder};
use crate::models::iforest::IsolationForest;
use crate::models::inference::OutlierModel;
use crate::models::scaler::Scaler;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Candidate keys per logical field, in resolution order.
pub const MODEL_KEYS: &[&str] = &["model", "iso_forest", "iforest", "clf"];
pub const SCALER_KEYS: &[&str] = &["scaler", "standard_scaler"];
pub const FEATURE_COLUMN_KEYS: &[&str] = &["feature_columns", "feat_cols", "features"];
pub const CATEGORY_MAP_KEYS: &[&str] = &["category_map", "cat_map"];
pub const LABEL_ENCODER_KEYS: &[&str] = &["label_encoder", "le"];

/// Model entry of the bundle
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    IsolationForest(IsolationForest),
    Onnx(OnnxSpec),
}

/// Bundle entry pointing at an ONNX export of the estimator.
#[derive(Debug, Clone, Deserialize)]
pub struct OnnxSpec {
    /// Model file, relative to the bundle's directory unless absolute
    pub path: PathBuf,
    /// Input tensor name (first graph input when absent)
    #[serde(default)]
    pub input: Option<String>,
    /// Output holding the decision function (`scores` for skl2onnx exports)
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub n_features: Option<usize>,
    #[serde(default = "default_threads")]
    pub threads: usize,
}

fn default_threads() -> usize {
    1
}

/// A parsed, validated bundle. Immutable once built.
#[derive(Debug)]
pub struct LoadedBundle {
    /// Resolved path the bundle was read from
    pub path: PathBuf,
    pub model: Box<dyn OutlierModel>,
    pub scaler: Scaler,
    /// Ordered column names; defines width and meaning of every feature position
    pub feature_columns: Vec<String>,
    pub encoder: CategoryEncoder,
}

impl LoadedBundle {
    /// Read and validate a bundle file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DetectorError::BundleNotFound {
                path: path.to_path_buf(),
            });
        }

        let file = File::open(path).map_err(|source| DetectorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document: Value =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| {
                DetectorError::BundleParse {
                    path: path.to_path_buf(),
                    source,
                }
            })?;

        Self::from_document(document, path)
    }

    /// Build a bundle from an already-decoded JSON document.
    ///
    /// `path` is recorded on the bundle and used to resolve relative model files.
    pub fn from_document(document: Value, path: &Path) -> Result<Self> {
        let Value::Object(doc) = document else {
            return Err(DetectorError::invalid_bundle(
                "top level must be a JSON object",
                Vec::new(),
            ));
        };
        let found_keys = sorted_keys(&doc);

        let model = resolve(&doc, MODEL_KEYS);
        let scaler = resolve(&doc, SCALER_KEYS);
        let columns = resolve(&doc, FEATURE_COLUMN_KEYS);

        let missing: Vec<&str> = [
            ("model", model.is_none()),
            ("scaler", scaler.is_none()),
            ("feature_columns", columns.is_none()),
        ]
        .iter()
        .filter(|(_, absent)| *absent)
        .map(|(name, _)| *name)
        .collect();

        let (Some(model), Some(scaler), Some(columns)) = (model, scaler, columns) else {
            return Err(DetectorError::invalid_bundle(
                format!("missing required fields: {}", missing.join(", ")),
                found_keys,
            ));
        };

        let feature_columns: Vec<String> = decode(columns, "feature_columns", &found_keys)?;
        let scaler: Scaler = decode(scaler, "scaler", &found_keys)?;
        scaler
            .validate()
            .map_err(|e| DetectorError::invalid_bundle(e, found_keys.clone()))?;

        let model_spec: ModelSpec = decode(model, "model", &found_keys)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let model = build_model(model_spec, base_dir, &found_keys)?;

        let encoder = if let Some(map) = resolve(&doc, CATEGORY_MAP_KEYS) {
            CategoryEncoder::Map(decode::<HashMap<String, i64>>(map, "category_map", &found_keys)?)
        } else if let Some(le) = resolve(&doc, LABEL_ENCODER_KEYS) {
            CategoryEncoder::Label(decode::<LabelEncoder>(le, "label_encoder", &found_keys)?)
        } else {
            CategoryEncoder::Absent
        };

        let width = feature_columns.len();
        for (component, declared) in [("scaler", scaler.n_features()), ("model", model.n_features())] {
            if let Some(declared) = declared {
                if declared != width {
                    return Err(DetectorError::invalid_bundle(
                        format!(
                            "{} was fitted on {} features but {} columns are declared",
                            component, declared, width
                        ),
                        found_keys,
                    ));
                }
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            model,
            scaler,
            feature_columns,
            encoder,
        })
    }

    /// Encode a category label with the bundle's encoder.
    pub fn encode_category(&self, category: &str) -> i64 {
        self.encoder.encode(category)
    }
}

fn build_model(
    spec: ModelSpec,
    base_dir: &Path,
    found_keys: &[String],
) -> Result<Box<dyn OutlierModel>> {
    match spec {
        ModelSpec::IsolationForest(forest) => {
            forest
                .validate()
                .map_err(|e| DetectorError::invalid_bundle(e, found_keys.to_vec()))?;
            Ok(Box::new(forest))
        }
        #[cfg(feature = "onnx")]
        ModelSpec::Onnx(spec) => Ok(Box::new(crate::models::onnx::OnnxOutlierModel::load(
            &spec, base_dir,
        )?)),
        #[cfg(not(feature = "onnx"))]
        ModelSpec::Onnx(spec) => {
            let _ = base_dir;
            Err(DetectorError::invalid_bundle(
                format!(
                    "model {} is an ONNX export but ONNX support is not enabled",
                    spec.path.display()
                ),
                found_keys.to_vec(),
            ))
        }
    }
}

/// First candidate key holding a non-empty value.
fn resolve<'a>(doc: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| doc.get(*key))
        .find(|value| is_present(value))
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(_) => true,
    }
}

fn decode<T: DeserializeOwned>(value: &Value, field: &str, found_keys: &[String]) -> Result<T> {
    T::deserialize(value).map_err(|e| {
        DetectorError::invalid_bundle(format!("malformed {}: {}", field, e), found_keys.to_vec())
    })
}

fn sorted_keys(doc: &Map<String, Value>) -> Vec<String> {
    let mut keys: Vec<String> = doc.keys().cloned().collect();
    keys.sort();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn forest_json() -> Value {
        json!({
            "kind": "isolation_forest",
            "max_samples": 4,
            "offset": -0.5,
            "estimators": [{
                "children_left": [1, -1, -1],
                "children_right": [2, -1, -1],
                "feature": [0, -2, -2],
                "threshold": [0.5, -2.0, -2.0],
                "n_node_samples": [4, 1, 3]
            }]
        })
    }

    fn path() -> PathBuf {
        PathBuf::from("/tmp/bundle.json")
    }

    #[test]
    fn test_canonical_keys() {
        let doc = json!({
            "model": forest_json(),
            "scaler": {"kind": "identity"},
            "feature_columns": ["Amount_log", "Category_enc"],
            "category_map": {"Rent": 3}
        });
        let bundle = LoadedBundle::from_document(doc, &path()).unwrap();

        assert_eq!(bundle.feature_columns, vec!["Amount_log", "Category_enc"]);
        assert_eq!(bundle.encode_category("Rent"), 3);
        assert_eq!(bundle.encode_category("Travel"), -1);
        assert_eq!(bundle.model.name(), "isolation_forest");
    }

    #[test]
    fn test_legacy_aliases_resolve() {
        let doc = json!({
            "iforest": forest_json(),
            "standard_scaler": {"kind": "standard", "mean": [0.0, 0.0], "scale": [1.0, 1.0]},
            "feat_cols": ["Amount", "Category_enc"],
            "le": {"classes": ["Groceries", "Rent"]}
        });
        let bundle = LoadedBundle::from_document(doc, &path()).unwrap();

        assert_eq!(bundle.scaler.kind(), "standard");
        assert_eq!(bundle.encoder.kind(), "label_encoder");
        assert_eq!(bundle.encode_category("Rent"), 1);
    }

    #[test]
    fn test_empty_alias_falls_through() {
        let doc = json!({
            "model": null,
            "clf": forest_json(),
            "scaler": {"kind": "identity"},
            "feat_cols": [],
            "features": ["Amount", "Month"]
        });
        let bundle = LoadedBundle::from_document(doc, &path()).unwrap();
        assert_eq!(bundle.feature_columns, vec!["Amount", "Month"]);
        assert_eq!(bundle.encoder.kind(), "none");
    }

    #[test]
    fn test_category_map_wins_over_label_encoder() {
        let doc = json!({
            "model": forest_json(),
            "scaler": {"kind": "identity"},
            "features": ["Amount"],
            "cat_map": {"Rent": 7},
            "label_encoder": {"classes": ["Rent"]}
        });
        let bundle = LoadedBundle::from_document(doc, &path()).unwrap();
        assert_eq!(bundle.encode_category("Rent"), 7);
    }

    #[test]
    fn test_missing_fields_reported() {
        let doc = json!({
            "iso_forest": forest_json(),
            "training_stats": {"rows": 100}
        });
        let err = LoadedBundle::from_document(doc, &path()).unwrap_err();

        match err {
            DetectorError::BundleInvalid { reason, found_keys } => {
                assert!(reason.contains("scaler"));
                assert!(reason.contains("feature_columns"));
                assert!(!reason.contains("model"));
                assert_eq!(found_keys, vec!["iso_forest", "training_stats"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let doc = json!({
            "model": forest_json(),
            "scaler": {"kind": "standard", "mean": [0.0], "scale": [1.0]},
            "feature_columns": ["Amount", "Month"]
        });
        let err = LoadedBundle::from_document(doc, &path()).unwrap_err();
        assert!(matches!(err, DetectorError::BundleInvalid { .. }));
    }

    #[test]
    fn test_malformed_model_rejected() {
        let doc = json!({
            "model": {"kind": "gradient_boosting"},
            "scaler": {"kind": "identity"},
            "feature_columns": ["Amount"]
        });
        let err = LoadedBundle::from_document(doc, &path()).unwrap_err();
        assert!(matches!(err, DetectorError::BundleInvalid { .. }));

        let err = LoadedBundle::from_document(json!([1, 2]), &path()).unwrap_err();
        assert!(matches!(err, DetectorError::BundleInvalid { .. }));
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_onnx_model_requires_feature() {
        let doc = json!({
            "model": {"kind": "onnx", "path": "iforest.onnx"},
            "scaler": {"kind": "identity"},
            "feature_columns": ["Amount"]
        });
        let err = LoadedBundle::from_document(doc, &path()).unwrap_err();
        assert!(matches!(err, DetectorError::BundleInvalid { .. }));
    }

    #[test]
    fn test_from_file_not_found() {
        let err = LoadedBundle::from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, DetectorError::BundleNotFound { .. }));
    }

    #[test]
    fn test_from_file_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("broken.json");
        std::fs::write(&file, "{ not json").unwrap();

        let err = LoadedBundle::from_file(&file).unwrap_err();
        assert!(matches!(err, DetectorError::BundleParse { .. }));
    }
}
