//! Configuration management for the anomaly engine

use crate::models::inference::DEFAULT_CUTOFF;
use crate::models::loader::{DEFAULT_BUNDLE_PATH, DEFAULT_CACHE_CAPACITY};
use crate::rules::{default_category_thresholds, RuleEngine, DEFAULT_AMOUNT_MAX, DEFAULT_AMOUNT_MIN};
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Prefix for `ANOMALY__SECTION__KEY` overrides
const ENV_PREFIX: &str = "ANOMALY";

/// Service variables honoured on top of everything else
const LEGACY_ENV: &[(&str, &str)] = &[
    ("BUNDLE_PATH", "bundle.path"),
    ("AMOUNT_MIN", "rules.amount_min"),
    ("AMOUNT_MAX", "rules.amount_max"),
];

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bundle: BundleConfig,
    pub rules: RulesConfig,
    pub scoring: ScoringConfig,
    pub logging: LoggingConfig,
}

/// Model bundle location and caching
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    /// Bundle used when a call does not name one
    pub path: PathBuf,
    /// Number of distinct bundles kept in memory
    pub cache_capacity: usize,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_BUNDLE_PATH),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// One per-category ceiling
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CategoryCeiling {
    pub category: String,
    pub ceiling: f64,
}

/// Quick-rule thresholds
///
/// Ceilings are a list of `{category, ceiling}` tables so category names
/// keep their case through the config layer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub amount_min: f64,
    pub amount_max: f64,
    pub category_thresholds: Vec<CategoryCeiling>,
    pub default_category_ceiling: Option<f64>,
}

impl RulesConfig {
    pub fn to_engine(&self) -> RuleEngine {
        let thresholds: HashMap<String, f64> = self
            .category_thresholds
            .iter()
            .map(|c| (c.category.clone(), c.ceiling))
            .collect();

        RuleEngine::new(self.amount_min, self.amount_max)
            .with_category_thresholds(thresholds)
            .with_default_category_ceiling(self.default_category_ceiling)
    }
}

impl Default for RulesConfig {
    fn default() -> Self {
        let mut category_thresholds: Vec<CategoryCeiling> = default_category_thresholds()
            .into_iter()
            .map(|(category, ceiling)| CategoryCeiling { category, ceiling })
            .collect();
        category_thresholds.sort_by(|a, b| a.category.cmp(&b.category));

        Self {
            amount_min: DEFAULT_AMOUNT_MIN,
            amount_max: DEFAULT_AMOUNT_MAX,
            category_thresholds,
            default_category_ceiling: None,
        }
    }
}

/// Model decision settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Scores at or below the cutoff are anomalous
    pub cutoff: f64,
    /// Include the raw score in outputs
    pub return_score: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            cutoff: DEFAULT_CUTOFF,
            return_score: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default file, if present, and the process environment
    pub fn load() -> Result<Self> {
        Self::from_sources(Some(Path::new(DEFAULT_CONFIG_PATH)), false, None, &legacy_env())
    }

    /// Load configuration from a specific file and the process environment
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_sources(Some(path.as_ref()), true, None, &legacy_env())
    }

    /// Build from explicit sources.
    ///
    /// A missing `file` is an error only when `required` is set. `env`
    /// replaces the process environment for `ANOMALY__*` lookups when given;
    /// `legacy` holds the `BUNDLE_PATH`/`AMOUNT_MIN`/`AMOUNT_MAX` values.
    pub fn from_sources(
        file: Option<&Path>,
        required: bool,
        env: Option<HashMap<String, String>>,
        legacy: &HashMap<String, String>,
    ) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(file) = file {
            builder = builder.add_source(File::from(file).required(required));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        for (var, key) in LEGACY_ENV {
            builder = builder
                .set_override_option(*key, legacy.get(*var).cloned())
                .with_context(|| format!("Invalid override from {}", var))?;
        }

        let config: AppConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.rules.amount_min > self.rules.amount_max {
            anyhow::bail!(
                "rules.amount_min ({}) exceeds rules.amount_max ({})",
                self.rules.amount_min,
                self.rules.amount_max
            );
        }
        if !self.scoring.cutoff.is_finite() {
            anyhow::bail!("scoring.cutoff must be finite");
        }
        Ok(())
    }
}

fn legacy_env() -> HashMap<String, String> {
    LEGACY_ENV
        .iter()
        .filter_map(|(var, _)| std::env::var(var).ok().map(|v| (var.to_string(), v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn no_env() -> Option<HashMap<String, String>> {
        Some(HashMap::new())
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.bundle.path, PathBuf::from("iso_forest_bundle.json"));
        assert_eq!(config.bundle.cache_capacity, 1);
        assert_eq!(config.rules.amount_min, 50.0);
        assert_eq!(config.rules.amount_max, 10_000.0);
        assert_eq!(config.rules.category_thresholds.len(), 6);
        assert_eq!(config.scoring.cutoff, -0.20);

        let engine = config.rules.to_engine();
        assert_eq!(engine.ceiling_for("Rent"), Some(30_000.0));
        assert_eq!(engine.ceiling_for("Travel"), None);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = AppConfig::from_sources(
            Some(Path::new("/nonexistent/config.toml")),
            false,
            no_env(),
            &HashMap::new(),
        )
        .unwrap();
        assert_eq!(config.rules.amount_min, 50.0);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_file_and_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[bundle]
path = "models/bundle.json"

[rules]
amount_min = 10.0
default_category_ceiling = 2500.0

[[rules.category_thresholds]]
category = "Rent"
ceiling = 20000.0

[scoring]
cutoff = -0.15
"#
        )
        .unwrap();

        let env = HashMap::from([("ANOMALY__LOGGING__FORMAT".to_string(), "json".to_string())]);
        let legacy = HashMap::from([("AMOUNT_MAX".to_string(), "5000".to_string())]);
        let config = AppConfig::from_sources(Some(file.path()), true, Some(env), &legacy).unwrap();

        assert_eq!(config.bundle.path, PathBuf::from("models/bundle.json"));
        assert_eq!(config.rules.amount_min, 10.0);
        assert_eq!(config.rules.amount_max, 5_000.0);
        assert_eq!(config.scoring.cutoff, -0.15);
        assert_eq!(config.logging.format, "json");

        let engine = config.rules.to_engine();
        assert_eq!(engine.ceiling_for("Rent"), Some(20_000.0));
        assert_eq!(engine.ceiling_for("Groceries"), Some(2_500.0));
    }

    #[test]
    fn test_legacy_bundle_path() {
        let legacy = HashMap::from([("BUNDLE_PATH".to_string(), "/srv/bundle.json".to_string())]);
        let config = AppConfig::from_sources(None, false, no_env(), &legacy).unwrap();
        assert_eq!(config.bundle.path, PathBuf::from("/srv/bundle.json"));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let legacy = HashMap::from([
            ("AMOUNT_MIN".to_string(), "500".to_string()),
            ("AMOUNT_MAX".to_string(), "100".to_string()),
        ]);
        assert!(AppConfig::from_sources(None, false, no_env(), &legacy).is_err());
    }

    #[test]
    fn test_explicit_missing_file_rejected() {
        let result = AppConfig::from_sources(
            Some(Path::new("/nonexistent/config.toml")),
            true,
            no_env(),
            &HashMap::new(),
        );
        assert!(result.is_err());
        assert!(AppConfig::load_from_path("/nonexistent/config.toml").is_err());
    }
}
