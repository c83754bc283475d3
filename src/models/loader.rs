//! Bundle store: loads model bundles and caches them for the process lifetime

use crate::error::{DetectorError, Result};
use crate::models::bundle::LoadedBundle;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Bundle file used when the caller does not name one
pub const DEFAULT_BUNDLE_PATH: &str = "iso_forest_bundle.json";

/// A single active bundle is the common case
pub const DEFAULT_CACHE_CAPACITY: usize = 1;

/// Loads bundles from disk and keeps the most recent ones in memory.
///
/// Entries are keyed by the canonicalized path, so pointing the store at a
/// different file is never answered from a stale entry. When full, the oldest
/// entry is evicted. Concurrent first loads of the same path may both
/// deserialize; the first to finish populates the cache.
pub struct BundleStore {
    default_path: PathBuf,
    capacity: usize,
    entries: RwLock<VecDeque<(PathBuf, Arc<LoadedBundle>)>>,
    loads: AtomicU64,
}

impl BundleStore {
    /// Store with the conventional default path and capacity 1
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUNDLE_PATH, DEFAULT_CACHE_CAPACITY)
    }

    /// Store that falls back to `default_path` when no path is given
    pub fn with_default_path<P: Into<PathBuf>>(default_path: P) -> Self {
        Self::with_capacity(default_path, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity<P: Into<PathBuf>>(default_path: P, capacity: usize) -> Self {
        Self {
            default_path: default_path.into(),
            capacity: capacity.max(1),
            entries: RwLock::new(VecDeque::new()),
            loads: AtomicU64::new(0),
        }
    }

    /// Load the bundle at `path` (or the default path), using the cache when possible.
    pub fn load(&self, path: Option<&Path>) -> Result<Arc<LoadedBundle>> {
        let requested = path.unwrap_or(&self.default_path);
        let key = resolve_path(requested)?;

        if let Some(bundle) = self.cached(&key) {
            debug!(path = %key.display(), "Bundle served from cache");
            return Ok(bundle);
        }

        info!(path = %key.display(), "Loading model bundle");
        let bundle = Arc::new(LoadedBundle::from_file(&key)?);
        self.loads.fetch_add(1, Ordering::Relaxed);

        info!(
            path = %key.display(),
            model = bundle.model.name(),
            scaler = bundle.scaler.kind(),
            encoder = bundle.encoder.kind(),
            features = bundle.feature_columns.len(),
            "Model bundle loaded"
        );

        Ok(self.insert(key, bundle))
    }

    fn cached(&self, key: &Path) -> Option<Arc<LoadedBundle>> {
        let entries = self.entries.read().ok()?;
        entries
            .iter()
            .find(|(path, _)| path == key)
            .map(|(_, bundle)| bundle.clone())
    }

    fn insert(&self, key: PathBuf, bundle: Arc<LoadedBundle>) -> Arc<LoadedBundle> {
        let Ok(mut entries) = self.entries.write() else {
            // Poisoned cache: serve the fresh bundle uncached
            return bundle;
        };

        // Another caller may have populated the slot while we were loading
        if let Some((_, existing)) = entries.iter().find(|(path, _)| *path == key) {
            return existing.clone();
        }

        while entries.len() >= self.capacity {
            if let Some((evicted, _)) = entries.pop_front() {
                debug!(path = %evicted.display(), "Evicting cached bundle");
            }
        }
        entries.push_back((key, bundle.clone()));
        bundle
    }

    /// Number of bundles read from disk so far
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    /// Number of cached bundles
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn default_path(&self) -> &Path {
        &self.default_path
    }

    /// Drop every cached bundle
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}

impl Default for BundleStore {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_path(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Err(DetectorError::BundleNotFound {
            path: path.to_path_buf(),
        });
    }
    path.canonicalize().map_err(|source| DetectorError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn write_bundle(dir: &Path, name: &str, offset: f64) -> PathBuf {
        let bundle = json!({
            "model": {
                "kind": "isolation_forest",
                "max_samples": 4,
                "offset": offset,
                "estimators": [{
                    "children_left": [1, -1, -1],
                    "children_right": [2, -1, -1],
                    "feature": [0, -2, -2],
                    "threshold": [0.5, -2.0, -2.0],
                    "n_node_samples": [4, 1, 3]
                }]
            },
            "scaler": {"kind": "identity"},
            "feature_columns": ["Amount"]
        });
        let path = dir.join(name);
        fs::write(&path, serde_json::to_vec(&bundle).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_load_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_bundle(dir.path(), "bundle.json", -0.5);
        let store = BundleStore::new();

        let first = store.load(Some(&path)).unwrap();
        let second = store.load(Some(&path)).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.loads(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_equivalent_paths_share_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_bundle(dir.path(), "bundle.json", -0.5);
        let dotted = dir.path().join(".").join("bundle.json");
        let store = BundleStore::new();

        store.load(Some(&path)).unwrap();
        store.load(Some(&dotted)).unwrap();
        assert_eq!(store.loads(), 1);
    }

    #[test]
    fn test_switching_paths_evicts_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_bundle(dir.path(), "a.json", -0.5);
        let b = write_bundle(dir.path(), "b.json", -0.4);
        let store = BundleStore::new();

        let first = store.load(Some(&a)).unwrap();
        let second = store.load(Some(&b)).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(store.len(), 1);

        // `a` was evicted, so it is read again
        store.load(Some(&a)).unwrap();
        assert_eq!(store.loads(), 3);
    }

    #[test]
    fn test_larger_capacity_keeps_both() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_bundle(dir.path(), "a.json", -0.5);
        let b = write_bundle(dir.path(), "b.json", -0.4);
        let store = BundleStore::with_capacity(DEFAULT_BUNDLE_PATH, 2);

        store.load(Some(&a)).unwrap();
        store.load(Some(&b)).unwrap();
        store.load(Some(&a)).unwrap();
        assert_eq!(store.loads(), 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_default_path_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_bundle(dir.path(), "default.json", -0.5);
        let store = BundleStore::with_default_path(&path);

        let bundle = store.load(None).unwrap();
        assert_eq!(bundle.feature_columns, vec!["Amount"]);
    }

    #[test]
    fn test_missing_bundle() {
        let store = BundleStore::with_default_path("/no/such/bundle.json");
        let err = store.load(None).unwrap_err();
        assert!(matches!(err, DetectorError::BundleNotFound { .. }));
        assert!(store.is_empty());
        assert_eq!(store.loads(), 0);
    }

    #[test]
    fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_bundle(dir.path(), "bundle.json", -0.5);
        let store = BundleStore::new();

        store.load(Some(&path)).unwrap();
        store.clear();
        assert!(store.is_empty());
        store.load(Some(&path)).unwrap();
        assert_eq!(store.loads(), 2);
    }
}
