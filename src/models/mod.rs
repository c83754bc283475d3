//! Model bundle loading and outlier scoring components

pub mod bundle;
pub mod encoder;
pub mod iforest;
pub mod inference;
pub mod loader;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod scaler;

pub use bundle::LoadedBundle;
pub use encoder::CategoryEncoder;
pub use iforest::IsolationForest;
pub use inference::{OutlierModel, Scorer, DEFAULT_CUTOFF};
pub use loader::BundleStore;
pub use scaler::Scaler;
