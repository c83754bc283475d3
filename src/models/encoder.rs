//! Category label encoding

use serde::Deserialize;
use std::collections::HashMap;

/// Code returned for categories the encoder has never seen.
pub const UNKNOWN_CATEGORY: i64 = -1;

/// Fitted label encoder: a category's code is its position in `classes`.
#[derive(Debug, Clone, Deserialize)]
pub struct LabelEncoder {
    pub classes: Vec<String>,
}

/// Whichever category encoding the bundle shipped with.
#[derive(Debug, Clone, Default)]
pub enum CategoryEncoder {
    /// Direct lookup table
    Map(HashMap<String, i64>),
    /// Fitted encoder with class membership check
    Label(LabelEncoder),
    /// Bundle carries no encoder; every category encodes to 0
    #[default]
    Absent,
}

impl CategoryEncoder {
    /// Encode a category label to its integer code.
    pub fn encode(&self, category: &str) -> i64 {
        match self {
            CategoryEncoder::Map(map) => map.get(category).copied().unwrap_or(UNKNOWN_CATEGORY),
            CategoryEncoder::Label(encoder) => encoder
                .classes
                .iter()
                .position(|c| c == category)
                .map(|idx| idx as i64)
                .unwrap_or(UNKNOWN_CATEGORY),
            CategoryEncoder::Absent => 0,
        }
    }

    /// Number of known categories (0 when absent).
    pub fn len(&self) -> usize {
        match self {
            CategoryEncoder::Map(map) => map.len(),
            CategoryEncoder::Label(encoder) => encoder.classes.len(),
            CategoryEncoder::Absent => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CategoryEncoder::Map(_) => "category_map",
            CategoryEncoder::Label(_) => "label_encoder",
            CategoryEncoder::Absent => "none",
        }
    }
}
