//! Deterministic quick rules evaluated before any model work

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

pub const DEFAULT_AMOUNT_MIN: f64 = 50.0;
pub const DEFAULT_AMOUNT_MAX: f64 = 10_000.0;

/// Per-category amount ceilings (tune per deployment)
pub fn default_category_thresholds() -> HashMap<String, f64> {
    let mut thresholds = HashMap::new();
    thresholds.insert("Rent".to_string(), 30_000.0);
    thresholds.insert("Groceries".to_string(), 10_000.0);
    thresholds.insert("Entertainment".to_string(), 5_000.0);
    thresholds.insert("Utilities".to_string(), 8_000.0);
    thresholds.insert("Transportation".to_string(), 6_000.0);
    thresholds.insert("Miscellaneous".to_string(), 4_000.0);
    thresholds
}

/// Which quick rule fired
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RuleHit {
    BelowMinimum { amount: f64, minimum: f64 },
    AboveMaximum { amount: f64, maximum: f64 },
    CategoryCeiling {
        category: String,
        amount: f64,
        ceiling: f64,
    },
}

impl fmt::Display for RuleHit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleHit::BelowMinimum { amount, minimum } => {
                write!(f, "amount {} below minimum {}", amount, minimum)
            }
            RuleHit::AboveMaximum { amount, maximum } => {
                write!(f, "amount {} above maximum {}", amount, maximum)
            }
            RuleHit::CategoryCeiling {
                category,
                amount,
                ceiling,
            } => write!(f, "{} amount {} above ceiling {}", category, amount, ceiling),
        }
    }
}

/// Range and per-category ceiling checks
#[derive(Debug, Clone)]
pub struct RuleEngine {
    pub amount_min: f64,
    pub amount_max: f64,
    pub category_thresholds: HashMap<String, f64>,
    /// Ceiling for categories missing from the table (none: never ceiling-checked)
    pub default_category_ceiling: Option<f64>,
}

impl RuleEngine {
    pub fn new(amount_min: f64, amount_max: f64) -> Self {
        Self {
            amount_min,
            amount_max,
            ..Default::default()
        }
    }

    pub fn with_category_thresholds(mut self, thresholds: HashMap<String, f64>) -> Self {
        self.category_thresholds = thresholds;
        self
    }

    pub fn with_default_category_ceiling(mut self, ceiling: Option<f64>) -> Self {
        self.default_category_ceiling = ceiling;
        self
    }

    /// Ceiling that applies to `category`, if any.
    pub fn ceiling_for(&self, category: &str) -> Option<f64> {
        self.category_thresholds
            .get(category)
            .copied()
            .or(self.default_category_ceiling)
    }

    /// Evaluate all rules; returns the first that fired.
    pub fn evaluate(&self, amount: f64, category: &str) -> Option<RuleHit> {
        self.evaluate_within(amount, category, self.amount_min, self.amount_max)
    }

    /// Evaluate with per-call range bounds instead of the configured ones.
    pub fn evaluate_within(
        &self,
        amount: f64,
        category: &str,
        amount_min: f64,
        amount_max: f64,
    ) -> Option<RuleHit> {
        if amount < amount_min {
            return Some(RuleHit::BelowMinimum {
                amount,
                minimum: amount_min,
            });
        }
        if amount > amount_max {
            return Some(RuleHit::AboveMaximum {
                amount,
                maximum: amount_max,
            });
        }

        match self.ceiling_for(category) {
            Some(ceiling) if amount > ceiling => Some(RuleHit::CategoryCeiling {
                category: category.to_string(),
                amount,
                ceiling,
            }),
            _ => None,
        }
    }

    /// Whether any rule fires.
    pub fn check(&self, amount: f64, category: &str) -> bool {
        self.evaluate(amount, category).is_some()
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self {
            amount_min: DEFAULT_AMOUNT_MIN,
            amount_max: DEFAULT_AMOUNT_MAX,
            category_thresholds: default_category_thresholds(),
            default_category_ceiling: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_rules() {
        let rules = RuleEngine::default();

        assert_eq!(
            rules.evaluate(40.0, "Groceries"),
            Some(RuleHit::BelowMinimum {
                amount: 40.0,
                minimum: 50.0
            })
        );
        assert!(matches!(
            rules.evaluate(10_000.01, "Groceries"),
            Some(RuleHit::AboveMaximum { .. })
        ));
        assert!(!rules.check(750.0, "Groceries"));
    }

    #[test]
    fn test_bounds_are_strict() {
        let rules = RuleEngine::default();
        assert!(!rules.check(50.0, "Travel"));
        assert!(!rules.check(10_000.0, "Travel"));
    }

    #[test]
    fn test_category_ceiling() {
        // Widen the range so only the ceiling can fire
        let rules = RuleEngine::new(50.0, 100_000.0);

        assert!(matches!(
            rules.evaluate(35_000.0, "Rent"),
            Some(RuleHit::CategoryCeiling { ceiling, .. }) if ceiling == 30_000.0
        ));
        assert!(!rules.check(30_000.0, "Rent"));
        assert!(rules.check(4_000.01, "Miscellaneous"));
        assert!(!rules.check(90_000.0, "Travel"));
    }

    #[test]
    fn test_default_rules_range_wins_for_large_rent() {
        let rules = RuleEngine::default();
        // 35k Rent is above both the range and the Rent ceiling; range is checked first
        assert!(matches!(
            rules.evaluate(35_000.0, "Rent"),
            Some(RuleHit::AboveMaximum { .. })
        ));
    }

    #[test]
    fn test_default_ceiling_for_unknown_categories() {
        let rules = RuleEngine::new(0.0, 100_000.0).with_default_category_ceiling(Some(2_000.0));

        assert!(rules.check(2_500.0, "Travel"));
        assert!(!rules.check(1_500.0, "Travel"));
        // Table entries take precedence over the default
        assert!(!rules.check(2_500.0, "Rent"));
    }

    #[test]
    fn test_per_call_bounds_keep_table() {
        let rules = RuleEngine::default()
            .with_category_thresholds(HashMap::from([("Rent".to_string(), 100.0)]));

        assert!(matches!(
            rules.evaluate_within(150.0, "Rent", 0.0, 1_000_000.0),
            Some(RuleHit::CategoryCeiling { .. })
        ));
        assert!(matches!(
            rules.evaluate_within(20.0, "Rent", 25.0, 1_000_000.0),
            Some(RuleHit::BelowMinimum { minimum, .. }) if minimum == 25.0
        ));
        assert_eq!(rules.ceiling_for("Groceries"), None);
    }

    #[test]
    fn test_rule_hit_display() {
        let hit = RuleHit::CategoryCeiling {
            category: "Rent".to_string(),
            amount: 35_000.0,
            ceiling: 30_000.0,
        };
        assert_eq!(hit.to_string(), "Rent amount 35000 above ceiling 30000");
    }
}
