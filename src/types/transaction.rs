//! Expense transaction input

use crate::error::{DetectorError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A transaction in canonical form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Monetary amount
    pub amount: f64,

    /// Expense category label (open set)
    pub category: String,

    /// Calendar date or date-time; today when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl Transaction {
    pub fn new(amount: f64, category: impl Into<String>) -> Self {
        Self {
            amount,
            category: category.into(),
            date: None,
        }
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    /// Normalize a loosely shaped JSON record.
    ///
    /// Accepts both `amount`/`category`/`date` and `Amount`/`Category`/`Date`
    /// (lowercase wins when both are present). Amounts may be numbers or
    /// numeric strings; categories may be strings or numbers.
    pub fn from_json(input: &Value) -> Result<Self> {
        let Value::Object(record) = input else {
            return Err(DetectorError::InvalidInput(
                "transaction must be a JSON object".to_string(),
            ));
        };

        let amount = match field(record, "amount", "Amount") {
            Some(value) => coerce_amount(value)?,
            None => return Err(DetectorError::InvalidInput("missing field 'amount'".to_string())),
        };

        let category = match field(record, "category", "Category") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(DetectorError::InvalidInput(format!(
                    "category must be a string, got {}",
                    other
                )))
            }
            None => {
                return Err(DetectorError::InvalidInput(
                    "missing field 'category'".to_string(),
                ))
            }
        };

        let date = match field(record, "date", "Date") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => None,
        };

        Ok(Self {
            amount,
            category,
            date,
        })
    }
}

/// Value under either casing, ignoring nulls.
fn field<'a>(record: &'a Map<String, Value>, lower: &str, upper: &str) -> Option<&'a Value> {
    record
        .get(lower)
        .filter(|v| !v.is_null())
        .or_else(|| record.get(upper).filter(|v| !v.is_null()))
}

fn coerce_amount(value: &Value) -> Result<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match amount {
        Some(a) if a.is_finite() => Ok(a),
        _ => Err(DetectorError::InvalidInput(format!(
            "amount must be a finite number, got {}",
            value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lowercase_keys() {
        let tx = Transaction::from_json(&json!({
            "amount": 750,
            "category": "Rent",
            "date": "2025-07-01"
        }))
        .unwrap();

        assert_eq!(tx, Transaction::new(750.0, "Rent").with_date("2025-07-01"));
    }

    #[test]
    fn test_capitalized_keys_and_string_amount() {
        let tx = Transaction::from_json(&json!({
            "Amount": " 120.50 ",
            "Category": "Groceries",
            "Date": "2025-07-02"
        }))
        .unwrap();

        assert_eq!(tx.amount, 120.5);
        assert_eq!(tx.category, "Groceries");
        assert_eq!(tx.date.as_deref(), Some("2025-07-02"));
    }

    #[test]
    fn test_lowercase_wins_and_null_falls_through() {
        let tx = Transaction::from_json(&json!({
            "amount": 10,
            "Amount": 20,
            "category": null,
            "Category": "Utilities"
        }))
        .unwrap();

        assert_eq!(tx.amount, 10.0);
        assert_eq!(tx.category, "Utilities");
        assert_eq!(tx.date, None);
    }

    #[test]
    fn test_missing_and_malformed_fields() {
        let err = Transaction::from_json(&json!({"category": "Rent"})).unwrap_err();
        assert!(matches!(err, DetectorError::InvalidInput(_)));

        let err = Transaction::from_json(&json!({"amount": 10})).unwrap_err();
        assert!(matches!(err, DetectorError::InvalidInput(_)));

        let err = Transaction::from_json(&json!({"amount": "ten", "category": "Rent"})).unwrap_err();
        assert!(matches!(err, DetectorError::InvalidInput(_)));

        let err = Transaction::from_json(&json!({"amount": 10, "category": ["Rent"]})).unwrap_err();
        assert!(matches!(err, DetectorError::InvalidInput(_)));

        let err = Transaction::from_json(&json!([10, "Rent"])).unwrap_err();
        assert!(matches!(err, DetectorError::InvalidInput(_)));
    }

    #[test]
    fn test_transaction_serialization() {
        let tx = Transaction::new(42.0, "Entertainment");
        let json = serde_json::to_string(&tx).unwrap();
        assert!(!json.contains("date"));

        let deserialized: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(tx, deserialized);
    }
}
