//! Feature row construction for outlier-model inference.
//!
//! Rebuilds, for a single transaction, the feature columns the bundle's model
//! was trained on. Column names and their order come from the bundle; this
//! module only knows how to fill the columns it recognizes.

use crate::error::{DetectorError, Result};
use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use tracing::error;

/// Canonical amount column; also triggers the log transform
pub const AMOUNT_COLUMN: &str = "Amount";
pub const CATEGORY_ENCODED_COLUMN: &str = "Category_enc";
pub const CATEGORY_RAW_COLUMN: &str = "Category";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Value stored in one feature column
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Number(f64),
    /// Raw label, only for bundles trained without a category encoding step
    Text(String),
}

/// One transaction's features, keyed by the bundle's column names.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    entries: Vec<(String, FeatureValue)>,
}

impl FeatureRow {
    /// Row with every declared column set to 0.
    pub fn zeroed(columns: &[String]) -> Self {
        Self {
            entries: columns
                .iter()
                .map(|c| (c.clone(), FeatureValue::Number(0.0)))
                .collect(),
        }
    }

    /// Set a declared column. Undeclared columns are ignored; returns whether the column exists.
    pub fn set(&mut self, column: &str, value: FeatureValue) -> bool {
        match self.entries.iter_mut().find(|(name, _)| name == column) {
            Some((_, slot)) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, column: &str) -> Option<&FeatureValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Numeric value of a column, if declared and numeric.
    pub fn number(&self, column: &str) -> Option<f64> {
        match self.get(column)? {
            FeatureValue::Number(v) => Some(*v),
            FeatureValue::Text(_) => None,
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Numeric vector in exactly `columns` order.
    pub fn project(&self, columns: &[String]) -> Result<Vec<f64>> {
        columns
            .iter()
            .map(|column| match self.get(column) {
                Some(FeatureValue::Number(v)) if v.is_finite() => Ok(*v),
                Some(FeatureValue::Number(v)) => Err(DetectorError::Scoring(format!(
                    "column {} holds non-finite value {}",
                    column, v
                ))),
                Some(FeatureValue::Text(text)) => Err(DetectorError::Scoring(format!(
                    "column {} holds non-numeric value '{}'",
                    column, text
                ))),
                None => Err(DetectorError::Scoring(format!(
                    "feature row has no column {}",
                    column
                ))),
            })
            .collect()
    }
}

/// Calendar components derived from a transaction date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarFields {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    /// Monday = 0
    pub weekday: u32,
    /// 0 for date-only inputs
    pub hour: u32,
    pub is_weekend: bool,
}

impl CalendarFields {
    /// Date-only input: hour is 0.
    pub fn from_date(date: NaiveDate) -> Self {
        Self::from_datetime(date.and_time(NaiveTime::MIN))
    }

    /// Today's local calendar date.
    pub fn today() -> Self {
        Self::from_date(Local::now().date_naive())
    }

    fn from_datetime(dt: NaiveDateTime) -> Self {
        let weekday = dt.weekday().num_days_from_monday();
        Self {
            year: dt.year(),
            month: dt.month(),
            day: dt.day(),
            weekday,
            hour: dt.hour(),
            is_weekend: weekday >= 5,
        }
    }

    fn columns(&self) -> [(&'static str, f64); 6] {
        [
            ("Year", self.year as f64),
            ("Month", self.month as f64),
            ("Day", self.day as f64),
            ("Weekday", self.weekday as f64),
            ("Hour", self.hour as f64),
            ("Is_Weekend", if self.is_weekend { 1.0 } else { 0.0 }),
        ]
    }
}

/// Parse a transaction date or date-time string.
pub fn parse_date(input: &str) -> Result<CalendarFields> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DetectorError::InvalidDate {
            input: input.to_string(),
            reason: "empty date".to_string(),
        });
    }

    // Offsets are kept as local wall time
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(CalendarFields::from_datetime(dt.naive_local()));
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(CalendarFields::from_datetime(dt));
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(CalendarFields::from_date(date));
        }
    }

    Err(DetectorError::InvalidDate {
        input: input.to_string(),
        reason: "unrecognized date format".to_string(),
    })
}

/// Locate the single column holding the monetary amount.
///
/// Exact `Amount` wins; otherwise the first column containing "amount" in any case.
pub fn find_amount_column(columns: &[String]) -> Result<&str> {
    if let Some(exact) = columns.iter().find(|c| c.as_str() == AMOUNT_COLUMN) {
        return Ok(exact.as_str());
    }

    columns
        .iter()
        .find(|c| c.to_lowercase().contains("amount"))
        .map(|c| c.as_str())
        .ok_or_else(|| DetectorError::NoAmountColumn {
            columns: columns.to_vec(),
        })
}

/// Whether the amount column was trained on log1p(amount).
fn amount_is_log_scaled(column: &str) -> bool {
    column.to_lowercase().contains("log") || column.contains(AMOUNT_COLUMN)
}

/// Builds feature rows matching a bundle's declared columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureBuilder;

impl FeatureBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build a row from raw transaction fields.
    pub fn build<F>(
        &self,
        amount: f64,
        category: &str,
        date: &str,
        feature_columns: &[String],
        encode: F,
    ) -> Result<FeatureRow>
    where
        F: Fn(&str) -> i64,
    {
        let calendar = parse_date(date)?;
        self.build_with_calendar(amount, category, &calendar, feature_columns, encode)
    }

    /// Build a row from an already-parsed date.
    pub fn build_with_calendar<F>(
        &self,
        amount: f64,
        category: &str,
        calendar: &CalendarFields,
        feature_columns: &[String],
        encode: F,
    ) -> Result<FeatureRow>
    where
        F: Fn(&str) -> i64,
    {
        let mut row = FeatureRow::zeroed(feature_columns);

        let amount_column = find_amount_column(feature_columns).map_err(|e| {
            error!(columns = ?feature_columns, "Bundle declares no amount column");
            e
        })?;
        let amount_value = if amount_is_log_scaled(amount_column) {
            amount.ln_1p()
        } else {
            amount
        };
        row.set(amount_column, FeatureValue::Number(amount_value));

        if row.get(CATEGORY_ENCODED_COLUMN).is_some() {
            row.set(
                CATEGORY_ENCODED_COLUMN,
                FeatureValue::Number(encode(category) as f64),
            );
        } else if row.get(CATEGORY_RAW_COLUMN).is_some() {
            row.set(CATEGORY_RAW_COLUMN, FeatureValue::Text(category.to_string()));
        }

        for (column, value) in calendar.columns() {
            row.set(column, FeatureValue::Number(value));
        }

        Ok(row)
    }
}
