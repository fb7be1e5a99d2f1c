//! worksignal.input.v1 record definitions
//!
//! Raw records mirror what an external loader hands over. Every field is
//! optional at this layer so that a missing or invalid value is reported
//! against the offending record instead of failing the whole batch.

use crate::types::{ActivityBreakdown, BiometricSample, ProductivityRecord, YearMonth};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current input schema version
pub const SCHEMA_VERSION: &str = "worksignal.input.v1";

/// Allowed distance of an activity breakdown total from 100
pub const BREAKDOWN_SUM_TOLERANCE: f64 = 1.0;

/// Normalize a team or site identifier (trimmed, upper-case)
pub fn normalize_id(id: &str) -> String {
    id.trim().to_uppercase()
}

/// Activity breakdown as received
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawActivity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sedentary: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub light: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moderate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intense: Option<f64>,
}

/// Biometric sample as received
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawBiometricSample {
    /// RFC 3339 timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stress_level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<RawActivity>,
}

/// Monthly productivity record as received
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawProductivityRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipts: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatches: Option<f64>,
}

impl RawBiometricSample {
    /// Validate and convert into a [`BiometricSample`]
    pub fn validate(&self) -> Result<BiometricSample, ValidationError> {
        let timestamp = self
            .timestamp
            .as_deref()
            .ok_or(ValidationError::MissingField("timestamp"))?;
        let timestamp = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|e| ValidationError::InvalidTimestamp(format!("{timestamp}: {e}")))?
            .with_timezone(&Utc);

        let team_id = required_id(self.team_id.as_deref(), "team_id")?;

        let stress_level = required_number(self.stress_level, "stress_level")?;
        check_percentage(stress_level, "stress_level")?;

        let activity = self
            .activity
            .as_ref()
            .ok_or(ValidationError::MissingField("activity"))?;
        let breakdown = ActivityBreakdown::new(
            required_number(activity.sedentary, "activity.sedentary")?,
            required_number(activity.light, "activity.light")?,
            required_number(activity.moderate, "activity.moderate")?,
            required_number(activity.intense, "activity.intense")?,
        );
        check_percentage(breakdown.sedentary, "activity.sedentary")?;
        check_percentage(breakdown.light, "activity.light")?;
        check_percentage(breakdown.moderate, "activity.moderate")?;
        check_percentage(breakdown.intense, "activity.intense")?;

        // An all-zero breakdown is accepted; it is excluded from activity shares downstream
        let total = breakdown.total();
        if total != 0.0 && (total - 100.0).abs() > BREAKDOWN_SUM_TOLERANCE {
            return Err(ValidationError::BreakdownSum(total));
        }

        Ok(BiometricSample {
            timestamp,
            team_id,
            stress_level,
            activity: breakdown,
        })
    }
}

impl RawProductivityRecord {
    /// Validate and convert into a [`ProductivityRecord`]
    pub fn validate(&self) -> Result<ProductivityRecord, ValidationError> {
        let site_id = required_id(self.site_id.as_deref(), "site_id")?;
        let year = self.year.ok_or(ValidationError::MissingField("year"))?;
        let month = self.month.ok_or(ValidationError::MissingField("month"))?;
        let month = YearMonth::new(year, month).ok_or(ValidationError::InvalidMonth(month))?;

        let receipts = required_number(self.receipts, "receipts")?;
        let dispatches = required_number(self.dispatches, "dispatches")?;
        if receipts < 0.0 {
            return Err(ValidationError::Negative("receipts"));
        }
        if dispatches < 0.0 {
            return Err(ValidationError::Negative("dispatches"));
        }

        Ok(ProductivityRecord {
            site_id,
            month,
            receipts,
            dispatches,
        })
    }
}

fn required_id(value: Option<&str>, field: &'static str) -> Result<String, ValidationError> {
    let value = value.ok_or(ValidationError::MissingField(field))?;
    let id = normalize_id(value);
    if id.is_empty() {
        return Err(ValidationError::EmptyIdentifier(field));
    }
    Ok(id)
}

fn required_number(value: Option<f64>, field: &'static str) -> Result<f64, ValidationError> {
    let value = value.ok_or(ValidationError::MissingField(field))?;
    if !value.is_finite() {
        return Err(ValidationError::NonFinite(field));
    }
    Ok(value)
}

fn check_percentage(value: f64, field: &'static str) -> Result<(), ValidationError> {
    if !(0.0..=100.0).contains(&value) {
        return Err(ValidationError::OutOfRange { field, value });
    }
    Ok(())
}

/// Validation errors for raw records
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Empty identifier: {0}")]
    EmptyIdentifier(&'static str),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Non-finite value in field: {0}")]
    NonFinite(&'static str),

    #[error("Negative value in field: {0}")]
    Negative(&'static str),

    #[error("Value {value} out of range [0, 100] in field {field}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("Invalid month: {0}")]
    InvalidMonth(u32),

    #[error("Activity breakdown sums to {0}, expected 100")]
    BreakdownSum(f64),

    #[error("Duplicate record for {0}")]
    DuplicateRecord(String),

    #[error("Unparseable record: {0}")]
    Unparseable(String),
}
