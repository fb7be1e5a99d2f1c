//! Adapter for turning raw input into validated records
//!
//! Parsing accepts either a JSON array or NDJSON. Validation is per record:
//! an invalid record is excluded and reported while the rest of the batch
//! continues through the pipeline.

use crate::error::{AnalysisError, Issue, IssueKind};
use crate::schema::raw_record::*;
use crate::types::{BiometricSample, ProductivityRecord, YearMonth};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Adapter for parsing and validating raw records
pub struct RecordAdapter;

impl RecordAdapter {
    /// Parse a JSON string containing an array of records
    ///
    /// Only a document that is not a JSON array fails. Elements whose fields
    /// have the wrong type are rejected individually, keyed by array index.
    pub fn parse_array<T: DeserializeOwned>(json: &str) -> Result<Parsed<T>, AnalysisError> {
        let values: Vec<Value> = serde_json::from_str(json)?;
        let mut parsed = Parsed::default();
        for (index, value) in values.into_iter().enumerate() {
            match serde_json::from_value::<T>(value) {
                Ok(record) => parsed.records.push((index, record)),
                Err(e) => parsed.rejected.push(ValidationResult {
                    index,
                    error: ValidationError::Unparseable(e.to_string()),
                }),
            }
        }
        Ok(parsed)
    }

    /// Parse NDJSON (newline-delimited JSON)
    ///
    /// Records are keyed by their 1-based line number; a line that fails to
    /// parse is rejected and parsing continues with the next line.
    pub fn parse_ndjson<T: DeserializeOwned>(ndjson: &str) -> Parsed<T> {
        let mut parsed = Parsed::default();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(trimmed) {
                Ok(record) => parsed.records.push((line_num + 1, record)),
                Err(e) => parsed.rejected.push(ValidationResult {
                    index: line_num + 1,
                    error: ValidationError::Unparseable(e.to_string()),
                }),
            }
        }
        parsed
    }

    /// Validate a batch of biometric samples given with their input positions
    pub fn validate_samples<'a, I>(raw: I) -> Validated<BiometricSample>
    where
        I: IntoIterator<Item = (usize, &'a RawBiometricSample)>,
    {
        let mut validated = Validated::default();
        let mut total = 0;
        for (index, record) in raw {
            total += 1;
            match record.validate() {
                Ok(sample) => validated.records.push(sample),
                Err(error) => validated.rejected.push(ValidationResult { index, error }),
            }
        }
        if !validated.rejected.is_empty() {
            warn!(
                rejected = validated.rejected.len(),
                total,
                "biometric samples failed validation"
            );
        }
        debug!(valid = validated.records.len(), "validated biometric samples");
        validated
    }

    /// Validate a batch of productivity records given with their input positions
    ///
    /// Only one record per (site, month) is allowed; later duplicates are rejected.
    pub fn validate_productivity<'a, I>(raw: I) -> Validated<ProductivityRecord>
    where
        I: IntoIterator<Item = (usize, &'a RawProductivityRecord)>,
    {
        let mut validated = Validated::default();
        let mut seen: HashSet<(String, YearMonth)> = HashSet::new();
        let mut total = 0;
        for (index, record) in raw {
            total += 1;
            let result = record.validate().and_then(|r| {
                if seen.insert((r.site_id.clone(), r.month)) {
                    Ok(r)
                } else {
                    Err(ValidationError::DuplicateRecord(format!(
                        "{} {}",
                        r.site_id, r.month
                    )))
                }
            });
            match result {
                Ok(r) => validated.records.push(r),
                Err(error) => validated.rejected.push(ValidationResult { index, error }),
            }
        }
        if !validated.rejected.is_empty() {
            warn!(
                rejected = validated.rejected.len(),
                total,
                "productivity records failed validation"
            );
        }
        validated
    }
}

/// Records that deserialized, each with its input position, and those that did not
#[derive(Debug, Clone)]
pub struct Parsed<T> {
    pub records: Vec<(usize, T)>,
    pub rejected: Vec<ValidationResult>,
}

impl<T> Parsed<T> {
    /// Number of records in the input, parsed or not
    pub fn received(&self) -> usize {
        self.records.len() + self.rejected.len()
    }

    pub fn indexed(&self) -> impl Iterator<Item = (usize, &T)> {
        self.records.iter().map(|(index, record)| (*index, record))
    }
}

impl<T> Default for Parsed<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

/// A rejected record
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    /// Array index for JSON input, 1-based line number for NDJSON
    pub index: usize,
    pub error: ValidationError,
}

impl ValidationResult {
    /// Report the rejection as a malformed-record issue
    pub fn to_issue(&self, input: &str) -> Issue {
        Issue::new(
            IssueKind::MalformedRecord,
            format!("{}[{}]", input, self.index),
            self.error.to_string(),
        )
    }
}

/// Valid records and the rejections encountered while producing them
#[derive(Debug, Clone)]
pub struct Validated<T> {
    pub records: Vec<T>,
    pub rejected: Vec<ValidationResult>,
}

impl<T> Validated<T> {
    /// Merge rejections from parsing, keeping all rejections in input order
    pub fn with_parse_rejections(mut self, rejected: &[ValidationResult]) -> Self {
        self.rejected.extend(rejected.iter().cloned());
        self.rejected.sort_by_key(|r| r.index);
        self
    }
}

impl<T> Default for Validated<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_array() {
        let json = r#"[
            {"timestamp": "2024-01-15T09:00:00Z", "team_id": "KB3", "stress_level": 40.0,
             "activity": {"sedentary": 70, "light": 20, "moderate": 10, "intense": 0}}
        ]"#;
        let parsed: Parsed<RawBiometricSample> = RecordAdapter::parse_array(json).unwrap();
        assert_eq!(parsed.received(), 1);
        let validated = RecordAdapter::validate_samples(parsed.indexed());
        assert_eq!(validated.records.len(), 1);
        assert!(validated.rejected.is_empty());
    }

    #[test]
    fn test_parse_array_isolates_wrong_typed_elements() {
        let json = r#"[
            {"site_id": "KB3", "year": 2024, "month": 1, "receipts": 10, "dispatches": 8},
            {"site_id": "KB3", "year": 2024, "month": "March", "receipts": 12, "dispatches": 9},
            {"site_id": "KB3", "year": 2024, "month": 13, "receipts": 12, "dispatches": 9}
        ]"#;
        let parsed: Parsed<RawProductivityRecord> = RecordAdapter::parse_array(json).unwrap();
        assert_eq!(parsed.received(), 3);
        assert_eq!(parsed.rejected.len(), 1);
        assert_eq!(parsed.rejected[0].index, 1);
        assert!(matches!(parsed.rejected[0].error, ValidationError::Unparseable(_)));

        let validated = RecordAdapter::validate_productivity(parsed.indexed())
            .with_parse_rejections(&parsed.rejected);
        assert_eq!(validated.records.len(), 1);
        let indices: Vec<usize> = validated.rejected.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![1, 2]);
    }

    #[test]
    fn test_parse_array_syntax_error() {
        let result: Result<Parsed<RawBiometricSample>, _> = RecordAdapter::parse_array("not json");
        assert!(matches!(result, Err(AnalysisError::JsonError(_))));

        let result: Result<Parsed<RawBiometricSample>, _> =
            RecordAdapter::parse_array(r#"{"team_id": "NOPS"}"#);
        assert!(matches!(result, Err(AnalysisError::JsonError(_))));
    }

    #[test]
    fn test_parse_ndjson_keeps_going() {
        let ndjson = concat!(
            r#"{"site_id": "KB3", "year": 2024, "month": 1, "receipts": 10, "dispatches": 8}"#,
            "\n\n",
            "{broken\n",
            r#"{"site_id": "KB3", "year": 2024, "month": 2, "receipts": 12, "dispatches": 9}"#,
            "\n",
            r#"{"site_id": "KB3", "year": 2024, "month": 14, "receipts": 12, "dispatches": 9}"#,
            "\n"
        );
        let parsed = RecordAdapter::parse_ndjson::<RawProductivityRecord>(ndjson);
        assert_eq!(parsed.records.len(), 3);
        assert_eq!(parsed.rejected.len(), 1);
        assert_eq!(parsed.rejected[0].index, 3);
        assert!(matches!(parsed.rejected[0].error, ValidationError::Unparseable(_)));

        // Validation rejections carry the same line numbers as parse rejections
        let validated = RecordAdapter::validate_productivity(parsed.indexed())
            .with_parse_rejections(&parsed.rejected);
        let indices: Vec<usize> = validated.rejected.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![3, 5]);
    }

    #[test]
    fn test_invalid_records_are_isolated() {
        let raw = vec![
            RawBiometricSample {
                timestamp: Some("2024-01-15T09:00:00Z".to_string()),
                team_id: Some("KB3".to_string()),
                stress_level: Some(40.0),
                activity: Some(RawActivity {
                    sedentary: Some(100.0),
                    light: Some(0.0),
                    moderate: Some(0.0),
                    intense: Some(0.0),
                }),
            },
            RawBiometricSample::default(),
        ];
        let validated = RecordAdapter::validate_samples(raw.iter().enumerate());
        assert_eq!(validated.records.len(), 1);
        assert_eq!(validated.rejected.len(), 1);
        assert_eq!(validated.rejected[0].index, 1);

        let issue = validated.rejected[0].to_issue("samples");
        assert_eq!(issue.kind, IssueKind::MalformedRecord);
        assert_eq!(issue.subject, "samples[1]");
    }

    #[test]
    fn test_duplicate_site_month_rejected() {
        let record = RawProductivityRecord {
            site_id: Some("DALMUIR".to_string()),
            year: Some(2024),
            month: Some(5),
            receipts: Some(100.0),
            dispatches: Some(90.0),
        };
        let duplicate = RawProductivityRecord {
            site_id: Some("dalmuir".to_string()),
            receipts: Some(300.0),
            ..record.clone()
        };
        let validated = RecordAdapter::validate_productivity([record, duplicate].iter().enumerate());
        assert_eq!(validated.records.len(), 1);
        assert_eq!(validated.records[0].receipts, 100.0);
        assert!(matches!(
            validated.rejected[0].error,
            ValidationError::DuplicateRecord(_)
        ));
    }
}
