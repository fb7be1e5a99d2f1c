//! Error types for Worksignal

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during analysis
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("No site mapping for team: {team_id}")]
    MissingMapping { team_id: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Degenerate input for site {site_id}: {detail}")]
    DegenerateInput { site_id: String, detail: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("No valid input: {0}")]
    NoValidInput(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid TOML: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Category of a non-fatal problem reported alongside partial results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingMapping,
    InsufficientData,
    DegenerateInput,
    MalformedRecord,
}

/// A non-fatal problem isolated to one record or group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    /// Record, team or site the issue is attached to
    pub subject: String,
    pub message: String,
}

impl Issue {
    pub fn new(kind: IssueKind, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            message: message.into(),
        }
    }

    /// Convert a group-level error into an issue.
    ///
    /// Returns `None` for errors that are fatal to a run rather than isolated to a group.
    pub fn from_error(subject: impl Into<String>, error: &AnalysisError) -> Option<Self> {
        let kind = match error {
            AnalysisError::MissingMapping { .. } => IssueKind::MissingMapping,
            AnalysisError::InsufficientData(_) | AnalysisError::NoValidInput(_) => {
                IssueKind::InsufficientData
            }
            AnalysisError::DegenerateInput { .. } => IssueKind::DegenerateInput,
            _ => return None,
        };
        Some(Self::new(kind, subject, error.to_string()))
    }
}
