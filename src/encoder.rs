//! Report encoding
//!
//! Wraps an analysis report in an envelope carrying producer metadata, the
//! configuration the run used and the time it was computed.

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::pipeline::AnalysisReport;
use crate::{PRODUCER_NAME, WORKSIGNAL_VERSION};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current report schema version
pub const REPORT_SCHEMA_VERSION: &str = "worksignal.report.v1";

/// Who produced a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Producer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Serialized form of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEnvelope {
    pub schema_version: String,
    pub producer: Producer,
    pub computed_at_utc: String,
    pub config: AnalysisConfig,
    pub report: AnalysisReport,
}

/// Encoder for report envelopes
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn encode(&self, config: &AnalysisConfig, report: AnalysisReport) -> ReportEnvelope {
        ReportEnvelope {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            producer: Producer {
                name: PRODUCER_NAME.to_string(),
                version: WORKSIGNAL_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            computed_at_utc: Utc::now().to_rfc3339(),
            config: config.clone(),
            report,
        }
    }

    /// Encode to a pretty-printed JSON string
    pub fn encode_to_json(
        &self,
        config: &AnalysisConfig,
        report: AnalysisReport,
    ) -> Result<String, AnalysisError> {
        let envelope = self.encode(config, report);
        serde_json::to_string_pretty(&envelope).map_err(AnalysisError::JsonError)
    }
}
