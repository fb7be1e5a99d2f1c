//! Worksignal - stress and activity analytics against site productivity
//!
//! Worksignal relates wearable stress/activity samples of work teams to the
//! monthly productivity of the sites they work at, through a deterministic
//! batch pipeline: validation → month classification → tag propagation →
//! time-of-day aggregation and rolling metrics → peaks, breaks and consistency.
//!
//! ## Modules
//!
//! - **Classification**: percentile-based `high`/`normal` labelling of site-months
//! - **Biometric analytics**: time-of-day curves, stress peaks, breaks, consistency
//! - **Productivity analytics**: month-over-month change, rolling efficiency, volatility

pub mod aggregator;
pub mod breaks;
pub mod classifier;
pub mod config;
pub mod consistency;
pub mod encoder;
pub mod error;
pub mod monthly;
pub mod peaks;
pub mod pipeline;
pub mod rolling;
pub mod schema;
pub mod stats;
pub mod tagging;
pub mod timebin;
pub mod types;

pub use config::AnalysisConfig;
pub use encoder::{ReportEncoder, ReportEnvelope};
pub use error::{AnalysisError, Issue, IssueKind};
pub use pipeline::{AnalysisPipeline, AnalysisReport};
pub use types::{Measure, UndefinedReason};

// Schema exports
pub use schema::{RawBiometricSample, RawProductivityRecord, RecordAdapter, SCHEMA_VERSION};

/// Worksignal version embedded in all reports
pub const WORKSIGNAL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "worksignal";
