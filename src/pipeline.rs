//! Pipeline orchestration
//!
//! This module provides the public API for Worksignal. It runs raw records
//! through every stage and collects the results into one report:
//!
//! 1. Validation - reject malformed samples and productivity records
//! 2. ProductivityClassifier - label site-months `high`/`normal`
//! 3. TagPropagator - join samples to their site-month label
//! 4. TimeOfDayAggregator, RollingEngine, MonthlySummarizer
//! 5. PeakDetector, BreakDetector, ConsistencyScorer
//!
//! Failures isolated to one record, site or team become `Issue`s in the
//! report. Only an invalid configuration fails a whole run.

use crate::aggregator::{TimeOfDayAggregator, TimeOfDayProfile};
use crate::breaks::{BreakDetector, TeamBreaks};
use crate::classifier::{Classification, ProductivityClassifier};
use crate::config::AnalysisConfig;
use crate::consistency::{ConsistencyReport, ConsistencyScorer};
use crate::error::{AnalysisError, Issue, IssueKind};
use crate::monthly::{MonthlySummarizer, MonthlySummary, TeamCorrelation};
use crate::peaks::{PeakDetector, TeamPeaks};
use crate::rolling::{RollingEngine, SiteRollingMetrics};
use crate::schema::{normalize_id, Parsed, RawBiometricSample, RawProductivityRecord, RecordAdapter};
use crate::tagging::{SiteMap, TagPropagator};
use crate::types::{BiometricSample, ProductivityRecord};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Record counts and rejections from input validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub samples_received: usize,
    pub samples_accepted: usize,
    pub records_received: usize,
    pub records_accepted: usize,
    /// One malformed-record issue per rejected input
    pub rejections: Vec<Issue>,
}

/// How tagged samples were distributed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaggingSummary {
    pub tagged: usize,
    pub dropped_without_productivity: usize,
    pub dropped_unmapped: usize,
}

/// Everything one run produces
///
/// A section is `None` when its required input was entirely missing; the
/// reason is listed in `issues`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub validation: ValidationReport,
    pub classification: Option<Classification>,
    pub rolling: Option<Vec<SiteRollingMetrics>>,
    pub tagging: Option<TaggingSummary>,
    pub time_of_day: Option<TimeOfDayProfile>,
    pub monthly: Option<Vec<MonthlySummary>>,
    /// Monthly stress against productivity, per team
    pub correlations: Option<Vec<TeamCorrelation>>,
    pub peaks: Option<Vec<TeamPeaks>>,
    pub breaks: Option<Vec<TeamBreaks>>,
    pub consistency: Option<ConsistencyReport>,
    pub issues: Vec<Issue>,
}

/// Runs the full analysis with one configuration
#[derive(Debug, Clone)]
pub struct AnalysisPipeline {
    config: AnalysisConfig,
    sites: SiteMap,
    tz: Tz,
}

impl AnalysisPipeline {
    /// Create a pipeline, failing on an invalid configuration
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        let tz = config.tz()?;
        let sites = SiteMap::new(&config.team_sites);
        if sites.is_empty() {
            warn!("no team to site mappings configured; every sample will be unmapped");
        }
        Ok(Self { config, sites, tz })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyze JSON arrays of raw samples and productivity records
    ///
    /// Fails only when either document is not a JSON array; malformed
    /// elements are rejected and reported.
    pub fn run_json(&self, samples_json: &str, records_json: &str) -> Result<AnalysisReport, AnalysisError> {
        let samples: Parsed<RawBiometricSample> = RecordAdapter::parse_array(samples_json)?;
        let records: Parsed<RawProductivityRecord> = RecordAdapter::parse_array(records_json)?;
        self.run(&samples, &records)
    }

    /// Validate parsed input and analyze what survives
    ///
    /// Parse rejections and validation rejections are reported together,
    /// keyed by input position.
    pub fn run(
        &self,
        samples: &Parsed<RawBiometricSample>,
        records: &Parsed<RawProductivityRecord>,
    ) -> Result<AnalysisReport, AnalysisError> {
        let validated_samples =
            RecordAdapter::validate_samples(samples.indexed()).with_parse_rejections(&samples.rejected);
        let validated_records = RecordAdapter::validate_productivity(records.indexed())
            .with_parse_rejections(&records.rejected);

        let mut validation = ValidationReport {
            samples_received: samples.received(),
            samples_accepted: validated_samples.records.len(),
            records_received: records.received(),
            records_accepted: validated_records.records.len(),
            rejections: Vec::new(),
        };
        validation
            .rejections
            .extend(validated_samples.rejected.iter().map(|r| r.to_issue("samples")));
        validation
            .rejections
            .extend(validated_records.rejected.iter().map(|r| r.to_issue("productivity")));

        let mut report = self.analyze(&validated_samples.records, &validated_records.records)?;
        let mut issues = validation.rejections.clone();
        issues.append(&mut report.issues);
        report.issues = issues;
        report.validation = validation;
        Ok(report)
    }

    /// Analyze already-validated samples and records
    ///
    /// Team and site identifiers are normalized (trimmed, upper-cased) on entry,
    /// matching the keys of the configured team to site map.
    pub fn analyze(
        &self,
        samples: &[BiometricSample],
        records: &[ProductivityRecord],
    ) -> Result<AnalysisReport, AnalysisError> {
        let mut report = AnalysisReport::default();
        let (mapped, unmapped) = self.partition_mapped(samples, &mut report.issues);
        let records: Vec<ProductivityRecord> = records
            .iter()
            .map(|r| ProductivityRecord {
                site_id: normalize_id(&r.site_id),
                ..r.clone()
            })
            .collect();
        let records = records.as_slice();

        if records.is_empty() {
            warn!("no valid productivity records");
            report.issues.push(Issue::new(
                IssueKind::InsufficientData,
                "productivity",
                "no valid productivity records; classification, rolling, tagging and time-of-day sections skipped",
            ));
        } else {
            let (classification, issues) =
                ProductivityClassifier::from_config(&self.config).classify_all(records);
            report.issues.extend(issues);

            let (rolling, issues) = RollingEngine::from_config(&self.config).compute_all(records);
            report.issues.extend(issues);
            report.rolling = Some(rolling);

            let outcome = TagPropagator::new(&self.sites, &classification, self.tz).propagate(&mapped);
            report.issues.extend(outcome.issues);
            report.tagging = Some(TaggingSummary {
                tagged: outcome.tagged.len(),
                dropped_without_productivity: outcome.dropped_without_productivity,
                dropped_unmapped: outcome.dropped_unmapped + unmapped,
            });

            if outcome.tagged.is_empty() {
                report.issues.push(Issue::new(
                    IssueKind::InsufficientData,
                    "samples",
                    "no samples fall in a classified site-month; time-of-day, monthly and correlation sections skipped",
                ));
            } else {
                report.time_of_day =
                    Some(TimeOfDayAggregator::from_config(&self.config)?.aggregate(&outcome.tagged));
                let monthly = MonthlySummarizer::from_config(&self.config)?.summarize(&outcome.tagged, records);
                report.correlations = Some(MonthlySummarizer::correlations(&monthly));
                report.monthly = Some(monthly);
            }
            report.classification = Some(classification);
        }

        if mapped.is_empty() {
            report.issues.push(Issue::new(
                IssueKind::InsufficientData,
                "samples",
                "no valid samples for mapped teams; peak, break and consistency sections skipped",
            ));
        } else {
            let (peaks, issues) = PeakDetector::from_config(&self.config)?.analyze(&mapped);
            report.issues.extend(issues);
            report.peaks = Some(peaks);

            let (breaks, issues) = BreakDetector::from_config(&self.config)?.analyze(&mapped);
            report.issues.extend(issues);
            report.breaks = Some(breaks);

            let (consistency, issues) = ConsistencyScorer::from_config(&self.config)?.score(&mapped);
            report.issues.extend(issues);
            report.consistency = Some(consistency);
        }

        info!(
            samples = samples.len(),
            records = records.len(),
            issues = report.issues.len(),
            "analysis complete"
        );
        Ok(report)
    }

    /// Split samples into those of mapped teams and a count of the rest,
    /// reporting each unmapped team once
    fn partition_mapped(
        &self,
        samples: &[BiometricSample],
        issues: &mut Vec<Issue>,
    ) -> (Vec<BiometricSample>, usize) {
        let mut unmapped_teams: BTreeSet<String> = BTreeSet::new();
        let mut unmapped = 0;
        let mut mapped = Vec::with_capacity(samples.len());

        for sample in samples {
            let team_id = normalize_id(&sample.team_id);
            if self.sites.contains_team(&team_id) {
                mapped.push(BiometricSample {
                    team_id,
                    ..sample.clone()
                });
                continue;
            }
            unmapped += 1;
            if !unmapped_teams.contains(&team_id) {
                let err = AnalysisError::MissingMapping {
                    team_id: team_id.clone(),
                };
                warn!(team = %team_id, "team has no site mapping");
                issues.extend(Issue::from_error(&team_id, &err));
                unmapped_teams.insert(team_id);
            }
        }
        (mapped, unmapped)
    }
}
