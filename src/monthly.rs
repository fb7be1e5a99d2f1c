//! Monthly biometric summaries joined with productivity
//!
//! Per-team correlations relate the monthly mean stress to the site's receipts
//! and efficiency ratio across the team's summarized months.

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::stats;
use crate::types::{Measure, ProductivityLabel, ProductivityRecord, TaggedSample, YearMonth};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Stress summary of one team-month next to its site's productivity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySummary {
    pub team_id: String,
    pub site_id: String,
    pub month: YearMonth,
    pub label: ProductivityLabel,
    pub sample_count: usize,
    pub mean_stress: Measure,
    pub std_stress: Measure,
    pub median_stress: Measure,
    pub receipts: f64,
    pub dispatches: f64,
    /// `receipts / mean stress`
    pub productivity_stress_ratio: Measure,
    /// `dispatches / receipts`
    pub efficiency_ratio: Measure,
}

/// Pearson correlations of monthly mean stress for one team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamCorrelation {
    pub team_id: String,
    pub months: usize,
    pub stress_vs_receipts: Measure,
    /// Over months with a defined efficiency ratio
    pub stress_vs_efficiency: Measure,
}

#[derive(Debug, Clone, Copy)]
pub struct MonthlySummarizer {
    tz: Tz,
}

impl MonthlySummarizer {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn from_config(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        Ok(Self::new(config.tz()?))
    }

    /// One summary per (team, month) of the tagged samples, ordered by team then month
    pub fn summarize(
        &self,
        tagged: &[TaggedSample],
        records: &[ProductivityRecord],
    ) -> Vec<MonthlySummary> {
        let productivity: BTreeMap<(&str, YearMonth), &ProductivityRecord> = records
            .iter()
            .map(|r| ((r.site_id.as_str(), r.month), r))
            .collect();

        let mut groups: BTreeMap<(&str, YearMonth), Vec<&TaggedSample>> = BTreeMap::new();
        for t in tagged {
            let month = YearMonth::of(&t.sample.timestamp.with_timezone(&self.tz));
            groups
                .entry((t.sample.team_id.as_str(), month))
                .or_default()
                .push(t);
        }

        let summaries: Vec<MonthlySummary> = groups
            .into_iter()
            .filter_map(|((team_id, month), samples)| {
                let first = samples.first()?;
                let record = productivity.get(&(first.site_id.as_str(), month))?;
                let stress: Vec<f64> = samples.iter().map(|t| t.sample.stress_level).collect();
                let mean_stress = stats::mean(&stress);
                let productivity_stress_ratio = match mean_stress.value() {
                    Some(m) => Measure::ratio(record.receipts, m),
                    None => mean_stress,
                };

                Some(MonthlySummary {
                    team_id: team_id.to_string(),
                    site_id: first.site_id.clone(),
                    month,
                    label: first.label,
                    sample_count: stress.len(),
                    mean_stress,
                    std_stress: stats::sample_std(&stress),
                    median_stress: stats::median(&stress),
                    receipts: record.receipts,
                    dispatches: record.dispatches,
                    productivity_stress_ratio,
                    efficiency_ratio: Measure::ratio(record.dispatches, record.receipts),
                })
            })
            .collect();

        debug!(summaries = summaries.len(), "summarized team months");
        summaries
    }

    /// Correlate monthly mean stress with productivity, one entry per team
    pub fn correlations(summaries: &[MonthlySummary]) -> Vec<TeamCorrelation> {
        let mut teams: BTreeMap<&str, Vec<&MonthlySummary>> = BTreeMap::new();
        for summary in summaries {
            teams.entry(summary.team_id.as_str()).or_default().push(summary);
        }

        teams
            .into_iter()
            .map(|(team_id, months)| {
                let (stress, receipts): (Vec<f64>, Vec<f64>) = months
                    .iter()
                    .filter_map(|m| Some((m.mean_stress.value()?, m.receipts)))
                    .unzip();
                let (eff_stress, efficiency): (Vec<f64>, Vec<f64>) = months
                    .iter()
                    .filter_map(|m| Some((m.mean_stress.value()?, m.efficiency_ratio.value()?)))
                    .unzip();
                TeamCorrelation {
                    team_id: team_id.to_string(),
                    months: months.len(),
                    stress_vs_receipts: stats::pearson(&stress, &receipts),
                    stress_vs_efficiency: stats::pearson(&eff_stress, &efficiency),
                }
            })
            .collect()
    }
}
