//! Consistency and variability scoring
//!
//! Temporal consistency of a team is measured per time bin as the coefficient
//! of variation of the team's daily mean stress across days. The consistency
//! score is the mean of the defined per-bin values; lower is more consistent.
//!
//! Variability metrics use the same in-window samples:
//! - within-day: mean of the per-day stress standard deviations
//! - between-day: standard deviation of the daily means
//! - stability: `1 / (1 + ln(1 + within + between))`
//!
//! Stress outliers are counted over the team's whole series with IQR fences.

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Issue};
use crate::stats::{self, Outliers};
use crate::timebin::TimeBinner;
use crate::types::{by_team, BiometricSample, Measure, TimeBin, UndefinedReason};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Day-to-day consistency of one time bin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinConsistency {
    pub bin: TimeBin,
    /// Days with at least one sample in the bin
    pub day_count: usize,
    /// Coefficient of variation of the daily means
    pub cov: Measure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamConsistency {
    pub team_id: String,
    pub bins: Vec<BinConsistency>,
    /// Mean of the defined per-bin CoVs
    pub consistency_score: Measure,
    pub within_day_variability: Measure,
    pub between_day_variability: Measure,
    pub total_std: Measure,
    pub stability_score: Measure,
    pub stress_outliers: Outliers,
    /// 1-based position by ascending score, `None` when the score is undefined
    pub rank: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    /// Teams ordered by identifier
    pub teams: Vec<TeamConsistency>,
}

impl ConsistencyReport {
    /// Ranked teams, most consistent first
    pub fn ranking(&self) -> Vec<&TeamConsistency> {
        let mut ranked: Vec<&TeamConsistency> =
            self.teams.iter().filter(|t| t.rank.is_some()).collect();
        ranked.sort_by_key(|t| t.rank);
        ranked
    }
}

/// Scores stress consistency per team
#[derive(Debug, Clone, Copy)]
pub struct ConsistencyScorer {
    binner: TimeBinner,
}

impl ConsistencyScorer {
    pub fn new(binner: TimeBinner) -> Self {
        Self { binner }
    }

    pub fn from_config(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        Ok(Self::new(TimeBinner::from_config(config)?))
    }

    /// Score one team's series
    pub fn score_team(
        &self,
        team_id: &str,
        series: &[&BiometricSample],
    ) -> Result<TeamConsistency, AnalysisError> {
        let mut per_bin: BTreeMap<TimeBin, BTreeMap<NaiveDate, Vec<f64>>> = BTreeMap::new();
        let mut per_day: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
        let mut all = Vec::new();

        for sample in series {
            let Some(bin) = self.binner.bin_of(&sample.timestamp) else {
                continue;
            };
            let day = self.binner.local_date(&sample.timestamp);
            per_bin
                .entry(bin)
                .or_default()
                .entry(day)
                .or_default()
                .push(sample.stress_level);
            per_day.entry(day).or_default().push(sample.stress_level);
            all.push(sample.stress_level);
        }

        if all.is_empty() {
            return Err(AnalysisError::NoValidInput(format!(
                "no samples inside working hours for team {team_id}"
            )));
        }

        let bins: Vec<BinConsistency> = per_bin
            .into_iter()
            .map(|(bin, days)| {
                let daily_means = daily_means(&days);
                BinConsistency {
                    bin,
                    day_count: daily_means.len(),
                    cov: stats::coefficient_of_variation(&daily_means),
                }
            })
            .collect();

        let covs: Vec<f64> = bins.iter().filter_map(|b| b.cov.value()).collect();
        let consistency_score = if covs.is_empty() {
            Measure::undefined(UndefinedReason::InsufficientSamples)
        } else {
            stats::mean(&covs)
        };

        let day_stds: Vec<f64> = per_day
            .values()
            .filter_map(|v| stats::sample_std(v).value())
            .collect();
        let within = if day_stds.is_empty() {
            Measure::undefined(UndefinedReason::InsufficientSamples)
        } else {
            stats::mean(&day_stds)
        };
        let between = stats::sample_std(&daily_means(&per_day));
        let stability = match (within.value(), between.value()) {
            (Some(w), Some(b)) => Measure::defined(1.0 / (1.0 + (1.0 + w + b).ln())),
            _ => Measure::undefined(UndefinedReason::InsufficientSamples),
        };

        Ok(TeamConsistency {
            team_id: team_id.to_string(),
            bins,
            consistency_score,
            within_day_variability: within,
            between_day_variability: between,
            total_std: stats::sample_std(&all),
            stability_score: stability,
            stress_outliers: Outliers::iqr(&series.iter().map(|s| s.stress_level).collect::<Vec<_>>()),
            rank: None,
        })
    }

    /// Score every team and rank them by ascending consistency score
    pub fn score(&self, samples: &[BiometricSample]) -> (ConsistencyReport, Vec<Issue>) {
        let mut report = ConsistencyReport::default();
        let mut issues = Vec::new();

        for (team_id, series) in by_team(samples) {
            match self.score_team(team_id, &series) {
                Ok(team) => {
                    debug!(team = team_id, bins = team.bins.len(), "scored consistency");
                    report.teams.push(team);
                }
                Err(err) => {
                    warn!(team = team_id, error = %err, "consistency scoring failed");
                    issues.extend(Issue::from_error(team_id, &err));
                }
            }
        }

        rank(&mut report.teams);
        (report, issues)
    }
}

fn daily_means(days: &BTreeMap<NaiveDate, Vec<f64>>) -> Vec<f64> {
    days.values().filter_map(|v| stats::mean(v).value()).collect()
}

/// Assign ranks by ascending score; ties keep identifier order
fn rank(teams: &mut [TeamConsistency]) {
    let mut scored: Vec<(usize, f64)> = teams
        .iter()
        .enumerate()
        .filter_map(|(i, t)| t.consistency_score.value().map(|s| (i, s)))
        .collect();
    scored.sort_by(|a, b| a.1.total_cmp(&b.1));
    for (position, (i, _)) in scored.into_iter().enumerate() {
        teams[i].rank = Some(position + 1);
    }
}
