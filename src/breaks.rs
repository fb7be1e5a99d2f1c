//! Break detection
//!
//! A break is a run of consecutive samples whose sedentary share is at or
//! above the configured threshold, lasting at least the minimum duration.
//! Qualifying samples separated by more than the maximum gap belong to
//! different breaks.
//!
//! Stress before and after a break is the mean over a few samples on either
//! side of the run, falling back to the run's own boundary samples at the
//! edges of the series.

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Issue};
use crate::stats::{self, Distribution};
use crate::types::{by_team, BiometricSample, BreakEvent, Measure};
use chrono::{Duration, NaiveDate, Timelike};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// One bucket of the break duration histogram, `[start, end)` minutes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub start_minutes: u32,
    pub end_minutes: u32,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourCount {
    pub hour: u32,
    pub count: usize,
}

/// Summary statistics over the breaks of one team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakStats {
    pub break_count: usize,
    /// Distinct local dates with at least one sample
    pub observed_days: usize,
    pub breaks_per_day: Measure,
    pub mean_duration_minutes: Measure,
    pub mean_stress_reduction: Measure,
    pub duration_histogram: Vec<HistogramBucket>,
    /// Most common local start hours, most frequent first
    pub top_start_hours: Vec<HourCount>,
    pub duration_minutes: Distribution,
}

/// Breaks detected for one team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamBreaks {
    pub team_id: String,
    pub events: Vec<BreakEvent>,
    pub stats: BreakStats,
}

/// Per-team break detector
#[derive(Debug, Clone, Copy)]
pub struct BreakDetector {
    sedentary_threshold: f64,
    min_duration: Duration,
    max_gap: Duration,
    context_samples: usize,
    histogram_bin_minutes: u32,
    tz: Tz,
}

impl BreakDetector {
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        Ok(Self {
            sedentary_threshold: config.break_sedentary_threshold,
            min_duration: Duration::minutes(config.break_min_duration_minutes as i64),
            max_gap: Duration::minutes(config.break_max_gap_minutes as i64),
            context_samples: config.break_context_samples.max(1),
            histogram_bin_minutes: config.break_histogram_bin_minutes.max(1),
            tz: config.tz()?,
        })
    }

    fn qualifies(&self, sample: &BiometricSample) -> bool {
        sample.activity.sedentary >= self.sedentary_threshold
    }

    /// Index ranges `[start, end]` of qualifying runs
    fn runs(&self, series: &[&BiometricSample]) -> Vec<(usize, usize)> {
        let mut runs = Vec::new();
        let mut current: Option<(usize, usize)> = None;

        for (i, sample) in series.iter().enumerate() {
            if !self.qualifies(sample) {
                runs.extend(current.take());
                continue;
            }
            current = match current {
                Some((start, last)) if sample.timestamp - series[last].timestamp <= self.max_gap => {
                    Some((start, i))
                }
                Some(run) => {
                    runs.push(run);
                    Some((i, i))
                }
                None => Some((i, i)),
            };
        }
        runs.extend(current);
        runs
    }

    /// Detect breaks in one team's series, which must be in chronological order
    pub fn detect(&self, team_id: &str, series: &[&BiometricSample]) -> Vec<BreakEvent> {
        self.runs(series)
            .into_iter()
            .filter_map(|(start, end)| {
                let start_time = series[start].timestamp;
                let end_time = series[end].timestamp;
                let duration = end_time - start_time;
                if duration < self.min_duration {
                    return None;
                }

                let before_from = start.saturating_sub(self.context_samples);
                let before = &series[before_from..start];
                let after_to = (end + 1 + self.context_samples).min(series.len());
                let after = &series[end + 1..after_to];

                let stress_before = context_mean(before).unwrap_or(series[start].stress_level);
                let stress_after = context_mean(after).unwrap_or(series[end].stress_level);

                Some(BreakEvent {
                    team_id: team_id.to_string(),
                    start_time,
                    end_time,
                    duration_secs: duration.num_seconds(),
                    sample_count: end - start + 1,
                    stress_before,
                    stress_after,
                    stress_reduction: stress_before - stress_after,
                })
            })
            .collect()
    }

    /// Summary statistics for a team's breaks over its observed series
    pub fn summarize(&self, series: &[&BiometricSample], events: &[BreakEvent]) -> BreakStats {
        let days: BTreeSet<NaiveDate> = series
            .iter()
            .map(|s| s.timestamp.with_timezone(&self.tz).date_naive())
            .collect();
        let durations: Vec<f64> = events.iter().map(BreakEvent::duration_minutes).collect();
        let reductions: Vec<f64> = events.iter().map(|e| e.stress_reduction).collect();

        let mut by_hour: BTreeMap<u32, usize> = BTreeMap::new();
        for event in events {
            *by_hour
                .entry(event.start_time.with_timezone(&self.tz).hour())
                .or_default() += 1;
        }
        let mut top_start_hours: Vec<HourCount> = by_hour
            .into_iter()
            .map(|(hour, count)| HourCount { hour, count })
            .collect();
        top_start_hours.sort_by(|a, b| b.count.cmp(&a.count).then(a.hour.cmp(&b.hour)));
        top_start_hours.truncate(3);

        BreakStats {
            break_count: events.len(),
            observed_days: days.len(),
            breaks_per_day: Measure::ratio(events.len() as f64, days.len() as f64),
            mean_duration_minutes: stats::mean(&durations),
            mean_stress_reduction: stats::mean(&reductions),
            duration_histogram: histogram(&durations, self.histogram_bin_minutes),
            top_start_hours,
            duration_minutes: Distribution::describe(&durations),
        }
    }

    /// Detect and summarize breaks for a single team
    pub fn analyze_team(
        &self,
        team_id: &str,
        series: &[&BiometricSample],
    ) -> Result<TeamBreaks, AnalysisError> {
        if series.is_empty() {
            return Err(AnalysisError::NoValidInput(format!(
                "no activity samples for team {team_id}"
            )));
        }
        let events = self.detect(team_id, series);
        let stats = self.summarize(series, &events);
        Ok(TeamBreaks {
            team_id: team_id.to_string(),
            events,
            stats,
        })
    }

    /// Detect breaks for every team in `samples`
    pub fn analyze(&self, samples: &[BiometricSample]) -> (Vec<TeamBreaks>, Vec<Issue>) {
        let mut teams = Vec::new();
        let mut issues = Vec::new();

        for (team_id, series) in by_team(samples) {
            match self.analyze_team(team_id, &series) {
                Ok(breaks) => {
                    debug!(team = team_id, breaks = breaks.events.len(), "detected breaks");
                    teams.push(breaks);
                }
                Err(err) => {
                    warn!(team = team_id, error = %err, "break detection failed");
                    issues.extend(Issue::from_error(team_id, &err));
                }
            }
        }
        (teams, issues)
    }
}

fn context_mean(samples: &[&BiometricSample]) -> Option<f64> {
    let stress: Vec<f64> = samples.iter().map(|s| s.stress_level).collect();
    stats::mean(&stress).value()
}

/// Fixed-width buckets from zero up to the longest duration
fn histogram(durations: &[f64], width_minutes: u32) -> Vec<HistogramBucket> {
    let width = width_minutes as f64;
    let Some(longest) = durations.iter().copied().reduce(f64::max) else {
        return Vec::new();
    };
    let bucket_count = (longest / width).floor() as usize + 1;
    let mut counts = vec![0usize; bucket_count];
    for d in durations {
        counts[((d / width).floor() as usize).min(bucket_count - 1)] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBucket {
            start_minutes: i as u32 * width_minutes,
            end_minutes: (i as u32 + 1) * width_minutes,
            count,
        })
        .collect()
}
