//! Stress peak and recovery detection
//!
//! Scans each team's stress series chronologically. A peak opens when stress
//! crosses above the peak threshold from a sample at or below it, tracks the
//! local maximum while the series stays above, and closes at the first sample
//! back at or below the threshold. Recovery is the elapsed time from the peak
//! maximum to the first later sample at or below the baseline-return level.

use crate::config::{AnalysisConfig, BaselineReturn, PeakThreshold};
use crate::error::{AnalysisError, Issue};
use crate::stats::{self, Distribution};
use crate::types::{by_team, BiometricSample, Measure, PeakEvent};
use chrono::Timelike;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Summary statistics over the peaks of one team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakStats {
    pub peak_count: usize,
    pub recovered_count: usize,
    /// `recovered / peaks`
    pub recovery_success_rate: Measure,
    /// Span between first and last sample
    pub observed_hours: f64,
    /// Peaks per observed hour
    pub peak_frequency_per_hour: Measure,
    pub mean_intensity: Measure,
    /// Recovery durations in minutes, recovered peaks only
    pub recovery_minutes: Distribution,
    /// Peak count by local hour of `peak_time`
    pub peaks_by_hour: BTreeMap<u32, usize>,
    /// Mean recovery minutes by local hour of `peak_time`
    pub mean_recovery_by_hour: BTreeMap<u32, Measure>,
}

/// Peaks detected for one team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamPeaks {
    pub team_id: String,
    /// Stress level a sample must exceed to open a peak
    pub threshold: f64,
    /// Stress level at or below which a team counts as recovered
    pub baseline: f64,
    pub events: Vec<PeakEvent>,
    pub stats: PeakStats,
}

/// Per-team peak and recovery detector
#[derive(Debug, Clone, Copy)]
pub struct PeakDetector {
    threshold: PeakThreshold,
    baseline: BaselineReturn,
    tz: Tz,
}

impl PeakDetector {
    pub fn new(threshold: PeakThreshold, baseline: BaselineReturn, tz: Tz) -> Self {
        Self {
            threshold,
            baseline,
            tz,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        Ok(Self::new(
            config.peak_threshold,
            config.baseline_return_threshold,
            config.tz()?,
        ))
    }

    /// Resolve the peak threshold and baseline-return level for a stress series
    pub fn levels(&self, team_id: &str, stress: &[f64]) -> Result<(f64, f64), AnalysisError> {
        let insufficient = |what: &str| {
            AnalysisError::InsufficientData(format!("{what} undefined for team {team_id}"))
        };
        let mean = stats::mean(stress);

        let threshold = match self.threshold {
            PeakThreshold::Absolute { value } => value,
            PeakThreshold::MeanPlusStd { k } => {
                let m = mean.value().ok_or_else(|| insufficient("stress mean"))?;
                let s = stats::sample_std(stress)
                    .value()
                    .ok_or_else(|| insufficient("stress standard deviation"))?;
                m + k * s
            }
        };
        let baseline = match self.baseline {
            BaselineReturn::Absolute { value } => value,
            BaselineReturn::SeriesMean => mean.value().ok_or_else(|| insufficient("stress mean"))?,
        };
        Ok((threshold, baseline))
    }

    /// Detect peaks in one team's series, which must be in chronological order
    pub fn detect(
        team_id: &str,
        series: &[&BiometricSample],
        threshold: f64,
        baseline: f64,
    ) -> Vec<PeakEvent> {
        let mut events = Vec::new();
        // Previous sample was at or below the threshold
        let mut armed = false;
        // (start index, index of the running maximum)
        let mut open: Option<(usize, usize)> = None;

        for (i, sample) in series.iter().enumerate() {
            let stress = sample.stress_level;
            match open {
                None if armed && stress > threshold => open = Some((i, i)),
                Some((start, peak)) if stress > threshold => {
                    if stress > series[peak].stress_level {
                        open = Some((start, i));
                    }
                }
                Some((start, peak)) => {
                    events.push(Self::close(team_id, series, start, peak, Some(i), baseline));
                    open = None;
                }
                None => {}
            }
            armed = stress <= threshold;
        }
        if let Some((start, peak)) = open {
            events.push(Self::close(team_id, series, start, peak, None, baseline));
        }
        events
    }

    fn close(
        team_id: &str,
        series: &[&BiometricSample],
        start: usize,
        peak: usize,
        end: Option<usize>,
        baseline: f64,
    ) -> PeakEvent {
        let peak_sample = series[peak];
        let recovery = series[peak + 1..]
            .iter()
            .find(|s| s.stress_level <= baseline)
            .map(|s| (s.timestamp - peak_sample.timestamp).num_seconds());

        PeakEvent {
            team_id: team_id.to_string(),
            start_time: series[start].timestamp,
            peak_time: peak_sample.timestamp,
            end_time: end.map(|e| series[e].timestamp),
            intensity: peak_sample.stress_level,
            recovery_duration_secs: recovery,
            recovered: recovery.is_some(),
        }
    }

    /// Summary statistics for a team's events over its observed series
    pub fn summarize(&self, series: &[&BiometricSample], events: &[PeakEvent]) -> PeakStats {
        let observed_hours = match (series.first(), series.last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_seconds() as f64 / 3600.0,
            _ => 0.0,
        };
        let recovered: Vec<&PeakEvent> = events.iter().filter(|e| e.recovered).collect();
        let intensities: Vec<f64> = events.iter().map(|e| e.intensity).collect();
        let recovery_minutes: Vec<f64> = recovered.iter().filter_map(|e| e.recovery_minutes()).collect();

        let mut peaks_by_hour: BTreeMap<u32, usize> = BTreeMap::new();
        let mut recovery_by_hour: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
        for event in events {
            let hour = event.peak_time.with_timezone(&self.tz).hour();
            *peaks_by_hour.entry(hour).or_default() += 1;
            let minutes = recovery_by_hour.entry(hour).or_default();
            minutes.extend(event.recovery_minutes());
        }

        PeakStats {
            peak_count: events.len(),
            recovered_count: recovered.len(),
            recovery_success_rate: Measure::ratio(recovered.len() as f64, events.len() as f64),
            observed_hours,
            peak_frequency_per_hour: Measure::ratio(events.len() as f64, observed_hours),
            mean_intensity: stats::mean(&intensities),
            recovery_minutes: Distribution::describe(&recovery_minutes),
            peaks_by_hour,
            mean_recovery_by_hour: recovery_by_hour
                .into_iter()
                .map(|(hour, minutes)| (hour, stats::mean(&minutes)))
                .collect(),
        }
    }

    /// Detect and summarize peaks for a single team
    pub fn analyze_team(
        &self,
        team_id: &str,
        series: &[&BiometricSample],
    ) -> Result<TeamPeaks, AnalysisError> {
        if series.is_empty() {
            return Err(AnalysisError::NoValidInput(format!(
                "no stress samples for team {team_id}"
            )));
        }
        let stress: Vec<f64> = series.iter().map(|s| s.stress_level).collect();
        let (threshold, baseline) = self.levels(team_id, &stress)?;
        let events = Self::detect(team_id, series, threshold, baseline);
        let stats = self.summarize(series, &events);

        Ok(TeamPeaks {
            team_id: team_id.to_string(),
            threshold,
            baseline,
            events,
            stats,
        })
    }

    /// Detect peaks for every team in `samples`
    pub fn analyze(&self, samples: &[BiometricSample]) -> (Vec<TeamPeaks>, Vec<Issue>) {
        let mut teams = Vec::new();
        let mut issues = Vec::new();

        for (team_id, series) in by_team(samples) {
            match self.analyze_team(team_id, &series) {
                Ok(peaks) => {
                    debug!(
                        team = team_id,
                        threshold = peaks.threshold,
                        peaks = peaks.events.len(),
                        recovered = peaks.stats.recovered_count,
                        "detected stress peaks"
                    );
                    teams.push(peaks);
                }
                Err(err) => {
                    warn!(team = team_id, error = %err, "peak detection failed");
                    issues.extend(Issue::from_error(team_id, &err));
                }
            }
        }
        (teams, issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActivityBreakdown, UndefinedReason};
    use chrono::{Duration, TimeZone, Utc};

    fn series(stress: &[f64]) -> Vec<BiometricSample> {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        stress
            .iter()
            .enumerate()
            .map(|(i, &s)| BiometricSample {
                timestamp: start + Duration::minutes(5 * i as i64),
                team_id: "NOPS".to_string(),
                stress_level: s,
                activity: ActivityBreakdown::new(50.0, 30.0, 15.0, 5.0),
            })
            .collect()
    }

    fn refs(samples: &[BiometricSample]) -> Vec<&BiometricSample> {
        samples.iter().collect()
    }

    fn absolute(threshold: f64, baseline: f64) -> PeakDetector {
        PeakDetector::new(
            PeakThreshold::Absolute { value: threshold },
            BaselineReturn::Absolute { value: baseline },
            chrono_tz::UTC,
        )
    }

    #[test]
    fn test_single_peak_with_recovery() {
        let samples = series(&[40.0, 50.0, 75.0, 90.0, 80.0, 60.0, 45.0, 30.0]);
        let events = PeakDetector::detect("NOPS", &refs(&samples), 70.0, 40.0);

        assert_eq!(events.len(), 1);
        let peak = &events[0];
        assert_eq!(peak.start_time, samples[2].timestamp);
        assert_eq!(peak.peak_time, samples[3].timestamp);
        assert_eq!(peak.end_time, Some(samples[5].timestamp));
        assert_eq!(peak.intensity, 90.0);
        assert!(peak.recovered);
        // 90 at index 3, first <= 40 at index 7
        assert_eq!(peak.recovery_duration_secs, Some(4 * 5 * 60));
    }

    #[test]
    fn test_recovery_is_first_crossing() {
        let samples = series(&[20.0, 80.0, 50.0, 35.0, 60.0, 30.0]);
        let events = PeakDetector::detect("NOPS", &refs(&samples), 70.0, 40.0);
        let peak = &events[0];
        let recovered_at = peak.peak_time + Duration::seconds(peak.recovery_duration_secs.unwrap());

        let after_peak: Vec<_> = samples
            .iter()
            .filter(|s| s.timestamp > peak.peak_time && s.timestamp <= recovered_at)
            .collect();
        assert!(after_peak.last().unwrap().stress_level <= 40.0);
        assert!(after_peak[..after_peak.len() - 1]
            .iter()
            .all(|s| s.stress_level > 40.0));
        assert_eq!(recovered_at, samples[3].timestamp);
    }

    #[test]
    fn test_unrecovered_peak_at_end_of_series() {
        let samples = series(&[30.0, 85.0, 95.0, 90.0]);
        let events = PeakDetector::detect("NOPS", &refs(&samples), 70.0, 40.0);

        assert_eq!(events.len(), 1);
        assert!(!events[0].recovered);
        assert_eq!(events[0].recovery_duration_secs, None);
        assert_eq!(events[0].end_time, None);
        assert!(events[0].peak_time >= events[0].start_time);
        assert!(events[0].peak_time <= samples.last().unwrap().timestamp);
    }

    #[test]
    fn test_series_starting_above_threshold_needs_a_dip() {
        let samples = series(&[90.0, 95.0, 60.0, 85.0, 50.0]);
        let events = PeakDetector::detect("NOPS", &refs(&samples), 70.0, 40.0);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start_time, samples[3].timestamp);
    }

    #[test]
    fn test_stats() {
        // Two peaks, one recovers, one never does
        let samples = series(&[30.0, 80.0, 35.0, 30.0, 90.0, 60.0, 55.0]);
        let detector = absolute(70.0, 40.0);
        let team = detector.analyze_team("NOPS", &refs(&samples)).unwrap();

        assert_eq!(team.stats.peak_count, 2);
        assert_eq!(team.stats.recovered_count, 1);
        assert!((team.stats.recovery_success_rate.value().unwrap() - 0.5).abs() < 1e-9);
        assert!((team.stats.mean_intensity.value().unwrap() - 85.0).abs() < 1e-9);
        // 6 intervals of 5 minutes = 0.5 h
        assert!((team.stats.observed_hours - 0.5).abs() < 1e-9);
        assert!((team.stats.peak_frequency_per_hour.value().unwrap() - 4.0).abs() < 1e-9);
        assert_eq!(team.stats.recovery_minutes.count, 1);
        assert_eq!(team.stats.peaks_by_hour.get(&9), Some(&2));
        assert!((team.stats.mean_recovery_by_hour[&9].value().unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_peaks_gives_undefined_rate() {
        let samples = series(&[30.0, 35.0, 40.0]);
        let team = absolute(70.0, 40.0)
            .analyze_team("NOPS", &refs(&samples))
            .unwrap();
        assert!(team.events.is_empty());
        assert_eq!(
            team.stats.recovery_success_rate,
            Measure::undefined(UndefinedReason::ZeroDenominator)
        );
    }

    #[test]
    fn test_mean_plus_std_threshold() {
        let samples = series(&[40.0, 50.0, 60.0]);
        let detector = PeakDetector::new(
            PeakThreshold::MeanPlusStd { k: 1.0 },
            BaselineReturn::SeriesMean,
            chrono_tz::UTC,
        );
        let (threshold, baseline) = detector.levels("NOPS", &[40.0, 50.0, 60.0]).unwrap();
        assert!((threshold - 60.0).abs() < 1e-9);
        assert!((baseline - 50.0).abs() < 1e-9);

        let one = series(&[40.0]);
        assert!(matches!(
            detector.analyze_team("NOPS", &refs(&one)),
            Err(AnalysisError::InsufficientData(_))
        ));
        assert!(detector.analyze_team("NOPS", &refs(&samples)).is_ok());
    }

    #[test]
    fn test_teams_analyzed_independently() {
        let mut samples = series(&[30.0, 80.0, 30.0]);
        let mut other = series(&[50.0]);
        other[0].team_id = "LOGISTICS".to_string();
        samples.extend(other);

        let detector = PeakDetector::new(
            PeakThreshold::MeanPlusStd { k: 0.5 },
            BaselineReturn::SeriesMean,
            chrono_tz::UTC,
        );
        let (teams, issues) = detector.analyze(&samples);
        assert_eq!(teams.len(), 1);
        assert_eq!(teams[0].team_id, "NOPS");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].subject, "LOGISTICS");
    }
}
