//! Time-of-day aggregation
//!
//! Builds mean/std curves of stress and activity per team, time bin and
//! productivity label, and the high-minus-normal difference curve for each
//! metric. Every bin of the working window appears in every curve; bins without
//! samples carry undefined markers instead of zeros.

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::stats::SeriesStats;
use crate::timebin::TimeBinner;
use crate::types::{
    ActivityLevel, BiometricSample, Measure, ProductivityLabel, TaggedSample, TimeBin,
    UndefinedReason,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Per-sample quantity that can be aggregated
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Stress,
    Sedentary,
    Light,
    Moderate,
    Intense,
    ActivePct,
    Effort,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::Stress,
        Metric::Sedentary,
        Metric::Light,
        Metric::Moderate,
        Metric::Intense,
        Metric::ActivePct,
        Metric::Effort,
    ];

    /// Value of this metric for one sample
    ///
    /// `ActivePct` and `Effort` are `None` for an all-zero activity breakdown;
    /// such samples are left out of those two aggregates only.
    pub fn value_of(&self, sample: &BiometricSample) -> Option<f64> {
        match self {
            Metric::Stress => Some(sample.stress_level),
            Metric::Sedentary => Some(sample.activity.get(ActivityLevel::Sedentary)),
            Metric::Light => Some(sample.activity.get(ActivityLevel::Light)),
            Metric::Moderate => Some(sample.activity.get(ActivityLevel::Moderate)),
            Metric::Intense => Some(sample.activity.get(ActivityLevel::Intense)),
            Metric::ActivePct => sample.activity.active_pct().value(),
            Metric::Effort => sample.activity.effort_score().value(),
        }
    }
}

/// Aggregates of one (team, label, bin) partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinProfile {
    pub bin: TimeBin,
    pub sample_count: usize,
    pub stress: SeriesStats,
    pub sedentary: SeriesStats,
    pub light: SeriesStats,
    pub moderate: SeriesStats,
    pub intense: SeriesStats,
    pub active_pct: SeriesStats,
    pub effort: SeriesStats,
}

impl BinProfile {
    fn from_samples(bin: TimeBin, samples: &[&BiometricSample]) -> Self {
        let stats = |metric: Metric| {
            let values: Vec<f64> = samples.iter().filter_map(|s| metric.value_of(s)).collect();
            SeriesStats::of(&values)
        };
        Self {
            bin,
            sample_count: samples.len(),
            stress: stats(Metric::Stress),
            sedentary: stats(Metric::Sedentary),
            light: stats(Metric::Light),
            moderate: stats(Metric::Moderate),
            intense: stats(Metric::Intense),
            active_pct: stats(Metric::ActivePct),
            effort: stats(Metric::Effort),
        }
    }

    pub fn get(&self, metric: Metric) -> &SeriesStats {
        match metric {
            Metric::Stress => &self.stress,
            Metric::Sedentary => &self.sedentary,
            Metric::Light => &self.light,
            Metric::Moderate => &self.moderate,
            Metric::Intense => &self.intense,
            Metric::ActivePct => &self.active_pct,
            Metric::Effort => &self.effort,
        }
    }
}

/// Curve of one team under one label, one point per bin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileCurve {
    pub team_id: String,
    pub label: ProductivityLabel,
    pub points: Vec<BinProfile>,
}

/// High-minus-normal difference at one bin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferencePoint {
    pub bin: TimeBin,
    pub high_mean: Measure,
    pub normal_mean: Measure,
    /// `high_mean - normal_mean`, undefined when either side has no samples
    pub diff: Measure,
}

/// Difference curve of one team for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferenceCurve {
    pub team_id: String,
    pub metric: Metric,
    pub points: Vec<DifferencePoint>,
}

/// Output of the time-of-day aggregator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeOfDayProfile {
    pub curves: Vec<ProfileCurve>,
    pub differences: Vec<DifferenceCurve>,
    /// Tagged samples that fell outside the working window
    pub outside_window: usize,
}

impl TimeOfDayProfile {
    pub fn curve(&self, team_id: &str, label: ProductivityLabel) -> Option<&ProfileCurve> {
        self.curves
            .iter()
            .find(|c| c.team_id == team_id && c.label == label)
    }

    pub fn difference(&self, team_id: &str, metric: Metric) -> Option<&DifferenceCurve> {
        self.differences
            .iter()
            .find(|d| d.team_id == team_id && d.metric == metric)
    }
}

/// Aggregates tagged samples by team, label and time bin
pub struct TimeOfDayAggregator {
    binner: TimeBinner,
}

impl TimeOfDayAggregator {
    pub fn new(binner: TimeBinner) -> Self {
        Self { binner }
    }

    pub fn from_config(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        Ok(Self::new(TimeBinner::from_config(config)?))
    }

    pub fn aggregate(&self, tagged: &[TaggedSample]) -> TimeOfDayProfile {
        let mut partitions: BTreeMap<(&str, ProductivityLabel, TimeBin), Vec<&BiometricSample>> =
            BTreeMap::new();
        let mut teams: BTreeSet<&str> = BTreeSet::new();
        let mut outside_window = 0;

        for t in tagged {
            teams.insert(t.sample.team_id.as_str());
            match self.binner.bin_of(&t.sample.timestamp) {
                Some(bin) => partitions
                    .entry((t.sample.team_id.as_str(), t.label, bin))
                    .or_default()
                    .push(&t.sample),
                None => outside_window += 1,
            }
        }

        let bins = self.binner.bins();
        let mut profile = TimeOfDayProfile {
            outside_window,
            ..Default::default()
        };

        for team in teams {
            for label in ProductivityLabel::ALL {
                let points = bins
                    .iter()
                    .map(|&bin| {
                        let samples = partitions
                            .get(&(team, label, bin))
                            .map(Vec::as_slice)
                            .unwrap_or(&[]);
                        BinProfile::from_samples(bin, samples)
                    })
                    .collect();
                profile.curves.push(ProfileCurve {
                    team_id: team.to_string(),
                    label,
                    points,
                });
            }

            for metric in Metric::ALL {
                let curve = difference_curve(&profile, team, metric);
                profile.differences.push(curve);
            }
        }

        debug!(
            curves = profile.curves.len(),
            outside_window, "aggregated time-of-day profile"
        );
        profile
    }
}

fn difference_curve(profile: &TimeOfDayProfile, team: &str, metric: Metric) -> DifferenceCurve {
    let (high, normal) = match (
        profile.curve(team, ProductivityLabel::High),
        profile.curve(team, ProductivityLabel::Normal),
    ) {
        (Some(h), Some(n)) => (h, n),
        _ => {
            return DifferenceCurve {
                team_id: team.to_string(),
                metric,
                points: Vec::new(),
            }
        }
    };

    let points = high
        .points
        .iter()
        .zip(&normal.points)
        .map(|(h, n)| {
            let high_mean = h.get(metric).mean;
            let normal_mean = n.get(metric).mean;
            let diff = match (high_mean.value(), normal_mean.value()) {
                (Some(hm), Some(nm)) => Measure::defined(hm - nm),
                _ => Measure::undefined(UndefinedReason::NoSamples),
            };
            DifferencePoint {
                bin: h.bin,
                high_mean,
                normal_mean,
                diff,
            }
        })
        .collect();

    DifferenceCurve {
        team_id: team.to_string(),
        metric,
        points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActivityBreakdown;
    use chrono::{TimeZone, Utc};

    fn tagged(day: u32, hour: u32, stress: f64, label: ProductivityLabel) -> TaggedSample {
        TaggedSample {
            sample: BiometricSample {
                // March 2024, weekdays 4-8 and 11-15
                timestamp: Utc.with_ymd_and_hms(2024, 3, day, hour, 10, 0).unwrap(),
                team_id: "DALMUIR".to_string(),
                stress_level: stress,
                activity: ActivityBreakdown::new(60.0, 20.0, 15.0, 5.0),
            },
            site_id: "DALMUIR".to_string(),
            label,
        }
    }

    fn aggregator() -> TimeOfDayAggregator {
        TimeOfDayAggregator::new(TimeBinner::new(60, 8 * 60, 17 * 60, true, chrono_tz::UTC))
    }

    #[test]
    fn test_difference_is_high_minus_normal() {
        let samples = vec![
            tagged(4, 9, 60.0, ProductivityLabel::High),
            tagged(5, 9, 70.0, ProductivityLabel::High),
            tagged(6, 9, 40.0, ProductivityLabel::Normal),
            tagged(7, 9, 50.0, ProductivityLabel::Normal),
        ];
        let profile = aggregator().aggregate(&samples);

        let diff = profile.difference("DALMUIR", Metric::Stress).unwrap();
        let nine = diff.points.iter().find(|p| p.bin.label() == "09:00").unwrap();
        assert_eq!(nine.high_mean, Measure::defined(65.0));
        assert_eq!(nine.normal_mean, Measure::defined(45.0));
        assert_eq!(nine.diff, Measure::defined(20.0));
    }

    #[test]
    fn test_one_sided_bin_is_undefined() {
        let samples = vec![
            tagged(4, 9, 60.0, ProductivityLabel::High),
            tagged(6, 10, 40.0, ProductivityLabel::Normal),
        ];
        let profile = aggregator().aggregate(&samples);
        let diff = profile.difference("DALMUIR", Metric::Stress).unwrap();

        assert_eq!(diff.points.len(), 9);
        for point in &diff.points {
            assert_eq!(point.diff, Measure::undefined(UndefinedReason::NoSamples));
        }
    }

    #[test]
    fn test_curves_cover_every_bin() {
        let samples = vec![tagged(4, 9, 60.0, ProductivityLabel::High)];
        let profile = aggregator().aggregate(&samples);

        let high = profile.curve("DALMUIR", ProductivityLabel::High).unwrap();
        assert_eq!(high.points.len(), 9);
        let eight = &high.points[0];
        assert_eq!(eight.sample_count, 0);
        assert_eq!(eight.stress.mean, Measure::undefined(UndefinedReason::NoSamples));

        let nine = &high.points[1];
        assert_eq!(nine.sample_count, 1);
        assert_eq!(nine.stress.mean, Measure::defined(60.0));
        assert_eq!(
            nine.stress.std,
            Measure::undefined(UndefinedReason::InsufficientSamples)
        );
        assert!((nine.active_pct.mean.value().unwrap() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_breakdown_only_excluded_from_activity_share() {
        let mut zero = tagged(4, 9, 80.0, ProductivityLabel::High);
        zero.sample.activity = ActivityBreakdown::default();
        let samples = vec![zero, tagged(5, 9, 60.0, ProductivityLabel::High)];

        let profile = aggregator().aggregate(&samples);
        let nine = &profile.curve("DALMUIR", ProductivityLabel::High).unwrap().points[1];
        assert_eq!(nine.stress.count, 2);
        assert_eq!(nine.stress.mean, Measure::defined(70.0));
        assert_eq!(nine.active_pct.count, 1);
        assert!((nine.active_pct.mean.value().unwrap() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_sample_std_in_band() {
        let samples = vec![
            tagged(4, 11, 40.0, ProductivityLabel::Normal),
            tagged(5, 11, 50.0, ProductivityLabel::Normal),
            tagged(6, 11, 60.0, ProductivityLabel::Normal),
        ];
        let profile = aggregator().aggregate(&samples);
        let eleven = &profile.curve("DALMUIR", ProductivityLabel::Normal).unwrap().points[3];
        assert!((eleven.stress.std.value().unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_teams_are_not_mixed() {
        let mut other = tagged(4, 9, 10.0, ProductivityLabel::High);
        other.sample.team_id = "KB3".to_string();
        let samples = vec![tagged(4, 9, 90.0, ProductivityLabel::High), other];

        let profile = aggregator().aggregate(&samples);
        let dalmuir = profile.curve("DALMUIR", ProductivityLabel::High).unwrap();
        let kb3 = profile.curve("KB3", ProductivityLabel::High).unwrap();
        assert_eq!(dalmuir.points[1].stress.mean, Measure::defined(90.0));
        assert_eq!(kb3.points[1].stress.mean, Measure::defined(10.0));
    }

    #[test]
    fn test_outside_window_counted() {
        let samples = vec![tagged(4, 6, 60.0, ProductivityLabel::High)];
        let profile = aggregator().aggregate(&samples);
        assert_eq!(profile.outside_window, 1);
    }
}
