//! Core types for the Worksignal pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: validated input records, month classifications, tagged samples,
//! time bins, detected events and the `Measure` marker used for every value
//! that can be undefined.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Calendar month (year + month)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    /// Month of year, 1-12
    pub month: u32,
}

impl YearMonth {
    /// Create a month, rejecting month numbers outside 1-12
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// Month containing the given date or datetime
    pub fn of<D: Datelike>(date: &D) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Activity intensity category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    Intense,
}

/// Share of time spent at each activity level (percentages, nominally summing to 100)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ActivityBreakdown {
    pub sedentary: f64,
    pub light: f64,
    pub moderate: f64,
    pub intense: f64,
}

impl ActivityBreakdown {
    pub fn new(sedentary: f64, light: f64, moderate: f64, intense: f64) -> Self {
        Self {
            sedentary,
            light,
            moderate,
            intense,
        }
    }

    pub fn get(&self, level: ActivityLevel) -> f64 {
        match level {
            ActivityLevel::Sedentary => self.sedentary,
            ActivityLevel::Light => self.light,
            ActivityLevel::Moderate => self.moderate,
            ActivityLevel::Intense => self.intense,
        }
    }

    pub fn total(&self) -> f64 {
        self.sedentary + self.light + self.moderate + self.intense
    }

    /// Percentage of non-sedentary activity
    ///
    /// Formula: `(light + moderate + intense) / total * 100`
    pub fn active_pct(&self) -> Measure {
        let active = self.light + self.moderate + self.intense;
        Measure::ratio(active, self.total()).map(|r| r * 100.0)
    }

    /// Weighted effort score on a 0-100 scale
    ///
    /// Formula:
    /// ```text
    /// score = 3 * intense% + 2 * moderate% + light% - 2 * sedentary%
    /// effort = (score + 200) / 500 * 100
    /// ```
    /// 100% intense maps to 100, 100% sedentary maps to 0.
    pub fn effort_score(&self) -> Measure {
        let total = self.total();
        if total <= 0.0 {
            return Measure::undefined(UndefinedReason::ZeroDenominator);
        }
        let pct = |v: f64| v / total * 100.0;
        let score = 3.0 * pct(self.intense) + 2.0 * pct(self.moderate) + pct(self.light)
            - 2.0 * pct(self.sedentary);
        Measure::defined(((score + 200.0) / 500.0 * 100.0).clamp(0.0, 100.0))
    }
}

/// Validated biometric sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiometricSample {
    pub timestamp: DateTime<Utc>,
    pub team_id: String,
    /// Stress score (0-100)
    pub stress_level: f64,
    pub activity: ActivityBreakdown,
}

/// Validated monthly productivity record for one site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductivityRecord {
    pub site_id: String,
    pub month: YearMonth,
    pub receipts: f64,
    pub dispatches: f64,
}

/// Productivity classification of a site-month
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductivityLabel {
    High,
    Normal,
}

impl ProductivityLabel {
    pub const ALL: [ProductivityLabel; 2] = [ProductivityLabel::High, ProductivityLabel::Normal];
}

/// Label assigned to one (site, month)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthClassification {
    pub site_id: String,
    pub month: YearMonth,
    pub label: ProductivityLabel,
}

/// Biometric sample joined with the productivity label of its site-month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedSample {
    pub sample: BiometricSample,
    pub site_id: String,
    pub label: ProductivityLabel,
}

/// Why a value could not be computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedReason {
    /// The group contains no samples
    NoSamples,
    /// Too few samples for the statistic (e.g. std of one value)
    InsufficientSamples,
    /// Denominator of a ratio is zero
    ZeroDenominator,
    /// First element of a series has no predecessor
    NoPriorPeriod,
    /// Trailing window is not yet full
    IncompleteWindow,
    /// Coefficient of variation over a zero mean
    ZeroMean,
}

/// A value that is either defined or explicitly undefined
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Measure {
    Defined { value: f64 },
    Undefined { reason: UndefinedReason },
}

impl Measure {
    pub fn defined(value: f64) -> Self {
        Measure::Defined { value }
    }

    pub fn undefined(reason: UndefinedReason) -> Self {
        Measure::Undefined { reason }
    }

    /// `numerator / denominator`, undefined when the denominator is zero
    pub fn ratio(numerator: f64, denominator: f64) -> Self {
        if denominator == 0.0 {
            Measure::undefined(UndefinedReason::ZeroDenominator)
        } else {
            Measure::defined(numerator / denominator)
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Measure::Defined { value } => Some(*value),
            Measure::Undefined { .. } => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Measure::Defined { .. })
    }

    /// Transform a defined value, keeping the reason of an undefined one
    pub fn map(self, f: impl FnOnce(f64) -> f64) -> Self {
        match self {
            Measure::Defined { value } => Measure::defined(f(value)),
            undefined => undefined,
        }
    }
}

/// Fixed time-of-day bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeBin {
    /// Minutes after local midnight at which the bin starts
    pub start_minute: u32,
    pub width_minutes: u32,
}

impl TimeBin {
    /// Bin start formatted as `HH:MM`
    pub fn label(&self) -> String {
        format!("{:02}:{:02}", self.start_minute / 60, self.start_minute % 60)
    }
}

impl fmt::Display for TimeBin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// A stress excursion above the peak threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakEvent {
    pub team_id: String,
    /// First sample above the threshold
    pub start_time: DateTime<Utc>,
    /// Time of the local maximum
    pub peak_time: DateTime<Utc>,
    /// First sample back at or below the threshold, if the series got there
    pub end_time: Option<DateTime<Utc>>,
    /// Stress level at the local maximum
    pub intensity: f64,
    /// Seconds from `peak_time` to the first return to baseline
    pub recovery_duration_secs: Option<i64>,
    pub recovered: bool,
}

impl PeakEvent {
    pub fn recovery_minutes(&self) -> Option<f64> {
        self.recovery_duration_secs.map(|s| s as f64 / 60.0)
    }
}

/// A sustained low-activity interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakEvent {
    pub team_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_secs: i64,
    pub sample_count: usize,
    pub stress_before: f64,
    pub stress_after: f64,
    /// `stress_before - stress_after`
    pub stress_reduction: f64,
}

impl BreakEvent {
    pub fn duration_minutes(&self) -> f64 {
        self.duration_secs as f64 / 60.0
    }
}

/// Group samples by team, each team's series in chronological order
pub fn by_team(samples: &[BiometricSample]) -> BTreeMap<&str, Vec<&BiometricSample>> {
    let mut teams: BTreeMap<&str, Vec<&BiometricSample>> = BTreeMap::new();
    for sample in samples {
        teams.entry(sample.team_id.as_str()).or_default().push(sample);
    }
    for series in teams.values_mut() {
        series.sort_by_key(|s| s.timestamp);
    }
    teams
}
