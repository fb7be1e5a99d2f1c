//! Analysis configuration
//!
//! All tunable parameters of the pipeline live in one [`AnalysisConfig`] that is
//! passed through every stage. It can be loaded from TOML; missing keys fall
//! back to the documented defaults.

use crate::error::AnalysisError;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default percentile for the high-productivity threshold
pub const DEFAULT_THRESHOLD_PERCENTILE: f64 = 75.0;

/// Default time-of-day bin width in minutes
pub const DEFAULT_TIME_BIN_WIDTH_MINUTES: u32 = 60;

/// Default trailing window for rolling efficiency
pub const DEFAULT_ROLLING_WINDOW_MONTHS: usize = 3;

/// Default timezone used to derive local time, days and months
pub const DEFAULT_TIMEZONE: &str = "Europe/London";

/// Working-day window used for time-of-day binning, `[start_hour, end_hour)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkingHours {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            start_hour: 8,
            end_hour: 17,
        }
    }
}

impl WorkingHours {
    pub fn start_minute(&self) -> u32 {
        self.start_hour * 60
    }

    pub fn end_minute(&self) -> u32 {
        self.end_hour * 60
    }
}

/// How the stress threshold that opens a peak is chosen
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum PeakThreshold {
    /// Fixed stress level
    Absolute { value: f64 },
    /// Team series mean plus `k` sample standard deviations
    MeanPlusStd { k: f64 },
}

impl Default for PeakThreshold {
    fn default() -> Self {
        PeakThreshold::MeanPlusStd { k: 1.0 }
    }
}

/// How the stress level that counts as recovered is chosen
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum BaselineReturn {
    /// Fixed stress level
    Absolute { value: f64 },
    /// Team series mean
    SeriesMean,
}

impl Default for BaselineReturn {
    fn default() -> Self {
        BaselineReturn::SeriesMean
    }
}

/// Configuration for the whole analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Percentile of monthly receipts above which a month is `high`, in (0, 100)
    pub threshold_percentile: f64,
    /// Width of a time-of-day bin
    pub time_bin_width_minutes: u32,
    pub working_hours: WorkingHours,
    /// Restrict time-of-day bins to Monday-Friday
    pub weekdays_only: bool,
    /// IANA timezone for local time
    pub timezone: String,
    pub peak_threshold: PeakThreshold,
    pub baseline_return_threshold: BaselineReturn,
    /// Minimum span of a break
    pub break_min_duration_minutes: u32,
    /// Sedentary percentage at or above which a sample counts as resting
    pub break_sedentary_threshold: f64,
    /// Samples averaged on each side of a break for before/after stress
    pub break_context_samples: usize,
    /// Qualifying samples further apart than this start a new break
    pub break_max_gap_minutes: u32,
    /// Bucket width of the break duration histogram
    pub break_histogram_bin_minutes: u32,
    /// Trailing window of the rolling efficiency ratio
    pub rolling_window_months: usize,
    /// Trailing window of month-over-month changes for volatility, `None` = all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volatility_window_months: Option<usize>,
    /// Team to site mapping
    pub team_sites: BTreeMap<String, String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            threshold_percentile: DEFAULT_THRESHOLD_PERCENTILE,
            time_bin_width_minutes: DEFAULT_TIME_BIN_WIDTH_MINUTES,
            working_hours: WorkingHours::default(),
            weekdays_only: true,
            timezone: DEFAULT_TIMEZONE.to_string(),
            peak_threshold: PeakThreshold::default(),
            baseline_return_threshold: BaselineReturn::default(),
            break_min_duration_minutes: 10,
            break_sedentary_threshold: 80.0,
            break_context_samples: 1,
            break_max_gap_minutes: 30,
            break_histogram_bin_minutes: 10,
            rolling_window_months: DEFAULT_ROLLING_WINDOW_MONTHS,
            volatility_window_months: None,
            team_sites: BTreeMap::new(),
        }
    }
}

impl AnalysisConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(toml_str: &str) -> Result<Self, AnalysisError> {
        let config: AnalysisConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AnalysisError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Serialize configuration to TOML
    pub fn to_toml_string(&self) -> Result<String, AnalysisError> {
        toml::to_string_pretty(self).map_err(|e| AnalysisError::InvalidConfig(e.to_string()))
    }

    /// Add a team to site mapping
    pub fn with_team_site(mut self, team_id: &str, site_id: &str) -> Self {
        self.team_sites
            .insert(team_id.to_string(), site_id.to_string());
        self
    }

    /// Parsed timezone
    pub fn tz(&self) -> Result<Tz, AnalysisError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| AnalysisError::InvalidTimezone(self.timezone.clone()))
    }

    /// Check ranges and cross-field constraints
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let invalid = |msg: String| Err(AnalysisError::InvalidConfig(msg));

        if !(self.threshold_percentile > 0.0 && self.threshold_percentile < 100.0) {
            return invalid(format!(
                "threshold_percentile must be in (0, 100), got {}",
                self.threshold_percentile
            ));
        }
        if self.time_bin_width_minutes == 0 {
            return invalid("time_bin_width_minutes must be positive".to_string());
        }
        if self.working_hours.start_hour >= self.working_hours.end_hour
            || self.working_hours.end_hour > 24
        {
            return invalid(format!(
                "working_hours must satisfy start < end <= 24, got {}..{}",
                self.working_hours.start_hour, self.working_hours.end_hour
            ));
        }
        if !(0.0..=100.0).contains(&self.break_sedentary_threshold) {
            return invalid(format!(
                "break_sedentary_threshold must be in [0, 100], got {}",
                self.break_sedentary_threshold
            ));
        }
        if self.break_histogram_bin_minutes == 0 {
            return invalid("break_histogram_bin_minutes must be positive".to_string());
        }
        if self.rolling_window_months == 0 {
            return invalid("rolling_window_months must be positive".to_string());
        }
        if self.volatility_window_months == Some(0) {
            return invalid("volatility_window_months must be positive when set".to_string());
        }
        match self.peak_threshold {
            PeakThreshold::Absolute { value } if !value.is_finite() => {
                return invalid("peak_threshold value must be finite".to_string());
            }
            PeakThreshold::MeanPlusStd { k } if !k.is_finite() => {
                return invalid("peak_threshold k must be finite".to_string());
            }
            _ => {}
        }
        if let BaselineReturn::Absolute { value } = self.baseline_return_threshold {
            if !value.is_finite() {
                return invalid("baseline_return_threshold value must be finite".to_string());
            }
        }
        self.tz()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.threshold_percentile, 75.0);
        assert_eq!(config.time_bin_width_minutes, 60);
        assert_eq!(config.rolling_window_months, 3);
        assert_eq!(config.working_hours, WorkingHours { start_hour: 8, end_hour: 17 });
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = AnalysisConfig::from_toml_str(
            r#"
            threshold_percentile = 90.0
            timezone = "UTC"

            [peak_threshold]
            policy = "absolute"
            value = 70.0

            [team_sites]
            DALMUIR = "DALMUIR"
            NOPS = "KB3"
            "#,
        )
        .unwrap();

        assert_eq!(config.threshold_percentile, 90.0);
        assert_eq!(config.peak_threshold, PeakThreshold::Absolute { value: 70.0 });
        assert_eq!(config.baseline_return_threshold, BaselineReturn::SeriesMean);
        assert_eq!(config.team_sites.get("NOPS").map(String::as_str), Some("KB3"));
        assert_eq!(config.break_min_duration_minutes, 10);
    }

    #[test]
    fn test_rejects_out_of_range_percentile() {
        for p in [0.0, 100.0, -5.0, 150.0] {
            let config = AnalysisConfig {
                threshold_percentile: p,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(AnalysisError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_rejects_unknown_timezone() {
        let config = AnalysisConfig {
            timezone: "Mars/Olympus_Mons".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AnalysisError::InvalidTimezone(_))));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AnalysisConfig::default().with_team_site("KILMALID", "KILMALID");
        let toml_str = config.to_toml_string().unwrap();
        let loaded = AnalysisConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(config, loaded);
    }
}
