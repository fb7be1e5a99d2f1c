//! Time-of-day binning
//!
//! Maps timestamps to fixed-width local time-of-day bins inside the working
//! window. Samples outside the window (or on weekends, when configured) have
//! no bin.

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::types::TimeBin;
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use chrono_tz::Tz;

/// Assigns samples to time-of-day bins
#[derive(Debug, Clone, Copy)]
pub struct TimeBinner {
    width_minutes: u32,
    start_minute: u32,
    end_minute: u32,
    weekdays_only: bool,
    tz: Tz,
}

impl TimeBinner {
    pub fn new(
        width_minutes: u32,
        start_minute: u32,
        end_minute: u32,
        weekdays_only: bool,
        tz: Tz,
    ) -> Self {
        Self {
            width_minutes: width_minutes.max(1),
            start_minute,
            end_minute,
            weekdays_only,
            tz,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        Ok(Self::new(
            config.time_bin_width_minutes,
            config.working_hours.start_minute(),
            config.working_hours.end_minute(),
            config.weekdays_only,
            config.tz()?,
        ))
    }

    /// Every bin of the working window, in order
    ///
    /// The last bin is truncated at the window end when the width does not divide it.
    pub fn bins(&self) -> Vec<TimeBin> {
        (self.start_minute..self.end_minute)
            .step_by(self.width_minutes as usize)
            .map(|start| TimeBin {
                start_minute: start,
                width_minutes: self.width_minutes.min(self.end_minute - start),
            })
            .collect()
    }

    /// Bin containing `timestamp`, if it falls inside the working window
    pub fn bin_of(&self, timestamp: &DateTime<Utc>) -> Option<TimeBin> {
        let local = timestamp.with_timezone(&self.tz);
        if self.weekdays_only && matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return None;
        }
        let minute = local.hour() * 60 + local.minute();
        if minute < self.start_minute || minute >= self.end_minute {
            return None;
        }
        let start = self.start_minute
            + (minute - self.start_minute) / self.width_minutes * self.width_minutes;
        Some(TimeBin {
            start_minute: start,
            width_minutes: self.width_minutes.min(self.end_minute - start),
        })
    }

    /// Local calendar date of `timestamp`
    pub fn local_date(&self, timestamp: &DateTime<Utc>) -> NaiveDate {
        timestamp.with_timezone(&self.tz).date_naive()
    }
}
