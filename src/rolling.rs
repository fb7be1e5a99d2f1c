//! Rolling efficiency and volatility
//!
//! Per-site monthly series derived from productivity records:
//! - month-over-month % change of receipts and dispatches
//! - year-to-date cumulative sums, reset at each new year
//! - dispatch/receipt efficiency ratio and its trailing rolling mean
//! - volatility (sample std) of month-over-month changes
//!
//! Windows are positional over the site's records ordered by month.

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Issue};
use crate::stats;
use crate::types::{Measure, ProductivityRecord, UndefinedReason, YearMonth};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Derived metrics for one site-month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyMetrics {
    pub month: YearMonth,
    pub receipts: f64,
    pub dispatches: f64,
    pub receipts_mom_pct: Measure,
    pub dispatches_mom_pct: Measure,
    pub receipts_ytd: f64,
    pub dispatches_ytd: f64,
    /// `dispatches / receipts`
    pub efficiency_ratio: Measure,
    /// Trailing mean of `efficiency_ratio`
    pub rolling_efficiency: Measure,
}

/// Rolling metrics for one site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRollingMetrics {
    pub site_id: String,
    pub months: Vec<MonthlyMetrics>,
    pub receipts_volatility: Measure,
    pub dispatches_volatility: Measure,
}

/// Month-over-month percentage change
///
/// Formula: `(v[t] - v[t-1]) / v[t-1] * 100`. The first element has no prior
/// period and a zero predecessor gives an undefined change.
pub fn mom_change(values: &[f64]) -> Vec<Measure> {
    values
        .iter()
        .enumerate()
        .map(|(t, &v)| {
            if t == 0 {
                return Measure::undefined(UndefinedReason::NoPriorPeriod);
            }
            let prev = values[t - 1];
            Measure::ratio(v - prev, prev).map(|r| r * 100.0)
        })
        .collect()
}

/// Cumulative sums that restart at the first month of each year
pub fn year_to_date(months: &[YearMonth], values: &[f64]) -> Vec<f64> {
    let mut running = 0.0;
    let mut current_year = None;
    months
        .iter()
        .zip(values)
        .map(|(month, &v)| {
            if current_year != Some(month.year) {
                current_year = Some(month.year);
                running = 0.0;
            }
            running += v;
            running
        })
        .collect()
}

/// Trailing mean over `window` elements
///
/// The first `window - 1` positions have no full window and are undefined;
/// a window containing an undefined value is undefined with that value's reason.
pub fn rolling_mean(values: &[Measure], window: usize) -> Vec<Measure> {
    (0..values.len())
        .map(|t| {
            if window == 0 || t + 1 < window {
                return Measure::undefined(UndefinedReason::IncompleteWindow);
            }
            let slice = &values[t + 1 - window..=t];
            let mut defined = Vec::with_capacity(window);
            for m in slice {
                match m {
                    Measure::Defined { value } => defined.push(*value),
                    Measure::Undefined { reason } => return Measure::undefined(*reason),
                }
            }
            stats::mean(&defined)
        })
        .collect()
}

/// Sample std of the defined changes within the trailing window (`None` = all)
pub fn volatility(changes: &[Measure], window: Option<usize>) -> Measure {
    let start = window.map_or(0, |w| changes.len().saturating_sub(w));
    let defined: Vec<f64> = changes[start..].iter().filter_map(Measure::value).collect();
    stats::sample_std(&defined)
}

/// Computes rolling productivity metrics per site
#[derive(Debug, Clone, Copy)]
pub struct RollingEngine {
    window_months: usize,
    volatility_window: Option<usize>,
}

impl RollingEngine {
    pub fn new(window_months: usize, volatility_window: Option<usize>) -> Self {
        Self {
            window_months,
            volatility_window,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.rolling_window_months, config.volatility_window_months)
    }

    /// Metrics for one site; records are sorted by month first
    pub fn compute_site(
        &self,
        site_id: &str,
        records: &[ProductivityRecord],
    ) -> Result<SiteRollingMetrics, AnalysisError> {
        if records.is_empty() {
            return Err(AnalysisError::NoValidInput(format!(
                "no productivity records for site {site_id}"
            )));
        }
        let mut sorted = records.to_vec();
        sorted.sort_by(|a, b| a.month.cmp(&b.month));

        let months: Vec<YearMonth> = sorted.iter().map(|r| r.month).collect();
        let receipts: Vec<f64> = sorted.iter().map(|r| r.receipts).collect();
        let dispatches: Vec<f64> = sorted.iter().map(|r| r.dispatches).collect();

        let receipts_mom = mom_change(&receipts);
        let dispatches_mom = mom_change(&dispatches);
        let receipts_ytd = year_to_date(&months, &receipts);
        let dispatches_ytd = year_to_date(&months, &dispatches);
        let efficiency: Vec<Measure> = sorted
            .iter()
            .map(|r| Measure::ratio(r.dispatches, r.receipts))
            .collect();
        let rolling = rolling_mean(&efficiency, self.window_months);

        let rows = (0..sorted.len())
            .map(|t| MonthlyMetrics {
                month: months[t],
                receipts: receipts[t],
                dispatches: dispatches[t],
                receipts_mom_pct: receipts_mom[t],
                dispatches_mom_pct: dispatches_mom[t],
                receipts_ytd: receipts_ytd[t],
                dispatches_ytd: dispatches_ytd[t],
                efficiency_ratio: efficiency[t],
                rolling_efficiency: rolling[t],
            })
            .collect();

        Ok(SiteRollingMetrics {
            site_id: site_id.to_string(),
            months: rows,
            receipts_volatility: volatility(&receipts_mom, self.volatility_window),
            dispatches_volatility: volatility(&dispatches_mom, self.volatility_window),
        })
    }

    /// Metrics for every site present in `records`
    pub fn compute_all(&self, records: &[ProductivityRecord]) -> (Vec<SiteRollingMetrics>, Vec<Issue>) {
        let mut by_site: BTreeMap<&str, Vec<ProductivityRecord>> = BTreeMap::new();
        for record in records {
            by_site
                .entry(record.site_id.as_str())
                .or_default()
                .push(record.clone());
        }

        let mut sites = Vec::new();
        let mut issues = Vec::new();
        for (site_id, site_records) in by_site {
            match self.compute_site(site_id, &site_records) {
                Ok(metrics) => {
                    debug!(site = site_id, months = metrics.months.len(), "computed rolling metrics");
                    sites.push(metrics);
                }
                Err(err) => {
                    warn!(site = site_id, error = %err, "rolling metrics failed");
                    issues.extend(Issue::from_error(site_id, &err));
                }
            }
        }
        (sites, issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(year: i32, month: u32, receipts: f64, dispatches: f64) -> ProductivityRecord {
        ProductivityRecord {
            site_id: "KB3".to_string(),
            month: YearMonth::new(year, month).unwrap(),
            receipts,
            dispatches,
        }
    }

    fn approx(m: Measure, expected: f64) -> bool {
        m.value().map_or(false, |v| (v - expected).abs() < 1e-9)
    }

    #[test]
    fn test_mom_change() {
        let changes = mom_change(&[100.0, 150.0, 120.0]);
        assert_eq!(changes[0], Measure::undefined(UndefinedReason::NoPriorPeriod));
        assert!(approx(changes[1], 50.0));
        assert!(approx(changes[2], -20.0));
    }

    #[test]
    fn test_mom_change_zero_predecessor() {
        let changes = mom_change(&[0.0, 10.0]);
        assert_eq!(changes[1], Measure::undefined(UndefinedReason::ZeroDenominator));
    }

    #[test]
    fn test_year_to_date_resets() {
        let months = vec![
            YearMonth::new(2023, 11).unwrap(),
            YearMonth::new(2023, 12).unwrap(),
            YearMonth::new(2024, 1).unwrap(),
            YearMonth::new(2024, 2).unwrap(),
        ];
        let ytd = year_to_date(&months, &[10.0, 20.0, 5.0, 7.0]);
        assert_eq!(ytd, vec![10.0, 30.0, 5.0, 12.0]);
    }

    #[test]
    fn test_rolling_efficiency_three_months() {
        let engine = RollingEngine::new(3, None);
        let site = engine
            .compute_site(
                "KB3",
                &[
                    record(2024, 1, 100.0, 80.0),
                    record(2024, 2, 200.0, 150.0),
                    record(2024, 3, 50.0, 45.0),
                ],
            )
            .unwrap();

        assert_eq!(
            site.months[0].rolling_efficiency,
            Measure::undefined(UndefinedReason::IncompleteWindow)
        );
        assert_eq!(
            site.months[1].rolling_efficiency,
            Measure::undefined(UndefinedReason::IncompleteWindow)
        );
        let expected = (0.8 + 0.75 + 0.9) / 3.0;
        assert!(approx(site.months[2].rolling_efficiency, expected));
    }

    #[test]
    fn test_fewer_months_than_window() {
        let engine = RollingEngine::new(3, None);
        let site = engine
            .compute_site("KB3", &[record(2024, 1, 100.0, 80.0), record(2024, 2, 100.0, 90.0)])
            .unwrap();
        assert!(site.months.iter().all(|m| !m.rolling_efficiency.is_defined()));
    }

    #[test]
    fn test_zero_receipts_poisons_window() {
        let engine = RollingEngine::new(2, None);
        let site = engine
            .compute_site(
                "KB3",
                &[
                    record(2024, 1, 100.0, 80.0),
                    record(2024, 2, 0.0, 10.0),
                    record(2024, 3, 100.0, 90.0),
                ],
            )
            .unwrap();
        assert_eq!(
            site.months[1].efficiency_ratio,
            Measure::undefined(UndefinedReason::ZeroDenominator)
        );
        assert_eq!(
            site.months[2].rolling_efficiency,
            Measure::undefined(UndefinedReason::ZeroDenominator)
        );
    }

    #[test]
    fn test_records_sorted_before_windowing() {
        let engine = RollingEngine::new(3, None);
        let site = engine
            .compute_site(
                "KB3",
                &[
                    record(2024, 3, 120.0, 100.0),
                    record(2024, 1, 100.0, 80.0),
                    record(2024, 2, 150.0, 120.0),
                ],
            )
            .unwrap();
        assert_eq!(site.months[0].month, YearMonth::new(2024, 1).unwrap());
        assert!(approx(site.months[1].receipts_mom_pct, 50.0));
        assert!(approx(site.months[2].receipts_mom_pct, -20.0));
    }

    #[test]
    fn test_volatility_window() {
        // changes: undefined, +10%, -10%, +50%
        let changes = mom_change(&[100.0, 110.0, 99.0, 148.5]);
        let all = volatility(&changes, None).value().unwrap();
        let expected_all = stats::sample_std(&[10.0, -10.0, 50.0]).value().unwrap();
        assert!((all - expected_all).abs() < 1e-6);

        let last_two = volatility(&changes, Some(2)).value().unwrap();
        let expected_two = stats::sample_std(&[-10.0, 50.0]).value().unwrap();
        assert!((last_two - expected_two).abs() < 1e-6);

        assert_eq!(
            volatility(&changes, Some(1)),
            Measure::undefined(UndefinedReason::InsufficientSamples)
        );
    }

    #[test]
    fn test_empty_site_has_no_result() {
        let engine = RollingEngine::new(3, None);
        assert!(matches!(
            engine.compute_site("KB3", &[]),
            Err(AnalysisError::NoValidInput(_))
        ));
    }
}
