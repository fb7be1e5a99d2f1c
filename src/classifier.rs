//! Productivity classification
//!
//! Labels each month of a site as `high` or `normal` from its receipt volume.
//! The threshold is the configured percentile of the site's own monthly
//! receipts; sites are never pooled.
//!
//! A month is `high` only when its receipts are strictly above the threshold.
//! When a site has fewer than two distinct receipt values the percentile is
//! meaningless, so the threshold falls back to the maximum observed value and
//! every month is `normal`. Such sites are marked `degenerate`.

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Issue};
use crate::stats;
use crate::types::{MonthClassification, ProductivityLabel, ProductivityRecord, YearMonth};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Classification of every month of one site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteClassification {
    pub site_id: String,
    /// Receipts level a month must exceed to be `high`
    pub threshold: f64,
    /// Threshold came from the max-value fallback
    pub degenerate: bool,
    /// One entry per month, ordered by month
    pub months: Vec<MonthClassification>,
}

impl SiteClassification {
    pub fn high_count(&self) -> usize {
        self.months
            .iter()
            .filter(|m| m.label == ProductivityLabel::High)
            .count()
    }
}

/// Classifications for all sites, indexed for lookup by (site, month)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub sites: BTreeMap<String, SiteClassification>,
}

impl Classification {
    /// Label of a site-month, if that month has productivity data
    pub fn label_of(&self, site_id: &str, month: YearMonth) -> Option<ProductivityLabel> {
        let site = self.sites.get(site_id)?;
        site.months
            .binary_search_by(|m| m.month.cmp(&month))
            .ok()
            .map(|idx| site.months[idx].label)
    }
}

/// Percentile-based month classifier
#[derive(Debug, Clone, Copy)]
pub struct ProductivityClassifier {
    threshold_percentile: f64,
}

impl ProductivityClassifier {
    pub fn new(threshold_percentile: f64) -> Self {
        Self {
            threshold_percentile,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.threshold_percentile)
    }

    /// Classify the months of a single site
    ///
    /// `records` must all belong to `site_id`.
    pub fn classify_site(
        &self,
        site_id: &str,
        records: &[ProductivityRecord],
    ) -> Result<SiteClassification, AnalysisError> {
        let receipts: Vec<f64> = records.iter().map(|r| r.receipts).collect();
        if receipts.is_empty() {
            return Err(AnalysisError::NoValidInput(format!(
                "no productivity records for site {site_id}"
            )));
        }

        let degenerate = stats::distinct_count(&receipts) < 2;
        let threshold = if degenerate {
            receipts.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        } else {
            stats::percentile(&receipts, self.threshold_percentile)
                .value()
                .ok_or_else(|| {
                    AnalysisError::InsufficientData(format!("percentile undefined for {site_id}"))
                })?
        };

        let mut months: Vec<MonthClassification> = records
            .iter()
            .map(|r| MonthClassification {
                site_id: site_id.to_string(),
                month: r.month,
                label: if r.receipts > threshold {
                    ProductivityLabel::High
                } else {
                    ProductivityLabel::Normal
                },
            })
            .collect();
        months.sort_by(|a, b| a.month.cmp(&b.month));

        Ok(SiteClassification {
            site_id: site_id.to_string(),
            threshold,
            degenerate,
            months,
        })
    }

    /// Classify every site present in `records`
    ///
    /// Each site is classified independently. Degenerate sites are still
    /// classified and reported as issues.
    pub fn classify_all(&self, records: &[ProductivityRecord]) -> (Classification, Vec<Issue>) {
        let mut by_site: BTreeMap<&str, Vec<ProductivityRecord>> = BTreeMap::new();
        for record in records {
            by_site
                .entry(record.site_id.as_str())
                .or_default()
                .push(record.clone());
        }

        let mut classification = Classification::default();
        let mut issues = Vec::new();

        for (site_id, site_records) in by_site {
            match self.classify_site(site_id, &site_records) {
                Ok(site) => {
                    if site.degenerate {
                        let err = AnalysisError::DegenerateInput {
                            site_id: site_id.to_string(),
                            detail: format!(
                                "fewer than 2 distinct receipt values, threshold set to maximum {}",
                                site.threshold
                            ),
                        };
                        warn!(site = site_id, "degenerate receipts series");
                        issues.extend(Issue::from_error(site_id, &err));
                    }
                    debug!(
                        site = site_id,
                        threshold = site.threshold,
                        high = site.high_count(),
                        "classified site"
                    );
                    classification.sites.insert(site_id.to_string(), site);
                }
                Err(err) => {
                    warn!(site = site_id, error = %err, "site classification failed");
                    issues.extend(Issue::from_error(site_id, &err));
                }
            }
        }

        (classification, issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IssueKind;

    fn records(site: &str, receipts: &[f64]) -> Vec<ProductivityRecord> {
        receipts
            .iter()
            .enumerate()
            .map(|(i, &r)| ProductivityRecord {
                site_id: site.to_string(),
                month: YearMonth::new(2024, i as u32 + 1).unwrap(),
                receipts: r,
                dispatches: r * 0.9,
            })
            .collect()
    }

    #[test]
    fn test_strictly_above_threshold_is_high() {
        let classifier = ProductivityClassifier::new(75.0);
        // sorted 100, 120, 150, 200 -> p75 = 162.5
        let site = classifier
            .classify_site("KB3", &records("KB3", &[100.0, 150.0, 120.0, 200.0]))
            .unwrap();

        assert!((site.threshold - 162.5).abs() < 1e-9);
        let labels: Vec<_> = site.months.iter().map(|m| m.label).collect();
        assert_eq!(
            labels,
            vec![
                ProductivityLabel::Normal,
                ProductivityLabel::Normal,
                ProductivityLabel::Normal,
                ProductivityLabel::High,
            ]
        );
    }

    #[test]
    fn test_tie_at_threshold_is_normal() {
        let classifier = ProductivityClassifier::new(50.0);
        // sorted 10, 20, 30 -> p50 = 20, month with 20 is a tie
        let site = classifier
            .classify_site("KB3", &records("KB3", &[10.0, 20.0, 30.0]))
            .unwrap();
        assert_eq!(site.months[1].label, ProductivityLabel::Normal);
        assert_eq!(site.months[2].label, ProductivityLabel::High);
    }

    #[test]
    fn test_degenerate_series_all_normal() {
        let classifier = ProductivityClassifier::new(75.0);
        let site = classifier
            .classify_site("KB3", &records("KB3", &[500.0, 500.0, 500.0]))
            .unwrap();
        assert!(site.degenerate);
        assert_eq!(site.threshold, 500.0);
        assert_eq!(site.high_count(), 0);
    }

    #[test]
    fn test_single_month_is_degenerate() {
        let classifier = ProductivityClassifier::new(75.0);
        let (classification, issues) = classifier.classify_all(&records("KB3", &[42.0]));
        assert_eq!(classification.sites["KB3"].high_count(), 0);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::DegenerateInput);
    }

    #[test]
    fn test_empty_site_has_no_result() {
        let classifier = ProductivityClassifier::new(75.0);
        assert!(matches!(
            classifier.classify_site("KB3", &[]),
            Err(AnalysisError::NoValidInput(_))
        ));
    }

    #[test]
    fn test_deterministic_and_complete() {
        let classifier = ProductivityClassifier::new(75.0);
        let input = records("DALMUIR", &[310.0, 120.0, 450.0, 280.0, 390.0, 150.0]);
        let first = classifier.classify_site("DALMUIR", &input).unwrap();
        let second = classifier.classify_site("DALMUIR", &input).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.months.len(), input.len());
    }

    #[test]
    fn test_raising_percentile_never_adds_high_months() {
        let input = records(
            "KILMALID",
            &[310.0, 120.0, 450.0, 280.0, 390.0, 150.0, 390.0, 275.0, 500.0],
        );
        let mut previous = usize::MAX;
        for p in [5.0, 25.0, 40.0, 50.0, 60.0, 75.0, 90.0, 99.0] {
            let site = ProductivityClassifier::new(p)
                .classify_site("KILMALID", &input)
                .unwrap();
            assert!(site.high_count() <= previous);
            previous = site.high_count();
        }
    }

    #[test]
    fn test_sites_are_classified_independently() {
        let mut input = records("A", &[10.0, 20.0, 30.0, 40.0]);
        input.extend(records("B", &[1000.0, 2000.0, 3000.0, 4000.0]));
        let (classification, issues) = ProductivityClassifier::new(75.0).classify_all(&input);
        assert!(issues.is_empty());
        assert_eq!(classification.sites["A"].high_count(), 1);
        assert_eq!(classification.sites["B"].high_count(), 1);

        let april = YearMonth::new(2024, 4).unwrap();
        assert_eq!(classification.label_of("A", april), Some(ProductivityLabel::High));
        assert_eq!(
            classification.label_of("A", YearMonth::new(2023, 12).unwrap()),
            None
        );
        assert_eq!(classification.label_of("C", april), None);
    }
}
