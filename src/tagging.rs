//! Tag propagation
//!
//! Joins biometric samples to the month classification of their team's site.
//! The month of a sample is taken in local time. Samples whose site-month has
//! no productivity data are dropped (a period without productivity data is not
//! an error); samples of teams without a site mapping are dropped and reported.

use crate::classifier::Classification;
use crate::error::{AnalysisError, Issue};
use crate::schema::normalize_id;
use crate::types::{BiometricSample, TaggedSample, YearMonth};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Team to site mapping with normalized identifiers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteMap {
    sites: BTreeMap<String, String>,
}

impl SiteMap {
    pub fn new<'a>(pairs: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        Self {
            sites: pairs
                .into_iter()
                .map(|(team, site)| (normalize_id(team), normalize_id(site)))
                .collect(),
        }
    }

    /// Site of a team
    pub fn site_of(&self, team_id: &str) -> Result<&str, AnalysisError> {
        self.sites
            .get(team_id)
            .map(String::as_str)
            .ok_or_else(|| AnalysisError::MissingMapping {
                team_id: team_id.to_string(),
            })
    }

    pub fn contains_team(&self, team_id: &str) -> bool {
        self.sites.contains_key(team_id)
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

/// Result of tagging a batch of samples
#[derive(Debug, Clone, Default)]
pub struct TaggingOutcome {
    /// Tagged samples in input order
    pub tagged: Vec<TaggedSample>,
    /// Samples whose site-month has no classification
    pub dropped_without_productivity: usize,
    /// Samples whose team has no site
    pub dropped_unmapped: usize,
    pub issues: Vec<Issue>,
}

/// Joins samples to month classifications
pub struct TagPropagator<'a> {
    sites: &'a SiteMap,
    classification: &'a Classification,
    tz: Tz,
}

impl<'a> TagPropagator<'a> {
    pub fn new(sites: &'a SiteMap, classification: &'a Classification, tz: Tz) -> Self {
        Self {
            sites,
            classification,
            tz,
        }
    }

    /// Tag a single sample
    ///
    /// Returns `Ok(None)` when the site-month has no productivity data.
    pub fn tag(&self, sample: &BiometricSample) -> Result<Option<TaggedSample>, AnalysisError> {
        let site_id = self.sites.site_of(&sample.team_id)?;
        let month = YearMonth::of(&sample.timestamp.with_timezone(&self.tz));
        Ok(self
            .classification
            .label_of(site_id, month)
            .map(|label| TaggedSample {
                sample: sample.clone(),
                site_id: site_id.to_string(),
                label,
            }))
    }

    /// Tag a batch of samples, preserving input order
    pub fn propagate(&self, samples: &[BiometricSample]) -> TaggingOutcome {
        let mut outcome = TaggingOutcome::default();
        let mut unmapped: BTreeSet<&str> = BTreeSet::new();

        for sample in samples {
            match self.tag(sample) {
                Ok(Some(tagged)) => outcome.tagged.push(tagged),
                Ok(None) => outcome.dropped_without_productivity += 1,
                Err(err) => {
                    outcome.dropped_unmapped += 1;
                    if unmapped.insert(sample.team_id.as_str()) {
                        warn!(team = %sample.team_id, "team has no site mapping");
                        outcome.issues.extend(Issue::from_error(&sample.team_id, &err));
                    }
                }
            }
        }

        debug!(
            tagged = outcome.tagged.len(),
            without_productivity = outcome.dropped_without_productivity,
            unmapped = outcome.dropped_unmapped,
            "propagated productivity labels"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ProductivityClassifier;
    use crate::error::IssueKind;
    use crate::types::{ActivityBreakdown, ProductivityLabel, ProductivityRecord};
    use chrono::{TimeZone, Utc};

    fn sample(team: &str, month: u32, day: u32, hour: u32) -> BiometricSample {
        BiometricSample {
            timestamp: Utc.with_ymd_and_hms(2024, month, day, hour, 0, 0).unwrap(),
            team_id: team.to_string(),
            stress_level: 50.0,
            activity: ActivityBreakdown::new(70.0, 20.0, 10.0, 0.0),
        }
    }

    fn classification() -> Classification {
        let records: Vec<ProductivityRecord> = [(1, 100.0), (2, 300.0), (3, 120.0), (4, 110.0)]
            .iter()
            .map(|&(m, r)| ProductivityRecord {
                site_id: "KB3".to_string(),
                month: YearMonth::new(2024, m).unwrap(),
                receipts: r,
                dispatches: r,
            })
            .collect();
        ProductivityClassifier::new(75.0).classify_all(&records).0
    }

    fn site_map() -> SiteMap {
        let pairs = vec![("nops".to_string(), "kb3".to_string())];
        SiteMap::new(pairs.iter().map(|(a, b)| (a, b)))
    }

    #[test]
    fn test_tags_by_site_month() {
        let sites = site_map();
        let classification = classification();
        let propagator = TagPropagator::new(&sites, &classification, chrono_tz::UTC);

        let outcome = propagator.propagate(&[sample("NOPS", 2, 5, 10), sample("NOPS", 3, 5, 10)]);
        assert_eq!(outcome.tagged.len(), 2);
        assert_eq!(outcome.tagged[0].label, ProductivityLabel::High);
        assert_eq!(outcome.tagged[0].site_id, "KB3");
        assert_eq!(outcome.tagged[1].label, ProductivityLabel::Normal);
    }

    #[test]
    fn test_month_without_productivity_is_dropped() {
        let sites = site_map();
        let classification = classification();
        let propagator = TagPropagator::new(&sites, &classification, chrono_tz::UTC);

        let outcome = propagator.propagate(&[sample("NOPS", 7, 1, 10)]);
        assert!(outcome.tagged.is_empty());
        assert_eq!(outcome.dropped_without_productivity, 1);
        assert!(outcome.issues.is_empty());
    }

    #[test]
    fn test_unmapped_team_reported_once() {
        let sites = site_map();
        let classification = classification();
        let propagator = TagPropagator::new(&sites, &classification, chrono_tz::UTC);

        let outcome =
            propagator.propagate(&[sample("GHOST", 2, 5, 10), sample("GHOST", 2, 6, 10)]);
        assert_eq!(outcome.dropped_unmapped, 2);
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].kind, IssueKind::MissingMapping);
    }

    #[test]
    fn test_month_uses_local_time() {
        let sites = site_map();
        let classification = classification();
        let mut s = sample("NOPS", 1, 31, 23);
        s.timestamp = Utc.with_ymd_and_hms(2024, 1, 31, 23, 30, 0).unwrap();

        // Still January in UTC
        let utc = TagPropagator::new(&sites, &classification, chrono_tz::UTC);
        assert_eq!(utc.tag(&s).unwrap().unwrap().label, ProductivityLabel::Normal);

        // Already 1 February in Berlin, which is the high month
        let berlin = TagPropagator::new(&sites, &classification, chrono_tz::Europe::Berlin);
        assert_eq!(berlin.tag(&s).unwrap().unwrap().label, ProductivityLabel::High);
    }
}
