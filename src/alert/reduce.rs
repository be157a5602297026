//! Reduction of extracted bulletins into the per-province alert map.
//!
//! The map always carries all 52 areas. Every area starts at no-risk and a
//! bulletin replaces an area's entry only when its level is strictly higher,
//! so the first bulletin at the final level supplies the phenomenon and
//! later bulletins at the same level change nothing. Bulletin order within
//! one fetch is feed order, which the retrievers keep deterministic.
//!
//! All functions take `now` as a parameter; the thin wrappers that use the
//! real clock exist for the daemon path only.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::alert::extract::{self, Extraction};
use crate::model::{ProvinceAlert, RawBulletin, RiskLevel};
use crate::provinces;

/// Tallies of what one batch of bulletins contributed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReduceStats {
    /// Bulletins inspected.
    pub bulletins: usize,
    /// Bulletins that raised a province's level.
    pub applied: usize,
    /// Bulletins classified as no-risk text.
    pub no_risk: usize,
    /// Coastal advisories excluded from the map.
    pub coastal: usize,
    /// Warning-level bulletins with no resolvable province.
    pub unresolved: usize,
}

/// The reduced map plus its tallies.
#[derive(Debug, Clone, PartialEq)]
pub struct ReduceOutcome {
    /// One entry per registry code, keyed by province code.
    pub alerts: BTreeMap<String, ProvinceAlert>,
    pub stats: ReduceStats,
}

impl ReduceOutcome {
    /// Number of provinces left above no-risk.
    pub fn provinces_at_risk(&self) -> usize {
        self.alerts
            .values()
            .filter(|a| a.level > RiskLevel::None)
            .count()
    }
}

/// Reduces a batch of bulletins into the full province map.
///
/// Reducing an empty batch yields the all-green map: upstream reporting zero
/// warnings is a valid observation, not a failure.
pub fn reduce_at(bulletins: &[RawBulletin], now: DateTime<Utc>) -> ReduceOutcome {
    let mut alerts: BTreeMap<String, ProvinceAlert> = provinces::all_codes()
        .into_iter()
        .map(|code| (code.to_string(), ProvinceAlert::none_at(now)))
        .collect();
    let mut stats = ReduceStats::default();

    for bulletin in bulletins {
        stats.bulletins += 1;
        match extract::extract(bulletin) {
            Extraction::Alert {
                province,
                level,
                phenomenon,
            } => {
                let entry = alerts
                    .entry(province)
                    .or_insert_with(|| ProvinceAlert::none_at(now));
                if level > entry.level {
                    entry.level = level;
                    entry.phenomenon = Some(phenomenon);
                    entry.observed_at = now;
                    stats.applied += 1;
                }
            }
            Extraction::NoRisk => stats.no_risk += 1,
            Extraction::Coastal => stats.coastal += 1,
            Extraction::Unresolved => stats.unresolved += 1,
        }
    }

    ReduceOutcome { alerts, stats }
}

/// Convenience wrapper that uses the real current time.
/// Use `reduce_at` in tests to keep them deterministic.
pub fn reduce(bulletins: &[RawBulletin]) -> ReduceOutcome {
    reduce_at(bulletins, Utc::now())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
