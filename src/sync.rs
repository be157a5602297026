//! Sync orchestration.
//!
//! The orchestrator owns the HTTP client, the snapshot store and the sync
//! status. A sync is fetch, reduce, persist: pull bulletins for the
//! configured feed format, fold them into per-province alerts and write one
//! snapshot. Only one sync runs at a time; an overlapping request is
//! refused without counting as an attempt. A failed sync never touches the
//! last good snapshot, so reads keep answering from it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crate::alert::reduce::{self, ReduceStats};
use crate::config::ServiceConfig;
use crate::ingest;
use crate::logging::{self, DataSource};
use crate::model::{AlertView, FeedError, ProvinceAlert, RawBulletin};
use crate::provinces;
use crate::snapshot::SnapshotStore;

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncState {
    Pending,
    Ok,
    Error,
}

/// Running account of sync health, serialized for the status endpoint.
///
/// `last_sync_at` is the time of the last successful sync (or of the
/// snapshot adopted at startup); failures do not move it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub last_sync_at: Option<DateTime<Utc>>,
    pub state: SyncState,
    pub message: Option<String>,
    pub total_attempts: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub success_rate: f64,
}

impl SyncStatus {
    fn initial() -> SyncStatus {
        SyncStatus {
            last_sync_at: None,
            state: SyncState::Pending,
            message: None,
            total_attempts: 0,
            success_count: 0,
            failure_count: 0,
            success_rate: 0.0,
        }
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64) * 100.0
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum SyncError {
    Feed(FeedError),
    Store(io::Error),
    AlreadyRunning,
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Feed(err) => write!(f, "feed: {}", err),
            SyncError::Store(err) => write!(f, "snapshot store: {}", err),
            SyncError::AlreadyRunning => write!(f, "a sync is already in progress"),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<FeedError> for SyncError {
    fn from(err: FeedError) -> SyncError {
        SyncError::Feed(err)
    }
}

impl From<io::Error> for SyncError {
    fn from(err: io::Error) -> SyncError {
        SyncError::Store(err)
    }
}

/// What a successful sync produced.
#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub snapshot_file: String,
    pub stats: ReduceStats,
    pub provinces_with_alerts: usize,
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct SyncOrchestrator {
    config: ServiceConfig,
    client: reqwest::blocking::Client,
    store: SnapshotStore,
    status: Mutex<SyncStatus>,
    in_flight: AtomicBool,
}

impl SyncOrchestrator {
    pub fn new(config: ServiceConfig) -> Result<SyncOrchestrator, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.payload_timeout_secs))
            .build()?;
        let store = SnapshotStore::new(config.data_dir.clone(), config.cache_ttl_minutes);
        Ok(SyncOrchestrator {
            config,
            client,
            store,
            status: Mutex::new(SyncStatus::initial()),
            in_flight: AtomicBool::new(false),
        })
    }

    // ------------------------------------------------------------------------
    // Syncing
    // ------------------------------------------------------------------------

    /// Runs one full sync. Refused with `AlreadyRunning` when another sync
    /// holds the in-flight guard; a refused call counts as no attempt.
    pub fn sync(&self) -> Result<SyncSummary, SyncError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(SyncError::AlreadyRunning);
        }
        let result = self.sync_inner();
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    fn sync_inner(&self) -> Result<SyncSummary, SyncError> {
        logging::info(
            DataSource::Sync,
            None,
            &format!("starting sync ({})", self.config.feed_format),
        );
        self.store.invalidate_all();
        match ingest::fetch_all(&self.client, &self.config) {
            Ok(bulletins) => self.apply_bulletins_at(bulletins, Utc::now()),
            Err(err) => {
                self.record_failure(&err.to_string());
                logging::log_feed_failure(None, "sync", &err);
                Err(SyncError::Feed(err))
            }
        }
    }

    /// Reduces a bulletin batch and persists the snapshot. Split out from
    /// `sync` so feed ingestion and state handling can be driven separately.
    pub fn apply_bulletins_at(
        &self,
        bulletins: Vec<RawBulletin>,
        now: DateTime<Utc>,
    ) -> Result<SyncSummary, SyncError> {
        let outcome = reduce::reduce_at(&bulletins, now);
        let provinces_with_alerts = outcome.provinces_at_risk();

        let snapshot_file = match self.store.save_at(&outcome.alerts, now) {
            Ok(name) => name,
            Err(err) => {
                self.record_failure(&format!("snapshot write failed: {}", err));
                return Err(SyncError::Store(err));
            }
        };

        logging::log_sync_summary(
            outcome.stats.bulletins,
            provinces_with_alerts,
            outcome.stats.unresolved,
        );
        self.record_success(
            now,
            &format!(
                "{} bulletins, {} provinces with warnings",
                outcome.stats.bulletins, provinces_with_alerts
            ),
        );

        Ok(SyncSummary {
            snapshot_file,
            stats: outcome.stats,
            provinces_with_alerts,
        })
    }

    /// Drops the cache and syncs, regardless of snapshot freshness.
    pub fn force_refresh(&self) -> Result<SyncSummary, SyncError> {
        self.store.invalidate_all();
        self.sync()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Startup: adopt an existing snapshot if one is on disk, otherwise run
    /// a first sync. Adoption counts no attempt; a failing first sync is
    /// logged and the service stays up answering all-green defaults.
    pub fn initialize(&self) {
        if let Some(adopted_at) = self.store.latest_timestamp() {
            {
                let mut status = self.lock_status();
                status.state = SyncState::Ok;
                status.last_sync_at = Some(adopted_at);
                status.message = Some("adopted snapshot from disk".to_string());
            }
            logging::info(
                DataSource::Sync,
                None,
                &format!("adopted snapshot from {}", adopted_at.to_rfc3339()),
            );
            return;
        }
        logging::info(DataSource::Sync, None, "no snapshot on disk, running first sync");
        if let Err(err) = self.sync() {
            logging::error(DataSource::Sync, None, &format!("first sync failed: {}", err));
        }
    }

    /// Periodic sync loop. Never returns; one failed cycle does not stop
    /// the next one.
    pub fn run_scheduler(&self) -> ! {
        logging::info(
            DataSource::Sync,
            None,
            &format!(
                "scheduler running, syncing every {} minutes",
                self.config.sync_interval_minutes
            ),
        );
        loop {
            thread::sleep(Duration::from_secs(self.config.sync_interval_minutes * 60));
            if let Err(err) = self.sync() {
                logging::error(
                    DataSource::Sync,
                    None,
                    &format!("scheduled sync failed: {}", err),
                );
            }
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn status(&self) -> SyncStatus {
        self.lock_status().clone()
    }

    /// Alert for a province code. Provinces missing from the snapshot (or
    /// with no snapshot at all) answer the green default.
    pub fn alert_for_at(&self, code: &str, now: DateTime<Utc>) -> ProvinceAlert {
        self.store
            .get_at(code, now)
            .unwrap_or_else(|| ProvinceAlert::none_at(now))
    }

    pub fn alert_for(&self, code: &str) -> ProvinceAlert {
        self.alert_for_at(code, Utc::now())
    }

    /// Alert looked up by postal code. `None` only when no two-digit
    /// numeric prefix can be extracted; an unmapped prefix answers the
    /// green default like any province absent from the snapshot.
    pub fn alert_for_postal_at(&self, postal: &str, now: DateTime<Utc>) -> Option<ProvinceAlert> {
        provinces::code_from_postal(postal).map(|code| self.alert_for_at(&code, now))
    }

    pub fn alert_for_postal(&self, postal: &str) -> Option<ProvinceAlert> {
        self.alert_for_postal_at(postal, Utc::now())
    }

    /// One view per registry province, in code order.
    pub fn alert_views_at(&self, now: DateTime<Utc>) -> BTreeMap<String, AlertView> {
        let entries = self.store.all_at(now);
        provinces::all_codes()
            .into_iter()
            .map(|code| {
                let alert = entries
                    .get(code)
                    .cloned()
                    .unwrap_or_else(|| ProvinceAlert::none_at(now));
                (code.to_string(), alert.view())
            })
            .collect()
    }

    pub fn alert_views(&self) -> BTreeMap<String, AlertView> {
        self.alert_views_at(Utc::now())
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    // ------------------------------------------------------------------------
    // Status bookkeeping
    // ------------------------------------------------------------------------

    fn record_success(&self, now: DateTime<Utc>, message: &str) {
        let mut status = self.lock_status();
        status.total_attempts += 1;
        status.success_count += 1;
        status.state = SyncState::Ok;
        status.last_sync_at = Some(now);
        status.message = Some(message.to_string());
        status.success_rate = percent(status.success_count, status.total_attempts);
    }

    fn record_failure(&self, message: &str) {
        let mut status = self.lock_status();
        status.total_attempts += 1;
        status.failure_count += 1;
        status.state = SyncState::Error;
        status.message = Some(message.to_string());
        status.success_rate = percent(status.success_count, status.total_attempts);
    }

    fn lock_status(&self) -> MutexGuard<'_, SyncStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
