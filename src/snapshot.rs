//! Flat-file snapshot store.
//!
//! Each sync writes one CSV snapshot of all 52 provinces and deletes the
//! previous one, so the data directory always holds at most a single
//! `alertas-*.csv` file. Reads go through an in-memory cache that is
//! reloaded from disk as a whole once its TTL lapses. The snapshot is what
//! lets the service answer from the last known state after a restart.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::model::{ProvinceAlert, RiskLevel};
use crate::provinces;

pub const SNAPSHOT_HEADER: &str = "codigo_provincia,nombre_provincia,nivel,fenomeno,timestamp";

const SNAPSHOT_PREFIX: &str = "alertas-";
const SNAPSHOT_EXT: &str = ".csv";

/// Zero-padded, so lexicographic filename order is chronological order.
const FILE_STAMP: &str = "%Y-%m-%d-%H-%M-%S";

struct CacheState {
    entries: HashMap<String, ProvinceAlert>,
    loaded_at: Option<DateTime<Utc>>,
}

pub struct SnapshotStore {
    dir: PathBuf,
    ttl: Duration,
    cache: Mutex<CacheState>,
}

impl SnapshotStore {
    pub fn new(dir: PathBuf, ttl_minutes: i64) -> SnapshotStore {
        SnapshotStore {
            dir,
            ttl: Duration::minutes(ttl_minutes),
            cache: Mutex::new(CacheState {
                entries: HashMap::new(),
                loaded_at: None,
            }),
        }
    }

    // ------------------------------------------------------------------------
    // Writing
    // ------------------------------------------------------------------------

    /// Writes a full snapshot and prunes older ones. The cache is not
    /// touched: it repopulates lazily on the next read. Returns the file
    /// name written.
    pub fn save_at(
        &self,
        alerts: &BTreeMap<String, ProvinceAlert>,
        now: DateTime<Utc>,
    ) -> Result<String, io::Error> {
        fs::create_dir_all(&self.dir)?;
        let file_name = format!("{}{}{}", SNAPSHOT_PREFIX, now.format(FILE_STAMP), SNAPSHOT_EXT);

        let mut contents = String::with_capacity(64 * alerts.len());
        contents.push_str(SNAPSHOT_HEADER);
        contents.push('\n');
        for (code, alert) in alerts {
            let phenomenon = alert
                .phenomenon
                .as_deref()
                .map(sanitize_phenomenon)
                .unwrap_or_else(|| "null".to_string());
            contents.push_str(&format!(
                "{},{},{},{},{}\n",
                code,
                provinces::province_name(code),
                alert.level.key(),
                phenomenon,
                alert.observed_at.to_rfc3339(),
            ));
        }
        fs::write(self.dir.join(&file_name), contents)?;

        self.prune_except(&file_name);

        Ok(file_name)
    }

    pub fn save(&self, alerts: &BTreeMap<String, ProvinceAlert>) -> Result<String, io::Error> {
        self.save_at(alerts, Utc::now())
    }

    /// Retention is one file: everything but `keep` goes.
    fn prune_except(&self, keep: &str) {
        for path in self.snapshot_files() {
            if path.file_name().and_then(|n| n.to_str()) != Some(keep) {
                let _ = fs::remove_file(&path);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------------

    /// Alert for one province, reloading the snapshot if the cache is stale.
    /// `None` when no snapshot exists or the province is absent from it.
    pub fn get_at(&self, code: &str, now: DateTime<Utc>) -> Option<ProvinceAlert> {
        let mut state = self.lock_cache();
        self.ensure_fresh(&mut state, now);
        state.entries.get(code).cloned()
    }

    pub fn get(&self, code: &str) -> Option<ProvinceAlert> {
        self.get_at(code, Utc::now())
    }

    /// All cached alerts, reloading first if stale.
    pub fn all_at(&self, now: DateTime<Utc>) -> HashMap<String, ProvinceAlert> {
        let mut state = self.lock_cache();
        self.ensure_fresh(&mut state, now);
        state.entries.clone()
    }

    /// Drops the cache so the next read hits the disk again.
    pub fn invalidate_all(&self) {
        let mut state = self.lock_cache();
        state.entries.clear();
        state.loaded_at = None;
    }

    fn ensure_fresh(&self, state: &mut CacheState, now: DateTime<Utc>) {
        let stale = match state.loaded_at {
            None => true,
            Some(loaded) => now.signed_duration_since(loaded) > self.ttl,
        };
        if stale {
            state.entries = self.load_latest().unwrap_or_default();
            state.loaded_at = Some(now);
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------------
    // Disk access
    // ------------------------------------------------------------------------

    fn snapshot_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(SNAPSHOT_PREFIX) && n.ends_with(SNAPSHOT_EXT))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        files
    }

    fn latest_snapshot_file(&self) -> Option<PathBuf> {
        self.snapshot_files().into_iter().last()
    }

    /// Parses the newest snapshot on disk. Malformed rows are skipped.
    fn load_latest(&self) -> Option<HashMap<String, ProvinceAlert>> {
        let path = self.latest_snapshot_file()?;
        let contents = fs::read_to_string(&path).ok()?;
        let mut entries = HashMap::new();
        for line in contents.lines().skip(1) {
            if let Some((code, alert)) = parse_snapshot_row(line) {
                entries.insert(code, alert);
            }
        }
        Some(entries)
    }

    /// Timestamp encoded in the newest snapshot's file name.
    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        let path = self.latest_snapshot_file()?;
        let name = path.file_name()?.to_str()?;
        let stamp = name
            .strip_prefix(SNAPSHOT_PREFIX)?
            .strip_suffix(SNAPSHOT_EXT)?;
        NaiveDateTime::parse_from_str(stamp, FILE_STAMP)
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn parse_snapshot_row(line: &str) -> Option<(String, ProvinceAlert)> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != 5 {
        return None;
    }
    let code = fields[0].trim();
    if provinces::find_province(code).is_none() {
        return None;
    }
    let level = RiskLevel::from_key(fields[2].trim())?;
    let phenomenon = match fields[3].trim() {
        "" | "null" => None,
        text => Some(text.to_string()),
    };
    let observed_at = DateTime::parse_from_rfc3339(fields[4].trim())
        .ok()?
        .with_timezone(&Utc);
    Some((
        code.to_string(),
        ProvinceAlert {
            level,
            phenomenon,
            observed_at,
        },
    ))
}

/// The phenomenon is free text from upstream; keep it on one CSV cell.
fn sanitize_phenomenon(text: &str) -> String {
    text.replace(['\n', '\r'], " ").replace(',', ";").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap()
    }

    /// All provinces green except Madrid (naranja) and Barcelona (amarillo).
    fn sample_alerts(now: DateTime<Utc>) -> BTreeMap<String, ProvinceAlert> {
        let mut alerts: BTreeMap<String, ProvinceAlert> = provinces::all_codes()
            .into_iter()
            .map(|code| (code.to_string(), ProvinceAlert::none_at(now)))
            .collect();
        alerts.insert(
            "28".to_string(),
            ProvinceAlert {
                level: RiskLevel::Severe,
                phenomenon: Some("Viento".to_string()),
                observed_at: now,
            },
        );
        alerts.insert(
            "08".to_string(),
            ProvinceAlert {
                level: RiskLevel::Moderate,
                phenomenon: Some("Lluvia".to_string()),
                observed_at: now,
            },
        );
        alerts
    }

    #[test]
    fn test_save_writes_header_and_one_row_per_province() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().to_path_buf(), 10);
        let now = fixed_now();

        let file_name = store.save_at(&sample_alerts(now), now).unwrap();
        assert_eq!(file_name, "alertas-2026-03-14-09-30-00.csv");

        let contents = fs::read_to_string(dir.path().join(&file_name)).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], SNAPSHOT_HEADER);
        assert_eq!(lines.len(), 53, "header plus one row per province");
        assert!(contents.contains("28,Madrid,naranja,Viento,"));
        assert!(contents.contains("08,Barcelona,amarillo,Lluvia,"));
        assert!(contents.contains("15,A Coruña,verde,null,"));
    }

    #[test]
    fn test_save_prunes_older_snapshots() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().to_path_buf(), 10);
        let first = fixed_now();
        let second = first + Duration::minutes(30);

        store.save_at(&sample_alerts(first), first).unwrap();
        let kept = store.save_at(&sample_alerts(second), second).unwrap();

        let files = store.snapshot_files();
        assert_eq!(files.len(), 1, "retention is a single snapshot");
        assert_eq!(
            files[0].file_name().and_then(|n| n.to_str()),
            Some(kept.as_str())
        );
    }

    #[test]
    fn test_fresh_store_reads_snapshot_from_disk() {
        let dir = TempDir::new().unwrap();
        let now = fixed_now();
        SnapshotStore::new(dir.path().to_path_buf(), 10)
            .save_at(&sample_alerts(now), now)
            .unwrap();

        // New store instance, cold cache.
        let store = SnapshotStore::new(dir.path().to_path_buf(), 10);
        let alert = store.get_at("28", now).expect("snapshot row for Madrid");
        assert_eq!(alert.level, RiskLevel::Severe);
        assert_eq!(alert.phenomenon.as_deref(), Some("Viento"));
        assert_eq!(alert.observed_at, now);

        let green = store.get_at("50", now).expect("snapshot row for Zaragoza");
        assert_eq!(green.level, RiskLevel::None);
        assert!(green.phenomenon.is_none());
    }

    #[test]
    fn test_cache_serves_reads_within_ttl() {
        let dir = TempDir::new().unwrap();
        let now = fixed_now();
        let store = SnapshotStore::new(dir.path().to_path_buf(), 10);
        store.save_at(&sample_alerts(now), now).unwrap();
        assert!(
            store.get_at("28", now).is_some(),
            "read-through loads the snapshot"
        );

        // Remove the file behind the cache's back; reads inside the TTL
        // must not notice.
        for path in store.snapshot_files() {
            fs::remove_file(path).unwrap();
        }
        let within = now + Duration::minutes(9);
        assert!(store.get_at("28", within).is_some(), "cache hit inside TTL");

        let beyond = now + Duration::minutes(11);
        assert!(
            store.get_at("28", beyond).is_none(),
            "TTL lapse reloads from the now-empty directory"
        );
    }

    #[test]
    fn test_save_leaves_cache_cold_until_first_read() {
        let dir = TempDir::new().unwrap();
        let now = fixed_now();
        let store = SnapshotStore::new(dir.path().to_path_buf(), 10);
        store.save_at(&sample_alerts(now), now).unwrap();

        // Nothing has been read yet, so nothing is cached: with the file
        // gone, the store has no data to answer from.
        for path in store.snapshot_files() {
            fs::remove_file(path).unwrap();
        }
        assert!(
            store.get_at("28", now).is_none(),
            "population is read-through, not part of save"
        );
    }

    #[test]
    fn test_invalidate_all_forces_disk_reload() {
        let dir = TempDir::new().unwrap();
        let now = fixed_now();
        let store = SnapshotStore::new(dir.path().to_path_buf(), 10);
        store.save_at(&sample_alerts(now), now).unwrap();
        assert!(store.get_at("28", now).is_some());
        for path in store.snapshot_files() {
            fs::remove_file(path).unwrap();
        }

        assert!(
            store.get_at("28", now).is_some(),
            "cache still answers after the file is gone"
        );
        store.invalidate_all();
        assert!(store.get_at("28", now).is_none(), "invalidate drops the cache");
    }

    #[test]
    fn test_latest_timestamp_comes_from_file_name() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().to_path_buf(), 10);
        let now = fixed_now();
        store.save_at(&sample_alerts(now), now).unwrap();
        assert_eq!(store.latest_timestamp(), Some(now));
    }

    #[test]
    fn test_missing_directory_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("nunca_creado"), 10);
        assert!(store.get_at("28", fixed_now()).is_none());
        assert!(store.latest_timestamp().is_none());
        assert!(store.all_at(fixed_now()).is_empty());
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alertas-2026-03-14-09-30-00.csv");
        let contents = format!(
            "{}\n28,Madrid,naranja,Viento,2026-03-14T09:30:00+00:00\n\
             99,Desconocida,naranja,Viento,2026-03-14T09:30:00+00:00\n\
             08,Barcelona,morado,Lluvia,2026-03-14T09:30:00+00:00\n\
             41,Sevilla,verde,null\n",
            SNAPSHOT_HEADER
        );
        fs::write(&path, contents).unwrap();

        let store = SnapshotStore::new(dir.path().to_path_buf(), 10);
        let entries = store.all_at(fixed_now());
        assert_eq!(entries.len(), 1, "only the well-formed row survives");
        assert!(entries.contains_key("28"));
    }

    #[test]
    fn test_phenomenon_is_kept_to_one_csv_cell() {
        assert_eq!(
            sanitize_phenomenon("Lluvias, chubascos\ny tormentas"),
            "Lluvias; chubascos y tormentas"
        );
        let dir = TempDir::new().unwrap();
        let now = fixed_now();
        let store = SnapshotStore::new(dir.path().to_path_buf(), 10);
        let mut alerts = sample_alerts(now);
        alerts.insert(
            "46".to_string(),
            ProvinceAlert {
                level: RiskLevel::Extreme,
                phenomenon: Some("Lluvias, chubascos".to_string()),
                observed_at: now,
            },
        );
        store.save_at(&alerts, now).unwrap();

        let fresh = SnapshotStore::new(dir.path().to_path_buf(), 10);
        let alert = fresh.get_at("46", now).unwrap();
        assert_eq!(alert.phenomenon.as_deref(), Some("Lluvias; chubascos"));
        assert_eq!(alert.level, RiskLevel::Extreme);
    }
}
