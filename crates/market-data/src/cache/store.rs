//! File-backed cache store.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, warn};

use super::csv_format::{self, GRANULARITY};
use super::CacheError;
use crate::models::{normalize_bars, DailyBar, Freshness};

/// One snapshot loaded from disk.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Granularity tag of the snapshot, part of the key.
    pub granularity: &'static str,
    pub written_at: DateTime<Utc>,
    pub rows: Vec<DailyBar>,
    pub path: PathBuf,
}

impl CacheEntry {
    /// Whether this entry's range contains `[start, end]`.
    pub fn covers(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start <= start && self.end >= end
    }

    /// Whole days since the entry was written, never negative.
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.written_at).num_days().max(0)
    }
}

/// Snapshot header read from the directory listing, before rows are loaded.
struct Candidate {
    symbol: String,
    start: NaiveDate,
    end: NaiveDate,
    written_at: DateTime<Utc>,
    path: PathBuf,
}

/// Stores snapshots as CSV files under one directory.
///
/// Reads take no lock. Writes for the same key are serialized and land
/// atomically via rename, so readers never observe a partial file.
pub struct CacheStore {
    dir: PathBuf,
    max_age: chrono::Duration,
    write_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    tmp_seq: AtomicU64,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>, max_cache_age_days: u32) -> Self {
        Self {
            dir: dir.into(),
            max_age: chrono::Duration::days(i64::from(max_cache_age_days)),
            write_locks: Mutex::new(HashMap::new()),
            tmp_seq: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic path for a key.
    pub fn path_for(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> PathBuf {
        self.dir.join(csv_format::file_name(symbol, start, end))
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Most recently written entry whose range covers `[start, end]` and has
    /// rows inside it, clipped to the request. Unreadable files are skipped.
    pub fn get(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<CacheEntry>, CacheError> {
        let mut candidates: Vec<Candidate> = self
            .scan(symbol)?
            .into_iter()
            .filter(|c| c.start <= start && c.end >= end)
            .collect();
        candidates.sort_by(|a, b| b.written_at.cmp(&a.written_at));

        for candidate in candidates {
            match self.load(candidate) {
                Ok(mut entry) => {
                    entry.rows = normalize_bars(entry.rows, start, end);
                    if entry.rows.is_empty() {
                        debug!(
                            "{} has no rows in [{}..{}], trying older entries",
                            entry.path.display(),
                            start,
                            end
                        );
                        continue;
                    }
                    debug!(
                        "Cache hit for {} [{}..{}] from {}",
                        symbol,
                        start,
                        end,
                        entry.path.display()
                    );
                    return Ok(Some(entry));
                }
                Err(e) => warn!("Ignoring unreadable cache file: {}", e),
            }
        }
        Ok(None)
    }

    /// All readable entries for `symbol`, ordered by start date then write time.
    pub fn list(&self, symbol: &str) -> Result<Vec<CacheEntry>, CacheError> {
        let mut entries: Vec<CacheEntry> = self
            .scan(symbol)?
            .into_iter()
            .filter_map(|candidate| match self.load(candidate) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Ignoring unreadable cache file: {}", e);
                    None
                }
            })
            .collect();
        entries.sort_by(|a, b| (a.start, a.written_at).cmp(&(b.start, b.written_at)));
        Ok(entries)
    }

    /// Whether `entry` is young enough to stand in for live data.
    pub fn is_fresh(&self, entry: &CacheEntry) -> bool {
        self.is_fresh_at(entry, Utc::now())
    }

    pub fn is_fresh_at(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now - entry.written_at <= self.max_age
    }

    pub fn freshness_at(&self, entry: &CacheEntry, now: DateTime<Utc>) -> Freshness {
        if self.is_fresh_at(entry, now) {
            Freshness::Fresh
        } else {
            Freshness::Stale {
                age_days: entry.age_days(now),
            }
        }
    }

    fn scan(&self, symbol: &str) -> Result<Vec<Candidate>, CacheError> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io(&self.dir, e)),
        };

        let mut out = Vec::new();
        for dirent in read_dir {
            let dirent = dirent.map_err(|e| CacheError::io(&self.dir, e))?;
            let name = dirent.file_name();
            let Some((file_symbol, start, end)) =
                name.to_str().and_then(csv_format::parse_file_name)
            else {
                continue;
            };
            if file_symbol != symbol {
                continue;
            }
            let path = dirent.path();
            let modified = dirent
                .metadata()
                .and_then(|m| m.modified())
                .map_err(|e| CacheError::io(&path, e))?;
            out.push(Candidate {
                symbol: file_symbol,
                start,
                end,
                written_at: DateTime::<Utc>::from(modified),
                path,
            });
        }
        Ok(out)
    }

    fn load(&self, candidate: Candidate) -> Result<CacheEntry, CacheError> {
        let file = File::open(&candidate.path).map_err(|e| CacheError::io(&candidate.path, e))?;
        let rows = csv_format::read_bars(
            BufReader::new(file),
            &candidate.path.display().to_string(),
        )?;
        Ok(CacheEntry {
            symbol: candidate.symbol,
            start: candidate.start,
            end: candidate.end,
            granularity: GRANULARITY,
            written_at: candidate.written_at,
            rows,
            path: candidate.path,
        })
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Overwrite the snapshot for the exact key, stamped with the current time.
    pub fn put(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        rows: &[DailyBar],
    ) -> Result<PathBuf, CacheError> {
        self.put_with_timestamp(symbol, start, end, rows, Utc::now())
    }

    /// Like [`put`](Self::put) with an explicit write time.
    pub fn put_with_timestamp(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        rows: &[DailyBar],
        written_at: DateTime<Utc>,
    ) -> Result<PathBuf, CacheError> {
        validate_symbol(symbol)?;
        if start > end {
            return Err(CacheError::InvalidKey(format!(
                "start {} is after end {}",
                start, end
            )));
        }

        let file_name = csv_format::file_name(symbol, start, end);
        let key_lock = self.key_lock(&file_name);
        let result = {
            let _guard = key_lock.lock().unwrap_or_else(|poisoned| {
                warn!("Cache write lock for {} was poisoned, recovering", file_name);
                poisoned.into_inner()
            });
            self.write_entry(&file_name, rows, written_at)
        };
        self.release_key_lock(&file_name, key_lock);
        result
    }

    /// Writes under the key lock: temp file, then rename over the target.
    fn write_entry(
        &self,
        file_name: &str,
        rows: &[DailyBar],
        written_at: DateTime<Utc>,
    ) -> Result<PathBuf, CacheError> {
        let target = self.dir.join(file_name);
        fs::create_dir_all(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;

        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .dir
            .join(format!(".{}.{}.{}.tmp", file_name, std::process::id(), seq));

        let result = write_snapshot(&tmp, rows, written_at.into())
            .and_then(|()| fs::rename(&tmp, &target).map_err(|e| CacheError::io(&target, e)));
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result?;

        debug!("Cached {} rows to {}", rows.len(), target.display());
        Ok(target)
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.write_locks.lock().unwrap_or_else(|poisoned| {
            warn!("Cache lock map was poisoned, recovering");
            poisoned.into_inner()
        });
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// Drops the map entry once no other writer holds or waits on it.
    fn release_key_lock(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.write_locks.lock().unwrap_or_else(|poisoned| {
            warn!("Cache lock map was poisoned, recovering");
            poisoned.into_inner()
        });
        // Clones are handed out under the map lock: two strong refs means
        // only the map and `lock` remain.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    fn lock_map(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        self.write_locks.lock().unwrap()
    }
}

fn write_snapshot(path: &Path, rows: &[DailyBar], written_at: SystemTime) -> Result<(), CacheError> {
    let file = File::create(path).map_err(|e| CacheError::io(path, e))?;
    csv_format::write_bars(BufWriter::new(&file), rows)?;
    file.sync_all().map_err(|e| CacheError::io(path, e))?;
    file.set_modified(written_at)
        .map_err(|e| CacheError::io(path, e))?;
    Ok(())
}

fn validate_symbol(symbol: &str) -> Result<(), CacheError> {
    if symbol.is_empty()
        || symbol.contains(['/', '\\'])
        || symbol.contains("..")
        || symbol.starts_with('.')
    {
        return Err(CacheError::InvalidKey(format!("symbol {:?}", symbol)));
    }
    Ok(())
}
