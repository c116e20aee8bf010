use chrono::Utc;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::analysis::{self, DiffSummary};
use crate::config::AppConfig;
use crate::error::Error;
use crate::hasher::{self, checksum, HashAlgorithm, Verification};
use crate::model::{
    DiffEntry, DuplicateGroup, FileRecord, ResultLabel, ScanEvent, Snapshot, SnapshotEntry,
    SnapshotId, VerificationStats,
};
use crate::progress::{ScanMetrics, ScanProgress, ScanSummary};
use crate::scanner::{self, NoiseFilter};
use crate::storage::Database;
use crate::watchdog::Watchdog;

/// Cap used by [`ScanEngine::file_timeline`] when the caller has no preference.
pub const DEFAULT_TIMELINE_LIMIT: usize = 20;

/// Number of distinct roots whose last completed scan is kept in memory for
/// snapshotting and comparison.
const RETAINED_SCANS: usize = 2;

/// Owns the single background scan, its progress channel, and the watchdog.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct ScanEngine {
    inner: Arc<EngineInner>,
}

pub(crate) struct EngineInner {
    config: AppConfig,
    db: Arc<Database>,
    state: Mutex<EngineState>,
    progress_tx: Sender<ScanProgress>,
    progress_rx: Receiver<ScanProgress>,
    watchdog: Mutex<Option<Watchdog>>,
    next_scan_id: AtomicU64,
}

struct EngineState {
    active_scan: Option<u64>,
    /// Root of the scan in flight, or of the most recent one.
    current_root: Option<PathBuf>,
    algorithm: HashAlgorithm,
    noise_filter: NoiseFilter,
    files_scanned: u64,
    bytes_scanned: u64,
    /// Most recently completed scan last, one entry per root.
    completed: VecDeque<(PathBuf, CompletedScan)>,
}

impl EngineState {
    fn completed_for(&self, root: &Path) -> Option<&CompletedScan> {
        self.completed
            .iter()
            .find(|(scanned, _)| scanned == root)
            .map(|(_, scan)| scan)
    }

    fn retain_completed(&mut self, root: PathBuf, scan: CompletedScan) {
        self.completed.retain(|(scanned, _)| *scanned != root);
        self.completed.push_back((root, scan));
        while self.completed.len() > RETAINED_SCANS {
            if let Some((evicted, _)) = self.completed.pop_front() {
                debug!("Dropping in-memory results of {}", evicted.display());
            }
        }
    }
}

#[derive(Clone)]
struct CompletedScan {
    algorithm: HashAlgorithm,
    records: Arc<[FileRecord]>,
}

/// Point-in-time view of the engine for status displays.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub is_scanning: bool,
    pub current_root: Option<PathBuf>,
    pub files_scanned: u64,
    pub bytes_scanned: u64,
    pub algorithm: HashAlgorithm,
    pub noise_filter: bool,
    pub watchdog_enabled: bool,
}

/// Result of one watchdog timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Started(u64),
    SkippedBusy,
    NoRoot,
}

#[derive(Debug, Clone)]
pub struct Comparison {
    pub snapshot: Snapshot,
    pub entries: Vec<DiffEntry>,
    pub summary: DiffSummary,
}

impl ScanEngine {
    pub fn new(config: AppConfig, db: Database) -> Self {
        let (progress_tx, progress_rx) = crossbeam_channel::bounded(config.progress_capacity);
        let state = EngineState {
            active_scan: None,
            current_root: None,
            algorithm: config.algorithm,
            noise_filter: NoiseFilter::from_config(&config),
            files_scanned: 0,
            bytes_scanned: 0,
            completed: VecDeque::with_capacity(RETAINED_SCANS + 1),
        };
        Self {
            inner: Arc::new(EngineInner {
                config,
                db: Arc::new(db),
                state: Mutex::new(state),
                progress_tx,
                progress_rx,
                watchdog: Mutex::new(None),
                next_scan_id: AtomicU64::new(1),
            }),
        }
    }

    /// Open (or create) the database named by `config.db_path`.
    pub fn open(config: AppConfig) -> Result<Self, Error> {
        let db = Database::open(&config.db_path)?;
        Ok(Self::new(config, db))
    }

    pub(crate) fn from_inner(inner: Arc<EngineInner>) -> Self {
        Self { inner }
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn database(&self) -> &Database {
        &self.inner.db
    }

    /// Receiver for scan notifications. Every clone competes for the same
    /// messages. The channel is bounded: a scan blocks while it is full, so a
    /// caller that starts scans must keep draining it.
    pub fn progress(&self) -> Receiver<ScanProgress> {
        self.inner.progress_rx.clone()
    }

    // ── Scanning ─────────────────────────────────────────────────

    /// Start a background scan of `root`. Returns the id carried by every
    /// notification of that scan, or [`Error::AlreadyRunning`].
    pub fn start_scan(&self, root: impl Into<PathBuf>) -> Result<u64, Error> {
        let root = root.into();
        let scan_id;
        let algorithm;
        let filter;
        {
            let mut state = self.inner.state.lock();
            if state.active_scan.is_some() {
                debug!("Rejecting scan of {}: a scan is running", root.display());
                return Err(Error::AlreadyRunning);
            }
            scan_id = self.inner.next_scan_id.fetch_add(1, Ordering::Relaxed);
            state.active_scan = Some(scan_id);
            state.current_root = Some(root.clone());
            state.files_scanned = 0;
            state.bytes_scanned = 0;
            algorithm = state.algorithm;
            filter = state.noise_filter.clone();
        }

        let inner = Arc::clone(&self.inner);
        let job = ScanJob {
            scan_id,
            root,
            algorithm,
            filter,
        };
        let spawned = thread::Builder::new()
            .name(format!("hashkeeper-scan-{scan_id}"))
            .spawn(move || run_scan(inner, job));

        match spawned {
            Ok(_) => Ok(scan_id),
            Err(e) => {
                self.inner.finish(scan_id);
                Err(Error::Io(e))
            }
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.inner.state.lock().active_scan.is_some()
    }

    pub fn status(&self) -> EngineStatus {
        let watchdog_enabled = self.inner.watchdog.lock().is_some();
        let state = self.inner.state.lock();
        EngineStatus {
            is_scanning: state.active_scan.is_some(),
            current_root: state.current_root.clone(),
            files_scanned: state.files_scanned,
            bytes_scanned: state.bytes_scanned,
            algorithm: state.algorithm,
            noise_filter: state.noise_filter.is_enabled(),
            watchdog_enabled,
        }
    }

    /// Records of the most recent completed scan of exactly `root`. Only the
    /// last two roots scanned are kept.
    pub fn last_scan(&self, root: &Path) -> Option<Arc<[FileRecord]>> {
        self.inner
            .state
            .lock()
            .completed_for(root)
            .map(|scan| Arc::clone(&scan.records))
    }

    // ── Settings ─────────────────────────────────────────────────

    /// Takes effect from the next scan.
    pub fn set_algorithm(&self, algorithm: impl Into<HashAlgorithm>) {
        let algorithm = algorithm.into();
        self.inner.state.lock().algorithm = algorithm;
        info!("Hash algorithm set to {}", algorithm);
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.inner.state.lock().algorithm
    }

    /// Takes effect from the next scan.
    pub fn set_noise_filter(&self, enabled: bool) {
        self.inner.state.lock().noise_filter.set_enabled(enabled);
        info!("Noise filter {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn set_watchdog(&self, enabled: bool) -> Result<(), Error> {
        let mut slot = self.inner.watchdog.lock();
        match (enabled, slot.is_some()) {
            (true, false) => {
                let interval = self.inner.config.watchdog_interval();
                *slot = Some(Watchdog::spawn(Arc::downgrade(&self.inner), interval)?);
                info!("Watchdog enabled (every {:?})", interval);
            }
            (false, true) => {
                let watchdog = slot.take();
                // Release the slot before joining the timer thread.
                drop(slot);
                if let Some(watchdog) = watchdog {
                    watchdog.stop();
                }
                info!("Watchdog disabled");
            }
            _ => {}
        }
        Ok(())
    }

    /// One watchdog firing: re-scan the last root unless a scan is running.
    /// Never queues and never reports `AlreadyRunning`.
    pub fn watchdog_tick(&self) -> TickOutcome {
        let root = {
            let state = self.inner.state.lock();
            if state.active_scan.is_some() {
                debug!("Watchdog tick skipped: scan in progress");
                return TickOutcome::SkippedBusy;
            }
            match &state.current_root {
                Some(root) => root.clone(),
                None => return TickOutcome::NoRoot,
            }
        };
        match self.start_scan(root) {
            Ok(scan_id) => {
                debug!("Watchdog started scan {}", scan_id);
                TickOutcome::Started(scan_id)
            }
            Err(Error::AlreadyRunning) => TickOutcome::SkippedBusy,
            Err(e) => {
                warn!("Watchdog could not start a scan: {}", e);
                TickOutcome::SkippedBusy
            }
        }
    }

    // ── History ──────────────────────────────────────────────────

    pub fn query_history(
        &self,
        filter: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ScanEvent>, Error> {
        Ok(self.inner.db.query_history(filter, limit)?)
    }

    /// Events for one path, oldest first.
    pub fn file_timeline(&self, path: &Path, limit: usize) -> Result<Vec<ScanEvent>, Error> {
        Ok(self.inner.db.events_for_path(path, limit)?)
    }

    pub fn verification_stats(&self) -> Result<VerificationStats, Error> {
        let counts = self.inner.db.label_counts()?;
        Ok(analysis::verification_stats(counts))
    }

    pub fn list_duplicates(&self) -> Result<Vec<DuplicateGroup>, Error> {
        let events = self.inner.db.all_events()?;
        let groups = analysis::find_duplicates(&events, self.inner.config.duplicate_sample_size);
        debug!("{} duplicate groups across {} events", groups.len(), events.len());
        Ok(groups)
    }

    // ── Baselines ────────────────────────────────────────────────

    /// Save the most recent completed scan of `root` as a new baseline.
    pub fn create_snapshot(&self, description: &str, root: &Path) -> Result<SnapshotId, Error> {
        let scan = self.completed_scan(root)?;
        let id = self
            .inner
            .db
            .create_snapshot(description, root, scan.algorithm, &scan.records)?;
        info!(
            "Snapshot {} '{}' saved for {} ({} files)",
            id,
            description,
            root.display(),
            scan.records.len()
        );
        Ok(id)
    }

    pub fn compare_to_baseline(&self, root: &Path) -> Result<Vec<DiffEntry>, Error> {
        Ok(self.compare_with_summary(root)?.entries)
    }

    /// Diff the most recent completed scan of `root` against its latest
    /// baseline.
    pub fn compare_with_summary(&self, root: &Path) -> Result<Comparison, Error> {
        let baseline = self
            .inner
            .db
            .latest_baseline(root)?
            .ok_or_else(|| Error::NoBaseline(root.to_path_buf()))?;
        let scan = self.completed_scan(root)?;
        if scan.algorithm != baseline.snapshot.algorithm {
            return Err(Error::AlgorithmMismatch {
                baseline: baseline.snapshot.algorithm,
                current: scan.algorithm,
            });
        }

        let entries = analysis::diff(&scan.records, &baseline);
        let summary = DiffSummary::from_entries(&entries, scan.records.len());
        info!(
            "Compared {} against snapshot {}: {} added, {} modified, {} removed",
            root.display(),
            baseline.snapshot.id,
            summary.added,
            summary.modified,
            summary.removed
        );
        Ok(Comparison {
            snapshot: baseline.snapshot,
            entries,
            summary,
        })
    }

    pub fn list_snapshots(&self, root: Option<&Path>) -> Result<Vec<Snapshot>, Error> {
        Ok(self.inner.db.list_snapshots(root)?)
    }

    pub fn snapshot_entries(&self, id: SnapshotId) -> Result<Vec<SnapshotEntry>, Error> {
        Ok(self.inner.db.snapshot_entries(id)?)
    }

    pub fn delete_snapshot(&self, id: SnapshotId) -> Result<bool, Error> {
        Ok(self.inner.db.delete_snapshot(id)?)
    }

    fn completed_scan(&self, root: &Path) -> Result<CompletedScan, Error> {
        self.inner
            .state
            .lock()
            .completed_for(root)
            .cloned()
            .ok_or_else(|| Error::NoPriorScan(root.to_path_buf()))
    }

    // ── Single-file actions ──────────────────────────────────────

    /// Hash one file with the current algorithm and log a `Computed` event.
    pub fn compute_file(&self, path: &Path) -> Result<FileRecord, Error> {
        let algorithm = self.algorithm();
        let record = hash_record(path, algorithm)?;
        self.inner
            .db
            .append_event(&ScanEvent::new(&record, ResultLabel::Computed, algorithm))?;
        Ok(record)
    }

    /// Hash several files in parallel. Results keep input order; the
    /// successful ones are logged as `Computed` in one batch.
    pub fn compute_files(
        &self,
        paths: &[PathBuf],
    ) -> Result<Vec<Result<FileRecord, Error>>, Error> {
        let algorithm = self.algorithm();
        let results: Vec<Result<FileRecord, Error>> = paths
            .par_iter()
            .map(|path| hash_record(path, algorithm))
            .collect();

        let events: Vec<ScanEvent> = results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .map(|record| ScanEvent::new(record, ResultLabel::Computed, algorithm))
            .collect();
        self.inner.db.append_events(&events)?;
        Ok(results)
    }

    /// Hash `path`, write the bare digest to `dest`, log a `SavedHash` event.
    pub fn save_checksum(&self, path: &Path, dest: &Path) -> Result<FileRecord, Error> {
        let algorithm = self.algorithm();
        let record = hash_record(path, algorithm)?;
        checksum::write_checksum(dest, &record.hash)?;
        self.inner
            .db
            .append_event(&ScanEvent::new(&record, ResultLabel::SavedHash, algorithm))?;
        info!("Saved {} checksum of {} to {}", algorithm, path.display(), dest.display());
        Ok(record)
    }

    /// Check `path` against the digest stored in `checksum_file` and log the
    /// outcome. The algorithm is inferred from the stored digest's length
    /// when it differs from the current one.
    pub fn verify_checksum(
        &self,
        path: &Path,
        checksum_file: &Path,
    ) -> Result<Verification, Error> {
        let expected = checksum::read_expected_digest(checksum_file)?;
        let algorithm = checksum::algorithm_for_digest(&expected, self.algorithm());
        let record = hash_record(path, algorithm)?;
        let matched = checksum::digests_match(&expected, &record.hash);
        let label = if matched {
            ResultLabel::VerifiedMatch
        } else {
            ResultLabel::VerifiedFail
        };
        self.inner
            .db
            .append_event(&ScanEvent::new(&record, label, algorithm))?;
        if matched {
            info!("Verified {}: MATCH", path.display());
        } else {
            warn!("Verified {}: FAIL", path.display());
        }
        Ok(Verification {
            path: record.path,
            algorithm,
            expected,
            actual: record.hash,
            matched,
        })
    }
}

impl EngineInner {
    /// Clear the running flag if it still belongs to `scan_id`.
    fn finish(&self, scan_id: u64) {
        let mut state = self.state.lock();
        if state.active_scan == Some(scan_id) {
            state.active_scan = None;
        }
    }
}

fn hash_record(path: &Path, algorithm: HashAlgorithm) -> Result<FileRecord, Error> {
    let metadata = fs::metadata(path).map_err(|source| Error::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let hash = hasher::digest_file(path, algorithm)?;
    Ok(FileRecord {
        path: path.to_path_buf(),
        hash,
        extension: scanner::extension_of(path),
        size_bytes: metadata.len(),
        observed_at: Utc::now(),
    })
}

// ── Background scan ──────────────────────────────────────────────

struct ScanJob {
    scan_id: u64,
    root: PathBuf,
    algorithm: HashAlgorithm,
    filter: NoiseFilter,
}

/// Clears the running flag if the scan thread unwinds before finishing.
struct ActiveScanGuard<'a> {
    inner: &'a EngineInner,
    scan_id: u64,
}

impl Drop for ActiveScanGuard<'_> {
    fn drop(&mut self) {
        self.inner.finish(self.scan_id);
    }
}

/// Buffers `AutoScan` events and writes them to history in batches.
struct HistoryBatch<'a> {
    db: &'a Database,
    tx: &'a Sender<ScanProgress>,
    scan_id: u64,
    pending: Vec<ScanEvent>,
    capacity: usize,
    failed: u64,
}

impl HistoryBatch<'_> {
    fn push(&mut self, event: ScanEvent) {
        self.pending.push(event);
        if self.pending.len() >= self.capacity {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        if let Err(e) = self.db.append_events(&self.pending) {
            let lost = self.pending.len() as u64;
            self.failed += lost;
            warn!("History append of {} events failed: {}", lost, e);
            let _ = self.tx.send(ScanProgress::Warning {
                scan_id: self.scan_id,
                message: format!("history may be incomplete: {lost} events not saved ({e})"),
            });
        }
        self.pending.clear();
    }
}

fn run_scan(inner: Arc<EngineInner>, job: ScanJob) {
    let ScanJob {
        scan_id,
        root,
        algorithm,
        filter,
    } = job;
    let _guard = ActiveScanGuard {
        inner: &inner,
        scan_id,
    };
    let tx = &inner.progress_tx;
    let started = Instant::now();
    info!("Scan {} of {} started ({})", scan_id, root.display(), algorithm);
    let _ = tx.send(ScanProgress::Started {
        scan_id,
        root: root.clone(),
    });

    let mut history = HistoryBatch {
        db: &inner.db,
        tx,
        scan_id,
        pending: Vec::with_capacity(inner.config.append_batch_size.max(1)),
        capacity: inner.config.append_batch_size.max(1),
        failed: 0,
    };
    let mut records = Vec::new();
    let mut skipped = 0u64;

    for item in scanner::walk(&root, &filter) {
        let descriptor = match item {
            Ok(d) if d.is_directory => continue,
            Ok(d) => d,
            Err(e) => {
                skipped += 1;
                let _ = tx.send(ScanProgress::Skipped {
                    scan_id,
                    path: skipped_path(&e, &root),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let hash = match hasher::digest_file(&descriptor.path, algorithm) {
            Ok(hash) => hash,
            Err(e) => {
                skipped += 1;
                warn!("Skipping {}: {}", descriptor.path.display(), e);
                let _ = tx.send(ScanProgress::Skipped {
                    scan_id,
                    path: descriptor.path,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let record = FileRecord {
            extension: scanner::extension_of(&descriptor.path),
            path: descriptor.path,
            hash,
            size_bytes: descriptor.size,
            observed_at: Utc::now(),
        };
        let metrics = {
            let mut state = inner.state.lock();
            state.files_scanned += 1;
            state.bytes_scanned += record.size_bytes;
            ScanMetrics::compute(state.files_scanned, state.bytes_scanned, started)
        };

        history.push(ScanEvent::new(&record, ResultLabel::AutoScan, algorithm));
        let _ = tx.send(ScanProgress::File {
            scan_id,
            record: record.clone(),
            metrics,
        });
        records.push(record);
    }
    history.flush();

    let total_bytes = records.iter().map(|r| r.size_bytes).sum();
    let summary = ScanSummary {
        root: root.clone(),
        elapsed: started.elapsed(),
        total_files: records.len() as u64,
        total_bytes,
        skipped,
        persistence_failures: history.failed,
    };
    info!(
        "Scan {} of {} complete in {:.2}s: {} files, {} bytes, {} skipped",
        scan_id,
        root.display(),
        summary.elapsed.as_secs_f64(),
        summary.total_files,
        summary.total_bytes,
        summary.skipped
    );

    {
        let mut state = inner.state.lock();
        state.retain_completed(
            root,
            CompletedScan {
                algorithm,
                records: records.into(),
            },
        );
    }
    inner.finish(scan_id);
    let _ = tx.send(ScanProgress::Complete { scan_id, summary });
}

fn skipped_path(err: &Error, root: &Path) -> PathBuf {
    match err {
        Error::Unreadable { path, .. } | Error::DirectoryAccessDenied { path, .. } => path.clone(),
        _ => root.to_path_buf(),
    }
}
