use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::model::FileRecord;

/// Running throughput for the scan in flight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScanMetrics {
    pub files_scanned: u64,
    pub bytes_scanned: u64,
    pub elapsed: Duration,
    pub files_per_sec: f64,
    pub mb_per_sec: f64,
}

impl ScanMetrics {
    pub fn compute(files_scanned: u64, bytes_scanned: u64, started: Instant) -> Self {
        let elapsed = started.elapsed();
        let secs = elapsed.as_secs_f64();
        let (files_per_sec, mb_per_sec) = if secs > 0.0 {
            (
                files_scanned as f64 / secs,
                bytes_scanned as f64 / (1024.0 * 1024.0) / secs,
            )
        } else {
            (0.0, 0.0)
        };
        Self {
            files_scanned,
            bytes_scanned,
            elapsed,
            files_per_sec,
            mb_per_sec,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanSummary {
    pub root: PathBuf,
    pub elapsed: Duration,
    pub total_files: u64,
    pub total_bytes: u64,
    /// Files and directories that could not be read.
    pub skipped: u64,
    /// History appends that failed; when non-zero the history is incomplete.
    pub persistence_failures: u64,
}

/// Notifications from the background scan, in walker order. `Complete` is
/// always the last message of a scan.
#[derive(Debug, Clone)]
pub enum ScanProgress {
    Started {
        scan_id: u64,
        root: PathBuf,
    },
    File {
        scan_id: u64,
        record: FileRecord,
        metrics: ScanMetrics,
    },
    Skipped {
        scan_id: u64,
        path: PathBuf,
        reason: String,
    },
    /// Non-fatal trouble such as a failed history append.
    Warning {
        scan_id: u64,
        message: String,
    },
    Complete {
        scan_id: u64,
        summary: ScanSummary,
    },
}

impl ScanProgress {
    pub fn scan_id(&self) -> u64 {
        match self {
            ScanProgress::Started { scan_id, .. }
            | ScanProgress::File { scan_id, .. }
            | ScanProgress::Skipped { scan_id, .. }
            | ScanProgress::Warning { scan_id, .. }
            | ScanProgress::Complete { scan_id, .. } => *scan_id,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, ScanProgress::Complete { .. })
    }
}
