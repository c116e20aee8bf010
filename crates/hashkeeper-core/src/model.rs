use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::hasher::HashAlgorithm;

/// One hashed file, produced by a scan or a single-file compute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub hash: String,
    pub extension: String,
    pub size_bytes: u64,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultLabel {
    Computed,
    AutoScan,
    SavedHash,
    VerifiedMatch,
    VerifiedFail,
}

impl ResultLabel {
    pub const ALL: [ResultLabel; 5] = [
        ResultLabel::Computed,
        ResultLabel::AutoScan,
        ResultLabel::SavedHash,
        ResultLabel::VerifiedMatch,
        ResultLabel::VerifiedFail,
    ];

    /// Label text as stored in the history table.
    pub fn as_str(self) -> &'static str {
        match self {
            ResultLabel::Computed => "Computed",
            ResultLabel::AutoScan => "Auto-Scan",
            ResultLabel::SavedHash => "Saved Hash",
            ResultLabel::VerifiedMatch => "Verified: MATCH",
            ResultLabel::VerifiedFail => "Verified: FAIL",
        }
    }
}

impl fmt::Display for ResultLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLabel(pub String);

impl fmt::Display for UnknownLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown result label '{}'", self.0)
    }
}

impl std::error::Error for UnknownLabel {}

impl FromStr for ResultLabel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResultLabel::ALL
            .into_iter()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| UnknownLabel(s.to_string()))
    }
}

/// A row of the append-only history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEvent {
    /// Insertion sequence; `None` until the event has been persisted.
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub path: PathBuf,
    pub hash: String,
    pub label: ResultLabel,
    pub algorithm: HashAlgorithm,
}

impl ScanEvent {
    pub fn new(record: &FileRecord, label: ResultLabel, algorithm: HashAlgorithm) -> Self {
        Self {
            id: None,
            timestamp: record.observed_at,
            path: record.path.clone(),
            hash: record.hash.clone(),
            label,
            algorithm,
        }
    }
}

pub type SnapshotId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub created_at: DateTime<Utc>,
    pub description: String,
    pub root_dir: PathBuf,
    pub algorithm: HashAlgorithm,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub snapshot_id: SnapshotId,
    pub path: PathBuf,
    pub hash: String,
}

/// A snapshot together with its path→hash entries.
#[derive(Debug, Clone)]
pub struct Baseline {
    pub snapshot: Snapshot,
    pub entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiffStatus {
    Added,
    Modified,
    Removed,
}

impl fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiffStatus::Added => "added",
            DiffStatus::Modified => "modified",
            DiffStatus::Removed => "removed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub status: DiffStatus,
    pub path: PathBuf,
    pub baseline_hash: Option<String>,
    pub current_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub hash: String,
    pub count: usize,
    pub sample_paths: Vec<PathBuf>,
    /// More paths share this hash than `sample_paths` shows.
    pub has_more: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationStats {
    pub computed: u64,
    pub auto_scan: u64,
    pub saved_hash: u64,
    pub verified_match: u64,
    pub verified_fail: u64,
}

impl VerificationStats {
    pub fn total(&self) -> u64 {
        self.computed + self.auto_scan + self.saved_hash + self.verified_match + self.verified_fail
    }

    pub fn get(&self, label: ResultLabel) -> u64 {
        match label {
            ResultLabel::Computed => self.computed,
            ResultLabel::AutoScan => self.auto_scan,
            ResultLabel::SavedHash => self.saved_hash,
            ResultLabel::VerifiedMatch => self.verified_match,
            ResultLabel::VerifiedFail => self.verified_fail,
        }
    }

    pub(crate) fn add(&mut self, label: ResultLabel, count: u64) {
        let slot = match label {
            ResultLabel::Computed => &mut self.computed,
            ResultLabel::AutoScan => &mut self.auto_scan,
            ResultLabel::SavedHash => &mut self.saved_hash,
            ResultLabel::VerifiedMatch => &mut self.verified_match,
            ResultLabel::VerifiedFail => &mut self.verified_fail,
        };
        *slot += count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_text_round_trips() {
        for label in ResultLabel::ALL {
            assert_eq!(label.as_str().parse::<ResultLabel>().unwrap(), label);
        }
        assert!("Verified".parse::<ResultLabel>().is_err());
    }

    #[test]
    fn test_stats_total() {
        let mut stats = VerificationStats::default();
        stats.add(ResultLabel::AutoScan, 3);
        stats.add(ResultLabel::VerifiedFail, 1);
        assert_eq!(stats.total(), 4);
        assert_eq!(stats.get(ResultLabel::AutoScan), 3);
    }
}
