use ahash::AHashMap;
use serde::Serialize;
use std::path::Path;

use crate::model::{Baseline, DiffEntry, DiffStatus, FileRecord};

/// Classify every path of `current` against `baseline`.
///
/// Added and Modified entries come out in `current` order; Removed entries
/// follow, sorted by path. Unchanged paths are omitted.
pub fn diff(current: &[FileRecord], baseline: &Baseline) -> Vec<DiffEntry> {
    let mut remaining: AHashMap<&Path, &str> = baseline
        .entries
        .iter()
        .map(|e| (e.path.as_path(), e.hash.as_str()))
        .collect();

    let mut out = Vec::new();
    for record in current {
        match remaining.remove(record.path.as_path()) {
            None => out.push(DiffEntry {
                status: DiffStatus::Added,
                path: record.path.clone(),
                baseline_hash: None,
                current_hash: Some(record.hash.clone()),
            }),
            Some(old) if old != record.hash => out.push(DiffEntry {
                status: DiffStatus::Modified,
                path: record.path.clone(),
                baseline_hash: Some(old.to_string()),
                current_hash: Some(record.hash.clone()),
            }),
            Some(_) => {}
        }
    }

    let mut removed: Vec<(&Path, &str)> = remaining.into_iter().collect();
    removed.sort_unstable_by(|a, b| a.0.cmp(b.0));
    out.extend(removed.into_iter().map(|(path, hash)| DiffEntry {
        status: DiffStatus::Removed,
        path: path.to_path_buf(),
        baseline_hash: Some(hash.to_string()),
        current_hash: None,
    }));
    out
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
    pub unchanged: usize,
}

impl DiffSummary {
    /// `current_len` is the number of records the diff was computed from.
    pub fn from_entries(entries: &[DiffEntry], current_len: usize) -> Self {
        let mut summary = DiffSummary::default();
        for entry in entries {
            match entry.status {
                DiffStatus::Added => summary.added += 1,
                DiffStatus::Modified => summary.modified += 1,
                DiffStatus::Removed => summary.removed += 1,
            }
        }
        summary.unchanged = current_len.saturating_sub(summary.added + summary.modified);
        summary
    }

    pub fn is_clean(&self) -> bool {
        self.added == 0 && self.modified == 0 && self.removed == 0
    }
}
