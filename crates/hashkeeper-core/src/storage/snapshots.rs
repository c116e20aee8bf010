use chrono::Utc;
use rusqlite::{params, OptionalExtension, Result, Row};
use std::path::Path;
use tracing::debug;

use super::sqlite::{path_key, Database, StoredPath};
use crate::hasher::HashAlgorithm;
use crate::model::{Baseline, FileRecord, Snapshot, SnapshotEntry, SnapshotId};

const SNAPSHOT_COLUMNS: &str = "id, created_at, description, root_dir, algorithm";

fn row_to_snapshot(row: &Row<'_>) -> Result<Snapshot> {
    Ok(Snapshot {
        id: row.get(0)?,
        created_at: row.get(1)?,
        description: row.get(2)?,
        root_dir: row.get::<_, StoredPath>(3)?.0,
        algorithm: row.get(4)?,
    })
}

impl Database {
    // ── Snapshot capture ─────────────────────────────────────────

    /// Record a baseline for `root_dir`. The snapshot row and all of its
    /// entries are written in one transaction.
    pub fn create_snapshot(
        &self,
        description: &str,
        root_dir: &Path,
        algorithm: HashAlgorithm,
        records: &[FileRecord],
    ) -> Result<SnapshotId> {
        let mut conn = self.connection();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO snapshot (created_at, description, root_dir, algorithm) \
             VALUES (?1, ?2, ?3, ?4)",
            params![Utc::now(), description, path_key(root_dir), algorithm],
        )?;
        let snapshot_id = tx.last_insert_rowid();
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO snapshot_entry (snapshot_id, path, hash) VALUES (?1, ?2, ?3)",
            )?;
            for record in records {
                stmt.execute(params![snapshot_id, path_key(&record.path), record.hash])?;
            }
        }
        tx.commit()?;
        debug!(
            "Created snapshot {} for {} with {} entries",
            snapshot_id,
            root_dir.display(),
            records.len()
        );
        Ok(snapshot_id)
    }

    // ── Snapshot lookup ──────────────────────────────────────────

    /// Most recently created snapshot whose root matches `root_dir` exactly.
    pub fn latest_snapshot(&self, root_dir: &Path) -> Result<Option<Snapshot>> {
        let conn = self.connection();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshot WHERE root_dir = ?1 ORDER BY id DESC LIMIT 1"
        ))?;
        stmt.query_row(params![path_key(root_dir)], row_to_snapshot)
            .optional()
    }

    pub fn snapshot_entries(&self, snapshot_id: SnapshotId) -> Result<Vec<SnapshotEntry>> {
        let conn = self.connection();
        let mut stmt = conn.prepare_cached(
            "SELECT snapshot_id, path, hash FROM snapshot_entry \
             WHERE snapshot_id = ?1 ORDER BY path",
        )?;
        let rows = stmt.query_map(params![snapshot_id], |row| {
            Ok(SnapshotEntry {
                snapshot_id: row.get(0)?,
                path: row.get::<_, StoredPath>(1)?.0,
                hash: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>>>()
    }

    /// Latest snapshot for `root_dir` along with its entries.
    pub fn latest_baseline(&self, root_dir: &Path) -> Result<Option<Baseline>> {
        let Some(snapshot) = self.latest_snapshot(root_dir)? else {
            return Ok(None);
        };
        let entries = self.snapshot_entries(snapshot.id)?;
        Ok(Some(Baseline { snapshot, entries }))
    }

    /// Snapshots newest first, optionally restricted to one root.
    pub fn list_snapshots(&self, root_dir: Option<&Path>) -> Result<Vec<Snapshot>> {
        let root = root_dir.map(path_key);
        let conn = self.connection();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshot \
             WHERE ?1 IS NULL OR root_dir = ?1 ORDER BY id DESC"
        ))?;
        let rows = stmt.query_map(params![root], row_to_snapshot)?;
        rows.collect::<Result<Vec<_>>>()
    }

    pub fn snapshot_entry_count(&self, snapshot_id: SnapshotId) -> Result<u64> {
        let count: i64 = self.connection().query_row(
            "SELECT COUNT(*) FROM snapshot_entry WHERE snapshot_id = ?1",
            params![snapshot_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    // ── Snapshot removal ─────────────────────────────────────────

    /// Delete a snapshot and, by cascade, its entries. Returns whether a
    /// snapshot with that id existed.
    pub fn delete_snapshot(&self, snapshot_id: SnapshotId) -> Result<bool> {
        let deleted = self
            .connection()
            .execute("DELETE FROM snapshot WHERE id = ?1", params![snapshot_id])?;
        debug!("Deleted snapshot {} ({} rows)", snapshot_id, deleted);
        Ok(deleted > 0)
    }
}
