use rusqlite::{params, Result, Row};
use std::path::Path;
use tracing::debug;

use super::sqlite::{clamp_limit, path_key, Database, StoredPath};
use crate::model::{ResultLabel, ScanEvent};

const EVENT_COLUMNS: &str = "id, timestamp, path, hash, result, algorithm";

fn row_to_event(row: &Row<'_>) -> Result<ScanEvent> {
    Ok(ScanEvent {
        id: Some(row.get(0)?),
        timestamp: row.get(1)?,
        path: row.get::<_, StoredPath>(2)?.0,
        hash: row.get(3)?,
        label: row.get(4)?,
        algorithm: row.get(5)?,
    })
}

impl Database {
    // ── Append ───────────────────────────────────────────────────

    pub fn append_event(&self, event: &ScanEvent) -> Result<i64> {
        let conn = self.connection();
        conn.execute(
            "INSERT INTO history (timestamp, path, hash, result, algorithm) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.timestamp,
                path_key(&event.path),
                event.hash,
                event.label,
                event.algorithm,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Append a batch in one transaction. Either every event lands or none do.
    pub fn append_events(&self, events: &[ScanEvent]) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection();
        let tx = conn.transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO history (timestamp, path, hash, result, algorithm) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for event in events {
                count += stmt.execute(params![
                    event.timestamp,
                    path_key(&event.path),
                    event.hash,
                    event.label,
                    event.algorithm,
                ])?;
            }
        }
        tx.commit()?;
        debug!("Appended {} history events", count);
        Ok(count)
    }

    // ── Queries ──────────────────────────────────────────────────

    /// Most recent events first. `filter` is a case-insensitive substring
    /// matched against path and hash; `None` or an empty string matches all.
    pub fn query_history(&self, filter: Option<&str>, limit: usize) -> Result<Vec<ScanEvent>> {
        let filter = filter.map(str::trim).filter(|f| !f.is_empty());
        let conn = self.connection();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {EVENT_COLUMNS} FROM history \
             WHERE ?1 IS NULL \
                OR instr(lower(CAST(path AS TEXT)), lower(?1)) > 0 \
                OR instr(lower(hash), lower(?1)) > 0 \
             ORDER BY id DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![filter, clamp_limit(limit)], row_to_event)?;
        rows.collect::<Result<Vec<_>>>()
    }

    /// Every event in insertion order.
    pub fn all_events(&self) -> Result<Vec<ScanEvent>> {
        let conn = self.connection();
        let mut stmt =
            conn.prepare_cached(&format!("SELECT {EVENT_COLUMNS} FROM history ORDER BY id ASC"))?;
        let rows = stmt.query_map([], row_to_event)?;
        rows.collect::<Result<Vec<_>>>()
    }

    /// Events for one exact path, oldest first.
    pub fn events_for_path(&self, path: &Path, limit: usize) -> Result<Vec<ScanEvent>> {
        let conn = self.connection();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {EVENT_COLUMNS} FROM history WHERE path = ?1 ORDER BY id ASC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![path_key(path), clamp_limit(limit)], row_to_event)?;
        rows.collect::<Result<Vec<_>>>()
    }

    pub fn label_counts(&self) -> Result<Vec<(ResultLabel, u64)>> {
        let conn = self.connection();
        let mut stmt =
            conn.prepare_cached("SELECT result, COUNT(*) FROM history GROUP BY result")?;
        let rows = stmt.query_map([], |row| {
            let label: ResultLabel = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((label, count.max(0) as u64))
        })?;
        rows.collect::<Result<Vec<_>>>()
    }

    pub fn history_len(&self) -> Result<u64> {
        let count: i64 = self
            .connection()
            .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}
