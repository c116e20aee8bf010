use parking_lot::{Mutex, MutexGuard};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::hasher::HashAlgorithm;
use crate::model::ResultLabel;

const SCHEMA_VERSION: i64 = 2;

/// Version 1 stored paths as lossy UTF-8 text. Existing rows are rewritten as
/// blobs so they compare equal to newly written keys.
const MIGRATE_V1_PATHS: &str = "
    UPDATE history SET path = CAST(path AS BLOB) WHERE typeof(path) = 'text';
    UPDATE snapshot SET root_dir = CAST(root_dir AS BLOB) WHERE typeof(root_dir) = 'text';
    UPDATE snapshot_entry SET path = CAST(path AS BLOB) WHERE typeof(path) = 'text';
";

/// History and snapshot storage. One connection, serialized behind a mutex;
/// every multi-row write is a single transaction so readers never see a
/// partial batch or a partial snapshot.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.configure_pragmas()?;
        db.migrate_schema()?;
        debug!("Opened history database at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.configure_pragmas()?;
        db.migrate_schema()?;
        Ok(db)
    }

    fn configure_pragmas(&self) -> Result<()> {
        self.connection().execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        debug!("SQLite pragmas configured (WAL mode, foreign keys on)");
        Ok(())
    }

    fn migrate_schema(&self) -> Result<()> {
        let conn = self.connection();
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version > SCHEMA_VERSION {
            debug!(
                "Database schema version {} is newer than {}, opening anyway",
                version, SCHEMA_VERSION
            );
            return Ok(());
        }
        conn.execute_batch(include_str!("schema.sql"))?;
        if version == 1 {
            conn.execute_batch(MIGRATE_V1_PATHS)?;
            info!("Migrated stored paths to schema version {}", SCHEMA_VERSION);
        }
        debug!("SQLite schema initialized (version {})", SCHEMA_VERSION);
        Ok(())
    }

    /// Exclusive access to the underlying connection for the caller's scope.
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }
}

impl ToSql for ResultLabel {
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ResultLabel {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for HashAlgorithm {
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.name()))
    }
}

impl FromSql for HashAlgorithm {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Column value for a path: the exact bytes of the OS string, so names that
/// are not valid UTF-8 round-trip and stay distinct.
pub(crate) fn path_key(path: &Path) -> Vec<u8> {
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        path.as_os_str().as_bytes().to_vec()
    }
    #[cfg(not(unix))]
    {
        // Lossy only for unpaired UTF-16 surrogates.
        path.to_string_lossy().into_owned().into_bytes()
    }
}

fn path_from_key(bytes: &[u8]) -> PathBuf {
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        PathBuf::from(std::ffi::OsStr::from_bytes(bytes))
    }
    #[cfg(not(unix))]
    {
        PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// A path read back from a column written by [`path_key`].
pub(crate) struct StoredPath(pub(crate) PathBuf);

impl FromSql for StoredPath {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Blob(bytes) | ValueRef::Text(bytes) => Ok(StoredPath(path_from_key(bytes))),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

pub(crate) fn clamp_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}
