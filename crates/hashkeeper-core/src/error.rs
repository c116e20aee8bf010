use std::path::PathBuf;
use thiserror::Error;

use crate::hasher::HashAlgorithm;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Durable storage rejected an append or query. Non-fatal during a scan.
    #[error("Persistence failure: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("Unreadable file {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory access denied {}: {message}", path.display())]
    DirectoryAccessDenied { path: PathBuf, message: String },

    #[error("A scan is already running")]
    AlreadyRunning,

    #[error("No completed scan for {}", .0.display())]
    NoPriorScan(PathBuf),

    #[error("No baseline snapshot for {}", .0.display())]
    NoBaseline(PathBuf),

    #[error("Baseline was hashed with {baseline}, current scan used {current}")]
    AlgorithmMismatch {
        baseline: HashAlgorithm,
        current: HashAlgorithm,
    },

    #[error("Checksum file {} holds no digest", .0.display())]
    InvalidChecksumFile(PathBuf),
}

impl Error {
    /// Errors that only cost a single file or subtree; a scan absorbs them and
    /// keeps going.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Error::Unreadable { .. } | Error::DirectoryAccessDenied { .. }
        )
    }
}
