pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod model;
pub mod progress;
pub mod scanner;
pub mod storage;
mod watchdog;

pub use config::AppConfig;
pub use engine::{Comparison, EngineStatus, ScanEngine, TickOutcome};
pub use error::Error;
pub use hasher::{AlgorithmProfile, HashAlgorithm, Verification};
pub use model::{
    DiffEntry, DiffStatus, DuplicateGroup, FileRecord, ResultLabel, ScanEvent, Snapshot,
    SnapshotEntry, SnapshotId, VerificationStats,
};
pub use progress::{ScanMetrics, ScanProgress, ScanSummary};
pub use storage::Database;
