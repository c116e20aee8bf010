use clap::{Parser, Subcommand, ValueEnum};
use hashkeeper_core::HashAlgorithm;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "hashkeeper")]
#[command(about = "Track file integrity with hashes, baselines and history", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ./Config.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// History database, overriding the configured `db_path`
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Csv,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Hash every file under a directory and record the results
    Scan {
        root: PathBuf,
        /// xxh64, md5, sha1, sha256, blake3 (or fast, default, strong)
        #[arg(long, short)]
        algorithm: Option<HashAlgorithm>,
        /// Skip temporary, log and object files
        #[arg(long)]
        noise_filter: bool,
        /// Save the finished scan as a baseline with this description
        #[arg(long)]
        baseline: Option<String>,
    },
    /// Scan a directory and report drift against its latest baseline
    Compare {
        root: PathBuf,
        #[arg(long, short)]
        algorithm: Option<HashAlgorithm>,
        #[arg(long)]
        noise_filter: bool,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Re-scan a directory periodically and report drift after each pass
    Watch {
        root: PathBuf,
        /// Seconds between re-scans
        #[arg(long)]
        interval: Option<u64>,
        /// Stop after this many re-scans
        #[arg(long)]
        ticks: Option<u64>,
        #[arg(long, short)]
        algorithm: Option<HashAlgorithm>,
        #[arg(long)]
        noise_filter: bool,
    },
    /// Hash individual files
    Hash {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long, short)]
        algorithm: Option<HashAlgorithm>,
    },
    /// Write a file's digest to a checksum file
    SaveHash {
        file: PathBuf,
        dest: PathBuf,
        #[arg(long, short)]
        algorithm: Option<HashAlgorithm>,
    },
    /// Check a file against a checksum file
    Verify {
        file: PathBuf,
        checksum: PathBuf,
        #[arg(long, short)]
        algorithm: Option<HashAlgorithm>,
    },
    /// Show recorded hash events, newest first
    History {
        /// Substring to match against path or hash
        #[arg(long, short)]
        filter: Option<String>,
        #[arg(long, short)]
        limit: Option<usize>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Show every recorded event for one file, oldest first
    Timeline {
        path: PathBuf,
        #[arg(long, short)]
        limit: Option<usize>,
    },
    /// List content shared by more than one path
    Duplicates {
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Count history events per result
    Stats,
    /// List saved baselines
    Snapshots {
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Delete a saved baseline
    DeleteSnapshot {
        id: i64,
        /// Do not ask for confirmation
        #[arg(long, short)]
        yes: bool,
    },
    /// Print configuration values
    PrintConfig,
    /// Write a starter configuration file
    InitConfig {
        #[arg(default_value = "Config.toml")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
