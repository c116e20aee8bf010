use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::hasher::HashAlgorithm;

/// Engine settings. Every field has a default so an absent `Config.toml`
/// still yields a usable configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub algorithm: HashAlgorithm,
    pub noise_filter: bool,
    pub noise_extensions: Vec<String>,
    pub ignore_patterns: Vec<String>,
    pub watchdog_interval_secs: u64,
    pub history_limit: usize,
    pub duplicate_sample_size: usize,
    pub append_batch_size: usize,
    pub progress_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("hashkeeper.db"),
            algorithm: HashAlgorithm::Sha256,
            noise_filter: false,
            noise_extensions: ["tmp", "temp", "log", "o", "obj", "swp", "bak"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ignore_patterns: Vec::new(),
            watchdog_interval_secs: 15,
            history_limit: 100,
            duplicate_sample_size: 5,
            append_batch_size: 256,
            progress_capacity: 4_096,
        }
    }
}

impl AppConfig {
    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_secs.max(1))
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Load `Config.toml` from the working directory (if present), then apply
/// `HASHKEEPER_*` environment overrides.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    build(ConfigFile::with_name("Config").required(false))
}

/// Same as [`load_configuration`] but reads an explicit file, which must exist.
pub fn load_configuration_from(path: &Path) -> Result<AppConfig, ConfigError> {
    build(ConfigFile::from(path).required(true))
}

fn build<S>(file: S) -> Result<AppConfig, ConfigError>
where
    S: config::Source + Send + Sync + 'static,
{
    let builder = Config::builder()
        .add_source(file)
        .add_source(Environment::with_prefix("HASHKEEPER").try_parsing(true))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}
