use ahash::AHashSet;
use glob::Pattern;
use std::path::Path;
use tracing::error;

use crate::config::AppConfig;
use crate::scanner::walk::extension_of;

/// Decides whether a file is "noise" that a scan should skip.
///
/// Only files are ever tested; directories are always descended into.
#[derive(Debug, Clone)]
pub struct NoiseFilter {
    enabled: bool,
    extensions: AHashSet<String>,
    patterns: Vec<Pattern>,
}

impl NoiseFilter {
    pub fn new<I, S>(enabled: bool, extensions: I, ignore_globs: &[String]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();

        let patterns = ignore_globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();

        Self {
            enabled,
            extensions,
            patterns,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.noise_filter,
            &config.noise_extensions,
            &config.ignore_patterns,
        )
    }

    /// A filter that accepts everything.
    pub fn disabled() -> Self {
        Self::new(false, std::iter::empty::<&str>(), &[])
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// `true` when the file should be hashed.
    pub fn accepts(&self, path: &Path) -> bool {
        if !self.enabled {
            return true;
        }
        let extension = extension_of(path).to_ascii_lowercase();
        if !extension.is_empty() && self.extensions.contains(&extension) {
            return false;
        }
        !self.patterns.iter().any(|p| p.matches_path(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_filter(enabled: bool) -> NoiseFilter {
        let mut config = AppConfig::default();
        config.noise_filter = enabled;
        NoiseFilter::from_config(&config)
    }

    #[test]
    fn test_disabled_filter_accepts_noise() {
        let filter = default_filter(false);
        assert!(filter.accepts(Path::new("/tmp/run.log")));
        assert!(filter.accepts(Path::new("/tmp/main.o")));
    }

    #[test]
    fn test_enabled_filter_rejects_noise_extensions_case_insensitively() {
        let filter = default_filter(true);
        assert!(!filter.accepts(Path::new("/tmp/run.log")));
        assert!(!filter.accepts(Path::new("/tmp/RUN.LOG")));
        assert!(!filter.accepts(Path::new("/tmp/scratch.tmp")));
        assert!(filter.accepts(Path::new("/tmp/run.txt")));
        assert!(filter.accepts(Path::new("/tmp/Makefile")));
    }

    #[test]
    fn test_glob_patterns_apply_only_when_enabled() {
        let patterns = vec!["**/node_modules/**".to_string()];
        let mut filter = NoiseFilter::new(true, ["log"], &patterns);
        assert!(!filter.accepts(Path::new("/src/node_modules/pkg/index.js")));
        assert!(filter.accepts(Path::new("/src/app/index.js")));

        filter.set_enabled(false);
        assert!(filter.accepts(Path::new("/src/node_modules/pkg/index.js")));
    }

    #[test]
    fn test_invalid_glob_is_ignored() {
        let patterns = vec!["[".to_string()];
        let filter = NoiseFilter::new(true, [".bak"], &patterns);
        assert!(filter.accepts(Path::new("/a/b.txt")));
        assert!(!filter.accepts(Path::new("/a/b.bak")));
    }
}
