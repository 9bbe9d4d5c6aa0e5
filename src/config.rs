//! Layered configuration: defaults, then an optional TOML file, then the
//! environment. CLI flags are applied last by the caller.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::keywords::{DEFAULT_WEIGHT, MAX_WEIGHT, MIN_WEIGHT};
use crate::search::executor::DEFAULT_RESULT_LIMIT;

pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    pub db_path: PathBuf,
    /// Upper bound on keyword search results.
    pub result_limit: usize,
    pub backend_timeout: Duration,
    /// Weight given to keywords entered without one.
    pub default_weight: u8,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            db_path: crate::default_db_path(),
            result_limit: DEFAULT_RESULT_LIMIT,
            backend_timeout: Duration::from_secs(5),
            default_weight: DEFAULT_WEIGHT,
        }
    }
}

/// On-disk shape; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    db_path: Option<PathBuf>,
    result_limit: Option<usize>,
    backend_timeout_ms: Option<u64>,
    default_weight: Option<u8>,
}

impl SearchConfig {
    /// Resolve configuration. An explicit `path` must exist; the default
    /// location is read only when present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        match path {
            Some(path) => cfg.apply_file(path)?,
            None => {
                if let Some(default) = default_config_path().filter(|p| p.exists()) {
                    cfg.apply_file(&default)?;
                }
            }
        }
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults plus environment only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FileConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(db) = file.db_path {
            self.db_path = db;
        }
        if let Some(limit) = file.result_limit {
            self.result_limit = limit;
        }
        if let Some(ms) = file.backend_timeout_ms {
            self.backend_timeout = Duration::from_millis(ms);
        }
        if let Some(weight) = file.default_weight {
            self.default_weight = weight;
        }
        tracing::debug!(path = %path.display(), "config_file_loaded");
        Ok(())
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(path) = dotenvy::var("CSEARCH_DB") {
            self.db_path = PathBuf::from(path);
        }
        if let Ok(val) = dotenvy::var("CSEARCH_RESULT_LIMIT") {
            self.result_limit = parse_env("CSEARCH_RESULT_LIMIT", &val)?;
        }
        if let Ok(val) = dotenvy::var("CSEARCH_BACKEND_TIMEOUT_MS") {
            self.backend_timeout =
                Duration::from_millis(parse_env("CSEARCH_BACKEND_TIMEOUT_MS", &val)?);
        }
        if let Ok(val) = dotenvy::var("CSEARCH_DEFAULT_WEIGHT") {
            self.default_weight = parse_env("CSEARCH_DEFAULT_WEIGHT", &val)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.result_limit == 0 {
            return Err(ConfigError::Invalid {
                key: "result_limit",
                reason: "must be at least 1".into(),
            });
        }
        if !(MIN_WEIGHT..=MAX_WEIGHT).contains(&self.default_weight) {
            return Err(ConfigError::Invalid {
                key: "default_weight",
                reason: format!("must be between {MIN_WEIGHT} and {MAX_WEIGHT}"),
            });
        }
        if self.backend_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "backend_timeout",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, val: &str) -> Result<T, ConfigError> {
    val.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        reason: format!("cannot parse `{val}`"),
    })
}

pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "course-search", "course-search")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    const ENV_KEYS: [&str; 4] = [
        "CSEARCH_DB",
        "CSEARCH_RESULT_LIMIT",
        "CSEARCH_BACKEND_TIMEOUT_MS",
        "CSEARCH_DEFAULT_WEIGHT",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            // SAFETY: tests touching the environment are serialized.
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    #[serial]
    fn file_then_env_layering() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "db_path = \"/tmp/from-file.db\"\nresult_limit = 20\nbackend_timeout_ms = 750\n",
        )
        .unwrap();

        let cfg = SearchConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/from-file.db"));
        assert_eq!(cfg.result_limit, 20);
        assert_eq!(cfg.backend_timeout, Duration::from_millis(750));
        assert_eq!(cfg.default_weight, DEFAULT_WEIGHT);

        unsafe { std::env::set_var("CSEARCH_RESULT_LIMIT", "5") };
        let cfg = SearchConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.result_limit, 5);
        clear_env();
    }

    #[test]
    #[serial]
    fn invalid_env_is_reported() {
        clear_env();
        unsafe { std::env::set_var("CSEARCH_DEFAULT_WEIGHT", "12") };
        let err = SearchConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "default_weight", .. }));

        unsafe { std::env::set_var("CSEARCH_DEFAULT_WEIGHT", "heavy") };
        assert!(SearchConfig::from_env().is_err());
        clear_env();
    }

    #[test]
    #[serial]
    fn unknown_file_keys_are_rejected() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "page_size = 10\n").unwrap();
        assert!(matches!(
            SearchConfig::load(Some(&path)),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    #[serial]
    fn explicit_missing_file_is_an_error() {
        clear_env();
        let err = SearchConfig::load(Some(Path::new("/nonexistent/course-search.toml")));
        assert!(matches!(err, Err(ConfigError::Io { .. })));
    }
}
