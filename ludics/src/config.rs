//! Engine configuration.
//!
//! Defaults, optionally overlaid by a TOML file, then by `LUDICS_*`
//! environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::events::CHANNEL_CAPACITY;
use crate::moves::DEFAULT_KEY;

/// Default number of targets with a cached tree.
pub const DEFAULT_TREE_CACHE_CAPACITY: usize = 1024;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Tunables for [`DialogueEngine`](crate::engine::DialogueEngine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Compare-and-append attempts before a submit reports a conflict.
    pub max_append_retries: u32,
    /// Challenge key assumed when a move names none.
    pub default_key: String,
    /// Reuse compiled trees while a target's ledger head is unchanged.
    pub cache_trees: bool,
    /// Targets whose compiled tree is kept; the least recently used goes first.
    pub tree_cache_capacity: usize,
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_append_retries: 3,
            default_key: DEFAULT_KEY.to_string(),
            cache_trees: true,
            tree_cache_capacity: DEFAULT_TREE_CACHE_CAPACITY,
            event_capacity: CHANNEL_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file. Missing fields keep their defaults.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: EngineConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded engine config");
        Ok(config)
    }

    /// Defaults (or `path`, when given) with environment overrides applied.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.with_env()
    }

    /// Apply `LUDICS_*` overrides from the process environment.
    pub fn with_env(self) -> ConfigResult<Self> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("LUDICS_MAX_APPEND_RETRIES") {
            self.max_append_retries = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: "LUDICS_MAX_APPEND_RETRIES",
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup("LUDICS_TREE_CACHE_CAPACITY") {
            self.tree_cache_capacity = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: "LUDICS_TREE_CACHE_CAPACITY",
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup("LUDICS_DEFAULT_KEY") {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidEnv {
                    var: "LUDICS_DEFAULT_KEY",
                    value,
                });
            }
            self.default_key = value.trim().to_string();
        }
        if let Some(value) = lookup("LUDICS_CACHE_TREES") {
            self.cache_trees = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: "LUDICS_CACHE_TREES",
                        value,
                    })
                }
            };
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_append_retries, 3);
        assert_eq!(config.default_key, "default");
        assert!(config.cache_trees);
        assert_eq!(config.tree_cache_capacity, 1024);
        assert_eq!(config.event_capacity, 256);
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_append_retries = 7\ncache_trees = false").unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_append_retries, 7);
        assert!(!config.cache_trees);
        assert_eq!(config.default_key, "default");
    }

    #[test]
    fn test_from_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_from_file_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_append_retries = \"many\"").unwrap();
        let err = EngineConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let config = EngineConfig::default()
            .with_overrides(env(&[
                ("LUDICS_MAX_APPEND_RETRIES", "5"),
                ("LUDICS_DEFAULT_KEY", "cq"),
                ("LUDICS_CACHE_TREES", "off"),
                ("LUDICS_TREE_CACHE_CAPACITY", "16"),
            ]))
            .unwrap();
        assert_eq!(config.tree_cache_capacity, 16);
        assert_eq!(config.max_append_retries, 5);
        assert_eq!(config.default_key, "cq");
        assert!(!config.cache_trees);
    }

    #[test]
    fn test_env_rejects_garbage() {
        let err = EngineConfig::default()
            .with_overrides(env(&[("LUDICS_CACHE_TREES", "maybe")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                var: "LUDICS_CACHE_TREES",
                ..
            }
        ));

        let err = EngineConfig::default()
            .with_overrides(env(&[("LUDICS_MAX_APPEND_RETRIES", "-1")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }
}
