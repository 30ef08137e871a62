//! Configuration for hivebus.
//!
//! Loads settings from `.hivebus.toml` in the project root, then from
//! `HIVEBUS_*` environment variables. Uses figment for layered configuration
//! with provenance tracking.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::registry::DEFAULT_QUEUE_CAPACITY;
use crate::watch::WatcherOptions;

/// Name of the config file looked up in the project root
pub const CONFIG_FILE_NAME: &str = ".hivebus.toml";

/// Prefix for environment overrides, e.g. `HIVEBUS_DEBOUNCE_MS=250`
pub const ENV_PREFIX: &str = "HIVEBUS_";

/// hivebus configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Directory holding topic files, relative to the root unless absolute.
    #[serde(default = "default_topics_dir")]
    pub topics_dir: PathBuf,

    /// History document, relative to the root unless absolute.
    #[serde(default = "default_history_file")]
    pub history_file: PathBuf,

    /// Debounce window in milliseconds (default: 100).
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Per-subscriber queue capacity (default: 100).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Maximum history entries kept on save; 0 keeps everything (default: 50).
    #[serde(default = "default_history_max_entries")]
    pub history_max_entries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            topics_dir: default_topics_dir(),
            history_file: default_history_file(),
            debounce_ms: default_debounce_ms(),
            queue_capacity: default_queue_capacity(),
            history_max_entries: default_history_max_entries(),
        }
    }
}

fn default_topics_dir() -> PathBuf {
    PathBuf::from(".hive").join("topics")
}

fn default_history_file() -> PathBuf {
    PathBuf::from(".hive").join("history.json")
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_history_max_entries() -> usize {
    50
}

impl Config {
    /// Load configuration for the given root directory.
    ///
    /// Returns defaults if the file doesn't exist. Reports parse errors with
    /// file, line, and key information and falls back to defaults.
    pub fn load(root: &Path) -> Self {
        let config_path = root.join(CONFIG_FILE_NAME);
        match Self::figment(&config_path).extract() {
            Ok(config) => {
                if config_path.exists() {
                    tracing::info!("Loaded config from {:?}", config_path);
                }
                config
            }
            Err(e) => {
                tracing::warn!("Config error: {}", e);
                Self::default()
            }
        }
    }

    /// Layered sources: defaults <- toml file <- environment.
    fn figment(config_path: &Path) -> Figment {
        let figment = Figment::from(Serialized::defaults(Config::default()));

        // Only add TOML provider if file exists
        let figment = if config_path.exists() {
            figment.merge(Toml::file(config_path))
        } else {
            figment
        };

        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Absolute topic directory for `root`.
    pub fn topics_path(&self, root: &Path) -> PathBuf {
        root.join(&self.topics_dir)
    }

    /// Absolute history file path for `root`.
    pub fn history_path(&self, root: &Path) -> PathBuf {
        root.join(&self.history_file)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Watcher options derived from this configuration.
    pub fn watcher_options(&self) -> WatcherOptions {
        WatcherOptions {
            debounce: self.debounce(),
            queue_capacity: self.queue_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.topics_dir, PathBuf::from(".hive/topics"));
        assert_eq!(config.history_file, PathBuf::from(".hive/history.json"));
        assert_eq!(config.debounce_ms, 100);
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.history_max_entries, 50);
        assert_eq!(config.watcher_options(), WatcherOptions::default());
    }

    #[test]
    fn test_load_missing_config() {
        Jail::expect_with(|jail| {
            let config = Config::load(jail.directory());
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[test]
    fn test_partial_config_merges_with_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE_NAME,
                r#"
debounce_ms = 250
topics_dir = "state/topics"
"#,
            )?;

            let config = Config::load(jail.directory());
            assert_eq!(config.debounce_ms, 250);
            assert_eq!(config.debounce(), Duration::from_millis(250));
            assert_eq!(config.topics_dir, PathBuf::from("state/topics"));
            assert_eq!(config.queue_capacity, 100); // from defaults
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(CONFIG_FILE_NAME, "history_max_entries = 10")?;
            jail.set_env("HIVEBUS_HISTORY_MAX_ENTRIES", "3");

            let config = Config::load(jail.directory());
            assert_eq!(config.history_max_entries, 3);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_config_returns_defaults() {
        Jail::expect_with(|jail| {
            // Invalid: debounce_ms should be a number, not a string
            jail.create_file(CONFIG_FILE_NAME, r#"debounce_ms = "soon""#)?;

            let config = Config::load(jail.directory());
            assert_eq!(config.debounce_ms, 100);
            Ok(())
        });
    }

    #[test]
    fn test_paths_resolve_against_root() {
        let config = Config::default();
        let root = Path::new("/work/project");
        assert_eq!(
            config.topics_path(root),
            PathBuf::from("/work/project/.hive/topics")
        );
        assert_eq!(
            config.history_path(root),
            PathBuf::from("/work/project/.hive/history.json")
        );

        let absolute = Config {
            topics_dir: PathBuf::from("/var/hive/topics"),
            ..Config::default()
        };
        assert_eq!(absolute.topics_path(root), PathBuf::from("/var/hive/topics"));
    }
}
