//! # hashlink-config
//!
//! Configuration management for hashlink.
//!
//! Loads configuration from:
//! 1. `~/.hashlink/config.toml` (global)
//! 2. `.hashlink/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)
//!
//! Command-line flags are applied on top by the binary.

pub mod logging;
pub mod path;
pub mod testing;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub use logging::Verbosity;

/// Environment variable overriding `store.root`
pub const ENV_STORE: &str = "HASHLINK_STORE";
/// Environment variable overriding `shrink.dry_run`
pub const ENV_DRY_RUN: &str = "HASHLINK_DRY_RUN";
/// Environment variable overriding `shrink.max_links`
pub const ENV_MAX_LINKS: &str = "HASHLINK_MAX_LINKS";

/// Smallest usable hardlink ceiling. Below it every duplicate would be
/// moved out of the store again and nothing would be shared.
pub const MIN_MAX_LINKS: u64 = 2;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub shrink: ShrinkConfig,
    pub progress: ProgressConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let global = Self::global_config_path();
        let project = Self::project_config_path();
        let mut config = Self::load_from(global.as_deref(), Some(&project))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no pass can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(max) = self.shrink.max_links {
            if max < MIN_MAX_LINKS {
                return Err(ConfigError::Invalid(format!(
                    "shrink.max_links must be at least {MIN_MAX_LINKS}, got {max}"
                )));
            }
        }
        Ok(())
    }

    /// Load and layer the given files. Missing files are skipped.
    ///
    /// Keys present in `project` replace the same keys from `global`;
    /// everything else falls back to defaults.
    pub fn load_from(global: Option<&Path>, project: Option<&Path>) -> Result<Self, ConfigError> {
        let mut merged = toml::Value::Table(toml::map::Map::new());

        for path in [global, project].into_iter().flatten() {
            if path.exists() {
                debug!("Loading config from {:?}", path);
                let contents = std::fs::read_to_string(path)?;
                let layer: toml::Value = toml::from_str(&contents)?;
                merge_toml(&mut merged, layer);
            }
        }

        Ok(merged.try_into::<Config>()?)
    }

    /// Global config path: ~/.hashlink/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".hashlink/config.toml"))
    }

    /// Project config path: ./.hashlink/config.toml
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".hashlink/config.toml")
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var(ENV_STORE) {
            if !path.is_empty() {
                self.store.root = Some(PathBuf::from(path));
            }
        }
        if let Ok(value) = std::env::var(ENV_DRY_RUN) {
            self.shrink.dry_run = matches!(value.as_str(), "1" | "true" | "yes");
        }
        if let Ok(value) = std::env::var(ENV_MAX_LINKS) {
            if let Ok(n) = value.parse() {
                self.shrink.max_links = Some(n);
            }
        }
    }

    /// Generate the TOML representation of this config
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        Config::default().to_toml().unwrap_or_default()
    }
}

/// Recursively overlay `layer` onto `base`. Tables merge key by key,
/// any other value replaces what was there.
fn merge_toml(base: &mut toml::Value, layer: toml::Value) {
    match (base, layer) {
        (toml::Value::Table(base), toml::Value::Table(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

/// Store location
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store root. `None` means `<tree>/../hash`.
    pub root: Option<PathBuf>,
}

/// How a fingerprint match is confirmed before linking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifySetting {
    /// Compare sizes only
    #[default]
    Size,
    /// Compare sizes, then the full content
    Content,
}

/// Deduplication pass settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShrinkConfig {
    pub dry_run: bool,
    pub verify: VerifySetting,
    /// Artificial hardlink ceiling; `None` leaves it to the filesystem
    pub max_links: Option<u64>,
}

/// Live progress block settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Minimum time between two refreshes
    pub interval_ms: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self { interval_ms: 500 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub verbosity: Verbosity,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.store.root.is_none());
        assert!(!config.shrink.dry_run);
        assert_eq!(config.shrink.verify, VerifySetting::Size);
        assert_eq!(config.progress.interval_ms, 500);
        assert_eq!(config.logging.verbosity, Verbosity::Warning);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[shrink]"));
        assert!(toml_str.contains("[progress]"));
        assert!(toml_str.contains("verify = \"size\""));
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = Config::default();
        config.shrink.max_links = Some(64);
        config.store.root = Some(PathBuf::from("/data/hash"));
        let toml_str = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_project_layer_overrides_only_its_keys() {
        let dir = tempdir().unwrap();
        let global = dir.path().join("global.toml");
        let project = dir.path().join("project.toml");
        std::fs::write(
            &global,
            "[shrink]\nverify = \"content\"\nmax_links = 100\n[progress]\ninterval_ms = 250\n",
        )
        .unwrap();
        std::fs::write(&project, "[shrink]\nmax_links = 8\n").unwrap();

        let config = Config::load_from(Some(&global), Some(&project)).unwrap();
        assert_eq!(config.shrink.verify, VerifySetting::Content);
        assert_eq!(config.shrink.max_links, Some(8));
        assert_eq!(config.progress.interval_ms, 250);
    }

    #[test]
    fn test_missing_files_yield_defaults() {
        let dir = tempdir().unwrap();
        let config =
            Config::load_from(Some(&dir.path().join("nope.toml")), None).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_link_ceiling_below_two_is_rejected() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("config.toml");
        std::fs::write(&file, "[shrink]\nmax_links = 1\n").unwrap();

        let config = Config::load_from(Some(&file), None).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.shrink.max_links = Some(0);
        assert!(config.validate().is_err());
        config.shrink.max_links = Some(MIN_MAX_LINKS);
        assert!(config.validate().is_ok());
        config.shrink.max_links = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let dir = tempdir().unwrap();
        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[shrink\nverify = ").unwrap();
        assert!(matches!(
            Config::load_from(Some(&bad), None),
            Err(ConfigError::Toml(_))
        ));
    }
}
