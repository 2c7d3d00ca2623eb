use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration. Every section and field is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub offline: OfflineConfig,
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
  pub base_url: String,
  /// Per-attempt timeout in milliseconds
  pub timeout_ms: u64,
  /// Retries after the first attempt, unless a call sets its own
  pub retry_limit: usize,
  pub endpoints: PinEndpoints,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: "https://api.pinyourword.com".to_string(),
      timeout_ms: 30_000,
      retry_limit: 0,
      endpoints: PinEndpoints::default(),
    }
  }
}

/// Pin API paths. `update` and `delete` are `{id}` templates; leaving one
/// unset means the server has no handler for it yet.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PinEndpoints {
  pub list: String,
  pub create: String,
  pub update: Option<String>,
  pub delete: Option<String>,
}

impl Default for PinEndpoints {
  fn default() -> Self {
    Self {
      list: "/v1/pin/pins-by-user".to_string(),
      create: "/v1/pin/save-pin-user".to_string(),
      update: None,
      delete: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct OfflineConfig {
  pub enabled: bool,
  /// Attempts before a queued mutation is dead-lettered
  pub max_retries: u32,
  /// Prefix for local storage keys
  pub namespace: String,
  /// SQLite file (defaults to `<data dir>/pinsync/store.db`)
  pub database: Option<PathBuf>,
}

impl Default for OfflineConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      max_retries: crate::sync::DEFAULT_MAX_RETRIES,
      namespace: "@pinyourword".to_string(),
      database: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
  /// Default filter directive; `RUST_LOG` takes precedence
  pub level: String,
  /// Log file; stderr when unset
  pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      file: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided (must exist)
  /// 2. ./pinsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/pinsync/config.yaml
  ///
  /// Falls back to the built-in defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => {
        tracing::debug!("No configuration file found, using defaults");
        Ok(Self::default())
      }
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("pinsync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("pinsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    // an empty document deserializes as unit, not as an empty map
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    Ok(serde_yaml::from_str(contents)?)
  }

  /// Get the API bearer token from environment variables.
  ///
  /// Checks PINSYNC_API_TOKEN first, then PIN_API_TOKEN as fallback.
  pub fn api_token() -> Result<String> {
    std::env::var("PINSYNC_API_TOKEN")
      .or_else(|_| std::env::var("PIN_API_TOKEN"))
      .map_err(|_| {
        eyre!("API token not found. Set PINSYNC_API_TOKEN or PIN_API_TOKEN environment variable.")
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.api.base_url, "https://api.pinyourword.com");
    assert_eq!(config.api.timeout_ms, 30_000);
    assert_eq!(config.api.endpoints.list, "/v1/pin/pins-by-user");
    assert_eq!(config.api.endpoints.update, None);
    assert!(config.offline.enabled);
    assert_eq!(config.offline.max_retries, 3);
    assert_eq!(config.offline.namespace, "@pinyourword");
    assert_eq!(config.logging.level, "info");
  }

  #[test]
  fn test_partial_yaml_keeps_defaults() {
    let config = Config::from_yaml(
      r#"
api:
  base_url: "http://localhost:8080"
  endpoints:
    update: "/v1/pin/{id}"
offline:
  enabled: false
"#,
    )
    .unwrap();

    assert_eq!(config.api.base_url, "http://localhost:8080");
    assert_eq!(config.api.timeout_ms, 30_000);
    assert_eq!(config.api.endpoints.create, "/v1/pin/save-pin-user");
    assert_eq!(config.api.endpoints.update.as_deref(), Some("/v1/pin/{id}"));
    assert!(!config.offline.enabled);
    assert_eq!(config.offline.max_retries, 3);
    assert_eq!(config.logging, LoggingConfig::default());
  }

  #[test]
  fn test_empty_yaml_is_default() {
    assert_eq!(Config::from_yaml("").unwrap(), Config::default());
  }

  #[test]
  fn test_load_explicit_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "logging:\n  level: debug\n  file: /tmp/pinsync.log").unwrap();

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.file, Some(PathBuf::from("/tmp/pinsync.log")));
  }

  #[test]
  fn test_missing_explicit_path_is_error() {
    let err = Config::load(Some(Path::new("/nonexistent/pinsync.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }

  #[test]
  fn test_invalid_yaml_is_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "api: [not, a, map]").unwrap();

    let err = Config::load(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
  }
}
