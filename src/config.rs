use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::CachePolicy;

/// Environment variable that overrides `catalog.base_url`.
const BASE_URL_ENV: &str = "POKEDEX_BASE_URL";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub catalog: CatalogConfig,
  pub network: NetworkConfig,
  pub cache: CacheConfig,
  pub list: ListConfig,
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
  /// Root of the REST API, without a trailing slash
  pub base_url: String,
  /// Preferred languages for display names, most preferred first
  pub locales: Vec<String>,
}

impl Default for CatalogConfig {
  fn default() -> Self {
    Self {
      base_url: "https://pokeapi.co/api/v2".to_string(),
      locales: vec!["pt-BR".to_string(), "pt".to_string()],
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
  pub timeout_ms: u64,
  /// Additional attempts after the first one
  pub retries: u32,
  /// Base backoff delay, doubled on every retry
  pub backoff_ms: u64,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      timeout_ms: 8000,
      retries: 3,
      backoff_ms: 1000,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Keep a durable tier on disk; otherwise everything lives in memory
  pub persist: bool,
  /// Database location (default: $XDG_DATA_HOME/pokedex/cache.db)
  pub path: Option<PathBuf>,
  pub ttl_minutes: i64,
  pub max_items: usize,
  pub evict_count: usize,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      persist: true,
      path: None,
      ttl_minutes: 30,
      max_items: 50,
      evict_count: 10,
    }
  }
}

impl CacheConfig {
  /// Longest accepted TTL: one year.
  pub const MAX_TTL_MINUTES: i64 = 60 * 24 * 365;

  pub fn policy(&self) -> CachePolicy {
    CachePolicy {
      ttl: chrono::Duration::minutes(self.ttl_minutes.clamp(1, Self::MAX_TTL_MINUTES)),
      max_items: self.max_items,
      evict_count: self.evict_count,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListConfig {
  pub page_size: usize,
  /// Concurrent detail lookups per group
  pub batch_size: usize,
  pub search_debounce_ms: u64,
}

impl Default for ListConfig {
  fn default() -> Self {
    Self {
      page_size: 20,
      batch_size: 5,
      search_debounce_ms: 600,
    }
  }
}

impl ListConfig {
  pub fn search_debounce(&self) -> Duration {
    Duration::from_millis(self.search_debounce_ms)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Filter used when RUST_LOG is not set
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
  /// 1. Explicit path if provided
  /// 2. ./pokedex.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/pokedex/config.yaml
  ///
  /// Falls back to defaults when no file exists. `POKEDEX_BASE_URL`
  /// overrides the catalog URL.
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

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
      config.catalog.base_url = base_url;
    }

    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("pokedex.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("pokedex").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    // An empty file is a valid, all-defaults config
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  fn validate(&self) -> Result<()> {
    Url::parse(&self.catalog.base_url)
      .map_err(|e| eyre!("Invalid catalog.base_url '{}': {}", self.catalog.base_url, e))?;

    if self.list.page_size == 0 {
      return Err(eyre!("list.page_size must be greater than zero"));
    }
    if self.cache.ttl_minutes <= 0 || self.cache.ttl_minutes > CacheConfig::MAX_TTL_MINUTES {
      return Err(eyre!(
        "cache.ttl_minutes must be between 1 and {}",
        CacheConfig::MAX_TTL_MINUTES
      ));
    }
    if self.cache.max_items == 0 || self.cache.evict_count == 0 {
      return Err(eyre!("cache.max_items and cache.evict_count must be greater than zero"));
    }
    Ok(())
  }
}
