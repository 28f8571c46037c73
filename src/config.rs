use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::net::WriteMethod;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub server: ServerConfig,
  #[serde(default)]
  pub proxy: ProxyConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub watch: WatchConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  /// Base URL of the grading backend
  pub url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  /// Path requested to decide whether the backend is reachable
  #[serde(default = "default_probe_path")]
  pub probe_path: String,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      url: "http://localhost:8000".to_string(),
      timeout_secs: default_timeout_secs(),
      probe_path: default_probe_path(),
    }
  }
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_probe_path() -> String {
  "/".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
  /// Targets whose path starts with one of these are API requests
  #[serde(default = "default_api_prefixes")]
  pub api_prefixes: Vec<String>,
  /// Writes that may be queued while offline
  #[serde(default = "default_deferrable")]
  pub deferrable: Vec<DeferRule>,
}

impl Default for ProxyConfig {
  fn default() -> Self {
    Self {
      api_prefixes: default_api_prefixes(),
      deferrable: default_deferrable(),
    }
  }
}

fn default_api_prefixes() -> Vec<String> {
  vec!["/api/".to_string(), "/grading/api/".to_string()]
}

fn default_deferrable() -> Vec<DeferRule> {
  vec![DeferRule {
    method: WriteMethod::Create,
    target: "/grading/api/students/".to_string(),
  }]
}

/// One allow-list entry: a write method plus a target path prefix.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeferRule {
  pub method: WriteMethod,
  pub target: String,
}

impl DeferRule {
  pub fn matches(&self, method: WriteMethod, path: &str) -> bool {
    self.method == method && path.starts_with(&self.target)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_static_name")]
  pub static_name: String,
  #[serde(default = "default_static_version")]
  pub static_version: u32,
  #[serde(default = "default_api_name")]
  pub api_name: String,
  #[serde(default = "default_api_version")]
  pub api_version: u32,
  /// Pages and assets stored in the static cache on install
  #[serde(default = "default_precache")]
  pub precache: Vec<String>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      static_name: default_static_name(),
      static_version: default_static_version(),
      api_name: default_api_name(),
      api_version: default_api_version(),
      precache: default_precache(),
    }
  }
}

fn default_static_name() -> String {
  "mgpas".to_string()
}

fn default_static_version() -> u32 {
  2
}

fn default_api_name() -> String {
  "mgpas-api".to_string()
}

fn default_api_version() -> u32 {
  1
}

fn default_precache() -> Vec<String> {
  [
    "/",
    "/static/css/styles.css",
    "/static/js/app.js",
    "/static/icons/icon-192x192.png",
    "/static/icons/icon-512x512.png",
    "/auth/login/",
    "/dashboard/",
    "/grading/students/",
  ]
  .into_iter()
  .map(String::from)
  .collect()
}

impl CacheConfig {
  /// Versioned namespace for pages and static assets, e.g. "mgpas-v2".
  pub fn static_namespace(&self) -> String {
    format!("{}-v{}", self.static_name, self.static_version)
  }

  /// Versioned namespace for API reads, e.g. "mgpas-api-v1".
  pub fn api_namespace(&self) -> String {
    format!("{}-v{}", self.api_name, self.api_version)
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// SQLite file for the queue and caches (defaults to the data directory)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
  #[serde(default = "default_probe_interval_secs")]
  pub probe_interval_secs: u64,
}

impl Default for WatchConfig {
  fn default() -> Self {
    Self {
      probe_interval_secs: default_probe_interval_secs(),
    }
  }
}

fn default_probe_interval_secs() -> u64 {
  5
}

impl WatchConfig {
  pub fn probe_interval(&self) -> Duration {
    Duration::from_secs(self.probe_interval_secs.max(1))
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./mgpas-offline.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/mgpas-offline/config.yaml
  ///
  /// Falls back to built-in defaults when no file exists.
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
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("mgpas-offline.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("mgpas-offline").join("config.yaml");
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
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Database location: the configured path, else the platform data directory.
  pub fn storage_path(&self) -> Result<PathBuf> {
    if let Some(path) = &self.storage.path {
      return Ok(path.clone());
    }
    Ok(data_dir()?.join("offline.db"))
  }

  /// Get the CSRF token sent with every request, if any.
  ///
  /// Checks MGPAS_CSRF_TOKEN.
  pub fn get_csrf_token() -> Option<String> {
    std::env::var("MGPAS_CSRF_TOKEN")
      .ok()
      .filter(|t| !t.is_empty())
  }
}

/// Per-user data directory for the database and log files.
pub fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("mgpas-offline"))
}
