use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub github: GitHubConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
  /// API base URL; GitHub Enterprise uses `https://<host>/api/v3`
  pub api_url: String,
  /// Value sent in the User-Agent header
  pub user_agent: String,
  /// Request timeout; unset keeps the HTTP client's default
  pub timeout_secs: Option<u64>,
}

impl Default for GitHubConfig {
  fn default() -> Self {
    Self {
      api_url: "https://api.github.com".to_string(),
      user_agent: "GitHub-Repo-Dashboard".to_string(),
      timeout_secs: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Seconds between timer-driven refreshes
  pub interval_secs: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self { interval_secs: 300 }
  }
}

impl SyncConfig {
  pub fn interval(&self) -> Duration {
    Duration::from_secs(self.interval_secs.max(1))
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Keep the snapshot in SQLite so it survives restarts
  pub persist: bool,
  /// Database file (defaults to $XDG_DATA_HOME/repo-mirror/cache.db)
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      persist: true,
      path: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Filter used when RUST_LOG is not set
  pub level: String,
  /// Write logs to this file instead of stderr
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
  /// 2. ./repo-mirror.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/repo-mirror/config.yaml
  ///
  /// Without any file the defaults apply; only the token is mandatory.
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
    let local = PathBuf::from("repo-mirror.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("repo-mirror").join("config.yaml");
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

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty file deserializes to unit, not to an empty map.
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }

  /// Resolve the cache database path.
  pub fn cache_path(&self) -> Result<PathBuf> {
    if let Some(path) = &self.cache.path {
      return Ok(path.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("repo-mirror").join("cache.db"))
  }

  /// Get the GitHub API token from environment variables.
  ///
  /// Checks REPO_MIRROR_TOKEN first, then GITHUB_TOKEN as fallback.
  pub fn get_api_token() -> Result<String> {
    std::env::var("REPO_MIRROR_TOKEN")
      .or_else(|_| std::env::var("GITHUB_TOKEN"))
      .map_err(|_| {
        eyre!("GitHub token not found. Set REPO_MIRROR_TOKEN or GITHUB_TOKEN environment variable.")
      })
  }

  /// Get the webhook signing secret, if one is configured.
  ///
  /// Checks REPO_MIRROR_WEBHOOK_SECRET.
  pub fn get_webhook_secret() -> Option<String> {
    std::env::var("REPO_MIRROR_WEBHOOK_SECRET")
      .ok()
      .filter(|s| !s.is_empty())
  }
}
