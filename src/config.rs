use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub gateway: GatewayConfig,
  /// Collection to use when the command line doesn't name one.
  pub default_collection: Option<String>,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
  /// Base URL of the Notion proxy (e.g. "https://myapp.vercel.app/api").
  pub base_url: String,
  /// Timeout for single-record calls, in seconds.
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  /// Timeout for bulk updates; these touch many records, so the bound is
  /// longer than for single-record calls.
  #[serde(default = "default_bulk_timeout_secs")]
  pub bulk_timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
  10
}

fn default_bulk_timeout_secs() -> u64 {
  60
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Override for the cache database location.
  pub path: Option<PathBuf>,
  /// When false, snapshots live only in memory for the process lifetime.
  #[serde(default = "default_persistent")]
  pub persistent: bool,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      path: None,
      persistent: true,
    }
  }
}

fn default_persistent() -> bool {
  true
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./tripsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/tripsync/config.yaml
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
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/tripsync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("tripsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("tripsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Get the proxy API token from environment variables.
  ///
  /// Checks TRIPSYNC_NOTION_TOKEN first, then NOTION_API_TOKEN as fallback.
  pub fn get_api_token() -> Result<String> {
    std::env::var("TRIPSYNC_NOTION_TOKEN")
      .or_else(|_| std::env::var("NOTION_API_TOKEN"))
      .map_err(|_| {
        eyre!(
          "API token not found. Set TRIPSYNC_NOTION_TOKEN or NOTION_API_TOKEN environment variable."
        )
      })
  }
}
