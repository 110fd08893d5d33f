use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub relay: RelayConfig,
  #[serde(default)]
  pub client: ClientConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
  #[serde(default = "default_bind")]
  pub bind: String,
  #[serde(default = "default_port")]
  pub port: u16,
}

impl Default for RelayConfig {
  fn default() -> Self {
    Self {
      bind: default_bind(),
      port: default_port(),
    }
  }
}

fn default_bind() -> String {
  "127.0.0.1".to_string()
}

fn default_port() -> u16 {
  7700
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
  /// Talk to a `jtk serve` relay instead of Jira directly
  pub relay_url: Option<String>,
  /// Debounce window for search-as-you-type
  #[serde(default = "default_search_delay_ms")]
  pub search_delay_ms: u64,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      relay_url: None,
      search_delay_ms: default_search_delay_ms(),
    }
  }
}

impl ClientConfig {
  pub fn search_delay(&self) -> Duration {
    Duration::from_millis(self.search_delay_ms)
  }
}

fn default_search_delay_ms() -> u64 {
  300
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  /// `EnvFilter` directive used when RUST_LOG is unset
  #[serde(default = "default_level")]
  pub level: String,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_level(),
    }
  }
}

fn default_level() -> String {
  "info".to_string()
}

impl Config {
  /// Load configuration from file, falling back to defaults.
  ///
  /// Search order:
  /// 1. Explicit path if provided (must exist)
  /// 2. ./jtk.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/jtk/config.yaml
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
    let local = PathBuf::from("jtk.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("jtk").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    // An empty file is a valid "all defaults" config
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Get the Jira API token from environment variables.
  ///
  /// Checks JTK_JIRA_TOKEN first, then JIRA_API_TOKEN as fallback.
  pub fn get_api_token() -> Result<String> {
    std::env::var("JTK_JIRA_TOKEN")
      .or_else(|_| std::env::var("JIRA_API_TOKEN"))
      .map_err(|_| {
        eyre!("Jira API token not found. Pass --token or set JTK_JIRA_TOKEN or JIRA_API_TOKEN.")
      })
  }
}
