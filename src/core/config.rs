use crate::core::asset::AssetType;
use crate::core::ledger::DEFAULT_HISTORY_LIMIT;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

fn default_currency() -> AssetType {
    AssetType::Try
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

fn default_api_url() -> String {
    "https://api.goldfolio.app".to_string()
}

fn default_page_url() -> String {
    "https://www.goldfolio.app/market".to_string()
}

fn default_attempts() -> u32 {
    3
}

fn default_api_timeout_secs() -> u64 {
    10
}

fn default_page_timeout_secs() -> u64 {
    15
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_rate_limit_penalty() -> u32 {
    3
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiProviderConfig {
    #[serde(default = "default_api_url")]
    pub base_url: String,
    /// Total attempts, including the first.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Per attempt.
    #[serde(default = "default_api_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Backoff multiplier once two attempts in a row time out.
    #[serde(default = "default_rate_limit_penalty")]
    pub rate_limit_penalty: u32,
}

impl Default for ApiProviderConfig {
    fn default() -> Self {
        ApiProviderConfig {
            base_url: default_api_url(),
            attempts: default_attempts(),
            timeout_secs: default_api_timeout_secs(),
            backoff_ms: default_backoff_ms(),
            rate_limit_penalty: default_rate_limit_penalty(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PageProviderConfig {
    #[serde(default = "default_page_url")]
    pub base_url: String,
    #[serde(default = "default_page_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PageProviderConfig {
    fn default() -> Self {
        PageProviderConfig {
            base_url: default_page_url(),
            timeout_secs: default_page_timeout_secs(),
        }
    }
}

impl PageProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub api: ApiProviderConfig,
    #[serde(default)]
    pub page: PageProviderConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Asset the summary is valued in.
    #[serde(default = "default_currency")]
    pub currency: AssetType,
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Advisory reachability check before fetching.
    pub connectivity_url: Option<String>,
    pub data_path: Option<String>,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            currency: default_currency(),
            providers: ProvidersConfig::default(),
            connectivity_url: None,
            data_path: None,
            history_limit: default_history_limit(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!("No config at {}, using defaults", config_path.display());
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("app", "goldfolio", "goldfolio")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("app", "goldfolio", "goldfolio")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
