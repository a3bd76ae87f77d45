use crate::core::compare::Alignment;
use crate::core::series::ProviderKind;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct YahooProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EodhdProviderConfig {
    pub base_url: String,
    pub api_token: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AlphaVantageProviderConfig {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FigiConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for FigiConfig {
    fn default() -> Self {
        FigiConfig {
            base_url: "https://api.openfigi.com".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub yahoo: Option<YahooProviderConfig>,
    #[serde(default)]
    pub eodhd: Option<EodhdProviderConfig>,
    #[serde(default)]
    pub alpha_vantage: Option<AlphaVantageProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        // Yahoo needs no credentials; the other two stay off until the user
        // adds their keys.
        ProvidersConfig {
            yahoo: Some(YahooProviderConfig {
                base_url: "https://query1.finance.yahoo.com".to_string(),
            }),
            eodhd: None,
            alpha_vantage: None,
        }
    }
}

fn default_priority() -> Vec<ProviderKind> {
    vec![
        ProviderKind::Yahoo,
        ProviderKind::Eodhd,
        ProviderKind::AlphaVantage,
    ]
}

fn default_cache_ttl_hours() -> i64 {
    24
}

fn default_fetch_timeout_secs() -> u64 {
    15
}

fn default_max_concurrent_fetches() -> usize {
    4
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Fallback order; providers missing from the list are never tried.
    #[serde(default = "default_priority")]
    pub priority: Vec<ProviderKind>,
    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: i64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    #[serde(default)]
    pub alignment: Alignment,
    #[serde(default)]
    pub figi: FigiConfig,
    /// Overrides the platform data directory, mainly for tests.
    #[serde(default)]
    pub data_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            providers: ProvidersConfig::default(),
            priority: default_priority(),
            cache_ttl_hours: default_cache_ttl_hours(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            alignment: Alignment::default(),
            figi: FigiConfig::default(),
            data_path: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("in", "codito", "fundcmp")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("in", "codito", "fundcmp")
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
