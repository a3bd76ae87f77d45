pub mod cli;
pub mod config;
pub mod core;
pub mod log;
pub mod providers;
pub mod store;

use crate::config::AppConfig;
use crate::core::cache::{KeyValueStore, SeriesCache};
use crate::core::compare::Alignment;
use crate::core::fetch::FetchOrchestrator;
use crate::core::series::{HistoryProvider, Period, ProviderKind};
use crate::providers::{AlphaVantageProvider, EodhdProvider, FigiResolver, YahooProvider};
use crate::store::{DiskStore, MemoryStore};
use anyhow::{Result, bail};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub enum AppCommand {
    Series {
        instrument: String,
        period: Period,
    },
    Report {
        instruments: Vec<String>,
        period: Period,
    },
    Compare {
        instruments: Vec<String>,
        period: Period,
        alignment: Option<Alignment>,
        points: bool,
    },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let store = open_store(&config);
    let cache = SeriesCache::new(Arc::clone(&store), config.cache_ttl_hours);

    let providers = build_providers(&config);
    if providers.is_empty() {
        bail!("No price providers configured; run `fundcmp setup` and add provider credentials");
    }
    let orchestrator = FetchOrchestrator::new(
        providers,
        cache,
        Duration::from_secs(config.fetch_timeout_secs),
    );
    let resolver = FigiResolver::new(
        &config.figi.base_url,
        config.figi.api_key.clone(),
        Arc::clone(&store),
    );

    match command {
        AppCommand::Series { instrument, period } => {
            cli::series::run(&orchestrator, Some(&resolver), &instrument, &period).await
        }
        AppCommand::Report {
            instruments,
            period,
        } => {
            cli::report::run(
                &orchestrator,
                &instruments,
                &period,
                config.max_concurrent_fetches,
            )
            .await
        }
        AppCommand::Compare {
            instruments,
            period,
            alignment,
            points,
        } => {
            cli::compare::run(
                &orchestrator,
                Some(&resolver),
                &instruments,
                &period,
                alignment.unwrap_or(config.alignment),
                config.max_concurrent_fetches,
                points,
            )
            .await
        }
    }
}

/// Opens the persistent store, degrading to the in-memory one when the data
/// directory is unusable. Every command still works, just without a cache
/// across runs.
fn open_store(config: &AppConfig) -> Arc<dyn KeyValueStore> {
    let data_path = match &config.data_path {
        Some(path) => Ok(path.clone()),
        None => AppConfig::default_data_path(),
    };
    match data_path.and_then(|path| DiskStore::open(&path.join("cache"))) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!("Falling back to in-memory cache: {e}");
            Arc::new(MemoryStore::new())
        }
    }
}

fn build_providers(config: &AppConfig) -> Vec<Arc<dyn HistoryProvider>> {
    let mut providers: Vec<Arc<dyn HistoryProvider>> = Vec::new();
    for kind in &config.priority {
        match kind {
            ProviderKind::Yahoo => match &config.providers.yahoo {
                Some(c) => providers.push(Arc::new(YahooProvider::new(&c.base_url))),
                None => debug!("Yahoo provider not configured, skipping"),
            },
            ProviderKind::Eodhd => match &config.providers.eodhd {
                Some(c) => providers.push(Arc::new(EodhdProvider::new(&c.base_url, &c.api_token))),
                None => debug!("EODHD provider not configured, skipping"),
            },
            ProviderKind::AlphaVantage => match &config.providers.alpha_vantage {
                Some(c) => {
                    providers.push(Arc::new(AlphaVantageProvider::new(&c.base_url, &c.api_key)))
                }
                None => debug!("Alpha Vantage provider not configured, skipping"),
            },
        }
    }
    providers
}
