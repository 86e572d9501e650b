//! Headless kiosk host: wires the providers into the refresh scheduler and
//! logs every update until interrupted.

mod presenter;
mod settings;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use metrohelp_core::{
    Aggregator, FileBackend, KioskConfig, PersistentCache, ProviderPorts, ProviderRegistry,
    RefreshScheduler, SelectionState,
};
use metrohelp_provider_announcements as announcements;
use metrohelp_provider_foodco as foodco;
use metrohelp_provider_hsl as hsl;
use metrohelp_provider_sodexo as sodexo;
use metrohelp_provider_weatherapi as weatherapi;
use reqwest::Client;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::presenter::LogPresenter;
use crate::settings::HostSettings;

const DEFAULT_LOG_FILTER: &str = "metrohelp=info";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<()> {
    // .env first so RUST_LOG from it applies
    let dotenv = dotenvy::dotenv();
    init_tracing();
    if let Err(err) = dotenv
        && !err.not_found()
    {
        warn!(error = %err, "Ignoring unreadable .env file");
    }

    let settings = HostSettings::from_env();
    let config = match &settings.config_path {
        Some(path) => KioskConfig::load(path)
            .with_context(|| format!("loading kiosk config from {}", path.display()))?,
        None => KioskConfig::default(),
    };
    info!(sites = config.sites.len(), "Kiosk configuration loaded");

    let backend = FileBackend::open(settings.cache_dir.clone())
        .with_context(|| format!("opening cache dir {}", settings.cache_dir.display()))?;
    let cache = PersistentCache::new(Arc::new(backend));

    // HTTP + provider setup
    let client = Client::builder()
        .user_agent("metrohelp/0.1")
        .timeout(REQUEST_TIMEOUT)
        .build()?;

    if settings.weather_key.is_none() {
        warn!("WEATHERAPI_KEY is not set, weather will be unavailable");
    }
    let registry = Arc::new(ProviderRegistry::new(ProviderPorts {
        food_and_co: foodco::port(client.clone()),
        sodexo: sodexo::port(client.clone()),
        transit: hsl::port(client.clone(), settings.digitransit_key.clone()),
        weather: weatherapi::port(client.clone(), settings.weather_key.clone().unwrap_or_default()),
        announcements: announcements::port(client, settings.announcements_url.clone()),
    }));

    let selection = Arc::new(SelectionState::load(&config, cache.clone()));
    let aggregator = Arc::new(Aggregator::new(registry, cache));
    let scheduler = Arc::new(RefreshScheduler::new(aggregator, Arc::clone(&selection), &config));
    scheduler.subscribe(LogPresenter::new(selection));

    let handle = Arc::clone(&scheduler).start();

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("Shutting down");
    handle.shutdown().await;
    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
