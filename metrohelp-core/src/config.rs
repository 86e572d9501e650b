//! Static kiosk configuration: campuses, languages, and refresh timing.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::model::{Chain, Language, MenuProviderRef, Site, TransitLocation};

const DEFAULT_MENU_REFRESH_HOUR: u32 = 7;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
const DEFAULT_TRANSIT_RADIUS_METERS: u32 = 500;

#[derive(thiserror::Error, Debug)]
/// Problems found while loading or validating configuration.
pub enum ConfigError {
    /// File could not be read.
    #[error("Config I/O error: {0}")]
    Io(#[from] io::Error),
    /// File is not valid configuration JSON; unknown menu chains end up here.
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// No site is configured.
    #[error("No sites configured")]
    NoSites,
    /// Two sites share a name.
    #[error("Duplicate site name: {0}")]
    DuplicateSite(String),
    /// A site record is unusable.
    #[error("Invalid site {site}: {reason}")]
    InvalidSite {
        /// Site name.
        site: String,
        /// What is wrong with it.
        reason: String,
    },
    /// Language settings are inconsistent.
    #[error("Invalid languages: {0}")]
    InvalidLanguages(String),
    /// Refresh timing is out of range.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Everything the kiosk needs to know before fetching anything.
pub struct KioskConfig {
    /// Campuses in display order; the first one is the default selection.
    pub sites: Vec<Site>,
    /// Languages users may switch between.
    #[serde(default = "default_languages")]
    pub supported_languages: Vec<Language>,
    /// Language used until the user picks one.
    #[serde(default = "default_language")]
    pub default_language: Language,
    /// Local hour at which menus are refreshed.
    #[serde(default = "default_menu_refresh_hour")]
    pub menu_refresh_hour: u32,
    /// Seconds between route and weather refreshes.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_languages() -> Vec<Language> {
    Language::ALL.to_vec()
}

fn default_language() -> Language {
    Language::En
}

fn default_menu_refresh_hour() -> u32 {
    DEFAULT_MENU_REFRESH_HOUR
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

impl Default for KioskConfig {
    fn default() -> Self {
        Self {
            sites: vec![
                campus("Arabia", "Helsinki", Chain::FoodAndCo, 1251, 60.210_051, 24.976_776),
                campus("Karaportti", "Espoo", Chain::FoodAndCo, 3208, 60.224_129, 24.758_460),
                campus("Myllypuro", "Helsinki", Chain::Sodexo, 158, 60.223_622, 25.077_914),
                campus("Myyrmäki", "Vantaa", Chain::Sodexo, 152, 60.258_843, 24.844_850),
            ],
            supported_languages: default_languages(),
            default_language: default_language(),
            menu_refresh_hour: DEFAULT_MENU_REFRESH_HOUR,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

fn campus(name: &str, city: &str, chain: Chain, id: u32, lat: f64, lon: f64) -> Site {
    Site {
        name: name.to_owned(),
        city: city.to_owned(),
        menu_provider: MenuProviderRef { chain, id },
        transit: TransitLocation {
            lat,
            lon,
            radius_meters: DEFAULT_TRANSIT_RADIUS_METERS,
        },
    }
}

impl KioskConfig {
    /// Read and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Parse and validate configuration JSON.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the JSON cannot be parsed or validated.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the rest of the kiosk relies on.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sites.is_empty() {
            return Err(ConfigError::NoSites);
        }

        let mut seen = HashSet::new();
        for site in &self.sites {
            if !seen.insert(site.name.as_str()) {
                return Err(ConfigError::DuplicateSite(site.name.clone()));
            }
            validate_site(site)?;
        }

        if self.supported_languages.is_empty() {
            return Err(ConfigError::InvalidLanguages("no supported languages".into()));
        }
        if !self.supported_languages.contains(&self.default_language) {
            return Err(ConfigError::InvalidLanguages(format!(
                "default language {} is not supported",
                self.default_language
            )));
        }

        if self.menu_refresh_hour > 23 {
            return Err(ConfigError::InvalidSchedule(format!(
                "menu refresh hour {} is not a clock hour",
                self.menu_refresh_hour
            )));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidSchedule("poll interval must be positive".into()));
        }

        Ok(())
    }

    /// Look up a site by name.
    #[must_use]
    pub fn site(&self, name: &str) -> Option<&Site> {
        self.sites.iter().find(|site| site.name == name)
    }

    /// Wall-clock time of the daily menu refresh.
    #[must_use]
    pub fn menu_refresh_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.menu_refresh_hour, 0, 0).unwrap_or(NaiveTime::MIN)
    }

    /// Interval between route and weather refreshes.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn validate_site(site: &Site) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidSite {
        site: site.name.clone(),
        reason: reason.to_owned(),
    };

    if site.name.trim().is_empty() {
        return Err(invalid("empty name"));
    }
    if site.city.trim().is_empty() {
        return Err(invalid("empty city"));
    }
    if !(-90.0..=90.0).contains(&site.transit.lat) || !(-180.0..=180.0).contains(&site.transit.lon)
    {
        return Err(invalid("coordinates out of range"));
    }
    if site.transit.radius_meters == 0 {
        return Err(invalid("transit radius must be positive"));
    }
    Ok(())
}
