//! Host settings read from the process environment.

use std::env;
use std::path::PathBuf;

const CONFIG_VAR: &str = "METROHELP_CONFIG";
const CACHE_DIR_VAR: &str = "METROHELP_CACHE_DIR";
const WEATHER_KEY_VAR: &str = "WEATHERAPI_KEY";
const DIGITRANSIT_KEY_VAR: &str = "DIGITRANSIT_KEY";
const ANNOUNCEMENTS_URL_VAR: &str = "METROHELP_ANNOUNCEMENTS_URL";

const DEFAULT_CACHE_DIR: &str = "./cache";

/// Everything the host needs that is not part of the kiosk configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HostSettings {
    /// Configuration file; the built-in campuses are used when absent.
    pub(crate) config_path: Option<PathBuf>,
    /// Directory holding the persistent cache.
    pub(crate) cache_dir: PathBuf,
    /// weatherapi.com key.
    pub(crate) weather_key: Option<String>,
    /// Digitransit subscription key.
    pub(crate) digitransit_key: Option<String>,
    /// Override for the announcement feed location.
    pub(crate) announcements_url: Option<String>,
}

impl HostSettings {
    /// Read settings from the environment.
    pub(crate) fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read settings through `lookup`; blank values count as unset.
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        Self {
            config_path: read(CONFIG_VAR).map(PathBuf::from),
            cache_dir: PathBuf::from(read(CACHE_DIR_VAR).unwrap_or_else(|| DEFAULT_CACHE_DIR.to_owned())),
            weather_key: read(WEATHER_KEY_VAR),
            digitransit_key: read(DIGITRANSIT_KEY_VAR),
            announcements_url: read(ANNOUNCEMENTS_URL_VAR),
        }
    }
}
