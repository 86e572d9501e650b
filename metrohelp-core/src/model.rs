//! Domain data structures for sites, menus, departures, weather, and announcements.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};

use crate::notices;

/// Languages the kiosk can display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Finnish.
    Fi,
    /// English.
    En,
}

impl Language {
    /// Every language with localized provider data.
    pub const ALL: [Self; 2] = [Self::Fi, Self::En];

    /// Two-letter code used by providers and in persisted settings.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Fi => "fi",
            Self::En => "en",
        }
    }

    /// Resolve a two-letter code, ignoring ASCII case.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|language| language.code().eq_ignore_ascii_case(code.trim()))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.code())
    }
}

/// Text keyed by display language.
pub type Localized<T> = BTreeMap<Language, T>;

/// Canteen operator; the two chains publish structurally different menus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Chain {
    /// Food & Co (Compass Group) week-menu API.
    #[serde(rename = "foodco", alias = "Food & Co")]
    FoodAndCo,
    /// Sodexo daily JSON API.
    #[serde(rename = "sodexo", alias = "Sodexo")]
    Sodexo,
}

impl fmt::Display for Chain {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Chain::FoodAndCo => "Food & Co",
            Chain::Sodexo => "Sodexo",
        };
        formatter.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Which canteen serves a site and under which restaurant id.
pub struct MenuProviderRef {
    /// Operator of the canteen.
    pub chain: Chain,
    /// Restaurant (cost center) identifier at the operator.
    pub id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// Centre and radius of the transit catchment around a site.
pub struct TransitLocation {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Search radius in meters.
    pub radius_meters: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A campus location with its canteen and transit catchment.
pub struct Site {
    /// Unique display name, also used as the cache key.
    pub name: String,
    /// City used for weather lookups.
    pub city: String,
    /// Canteen serving the site.
    pub menu_provider: MenuProviderRef,
    /// Transit catchment.
    pub transit: TransitLocation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A single dish or meal package on a daily menu.
pub struct MenuCourse {
    /// Course name per language; never empty.
    pub name: Localized<String>,
    /// Diet labels such as `G` or `VEG`.
    pub diet_codes: BTreeSet<String>,
    /// Price text as published by the provider.
    pub price: Option<String>,
}

impl MenuCourse {
    /// Placeholder course carrying only localized text.
    #[must_use]
    pub fn notice(text: Localized<String>) -> Self {
        Self {
            name: text,
            diet_codes: BTreeSet::new(),
            price: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Normalized daily menu of one site.
pub struct MenuResult {
    /// Operator name shown in the heading.
    pub provider_title: String,
    /// Courses in provider order; never empty.
    pub courses: Vec<MenuCourse>,
    /// Legend for the diet codes per language.
    pub diet_code_explanations: Localized<String>,
}

impl MenuResult {
    /// Result for a provider that answered but lists nothing for today.
    #[must_use]
    pub fn no_menu_today(provider_title: impl Into<String>) -> Self {
        Self {
            provider_title: provider_title.into(),
            courses: vec![MenuCourse::notice(notices::no_menu_today())],
            diet_code_explanations: Localized::new(),
        }
    }

    /// Result for a site whose menu has never been fetched successfully.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            provider_title: String::new(),
            courses: vec![MenuCourse::notice(notices::menu_unavailable())],
            diet_code_explanations: Localized::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Vehicle type of a departure.
pub enum TransitMode {
    /// Bus.
    Bus,
    /// Metro.
    Subway,
    /// Tram.
    Tram,
    /// Commuter train.
    Rail,
    /// Ferries and anything else the provider reports.
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One upcoming vehicle at a stop near a site.
pub struct TransitDeparture {
    /// Vehicle type.
    pub mode: TransitMode,
    /// Short stop code painted on the stop sign.
    pub stop_code: String,
    /// Stop name.
    pub stop_name: String,
    /// Line number.
    pub route_number: String,
    /// Headsign.
    pub destination: String,
    /// Real-time departure as Unix seconds.
    pub realtime_departure_epoch_seconds: i64,
    /// Stop latitude.
    pub stop_lat: f64,
    /// Stop longitude.
    pub stop_lon: f64,
}

impl TransitDeparture {
    /// Departure instant in the host's local time zone.
    #[must_use]
    pub fn departure_time(&self) -> Option<DateTime<Local>> {
        Local
            .timestamp_opt(self.realtime_departure_epoch_seconds, 0)
            .single()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Current conditions for a site's city.
pub struct WeatherSnapshot {
    /// Absolute icon URL.
    pub condition_icon_url: String,
    /// Condition text, e.g. "Light snow".
    pub condition_text: String,
    /// Temperature in degrees Celsius.
    pub temperature_celsius: f64,
    /// Location name reported by the provider.
    pub location_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One language version of an announcement.
pub struct AnnouncementContent {
    /// Headline.
    pub title: String,
    /// Rich text body.
    pub body: String,
    /// Illustration URL.
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Campus announcement in every language the feed provides.
pub struct Announcement {
    /// Content per language; at least one entry.
    pub localized: Localized<AnnouncementContent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Process-wide display selection.
pub struct Selection {
    /// Display language.
    pub language: Language,
    /// Name of the site whose data is shown.
    pub active_site: String,
    /// Dark colour scheme.
    pub dark_mode: bool,
    /// Departures to show per stop, at least one.
    pub departures_per_stop: u32,
}
