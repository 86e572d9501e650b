//! Presenter that writes every published update to the log in the selected language.

use std::sync::Arc;

use metrohelp_core::{
    Announcement, Fetched, Freshness, Language, Localized, MenuResult, Presenter,
    SelectionState, TransitDeparture, Update, WeatherSnapshot, notices,
};
use tracing::{info, warn};

/// Logs updates as short human-readable lines.
pub(crate) struct LogPresenter {
    selection: Arc<SelectionState>,
}

impl LogPresenter {
    pub(crate) fn new(selection: Arc<SelectionState>) -> Self {
        Self { selection }
    }
}

impl Presenter for LogPresenter {
    fn render(&self, update: &Update) {
        let selection = self.selection.get();
        let freshness = freshness(update);
        let domain = update.domain();
        let site = update.site().unwrap_or("-");

        if freshness == Freshness::Unavailable {
            warn!(%domain, site, "no data available");
        }
        for line in describe(update, selection.language) {
            info!(%domain, site, ?freshness, "{line}");
        }
    }
}

fn freshness(update: &Update) -> Freshness {
    match update {
        Update::Menu { menu, .. } => menu.freshness,
        Update::Routes { departures, .. } => departures.freshness,
        Update::Weather { weather, .. } => weather.freshness,
        Update::Announcements(feed) => feed.freshness,
    }
}

/// Text lines for `update` in `language`.
fn describe(update: &Update, language: Language) -> Vec<String> {
    match update {
        Update::Menu { menu, .. } => menu_lines(&menu.value, language),
        Update::Routes { departures, .. } => departures.value.iter().map(departure_line).collect(),
        Update::Weather { weather, .. } => vec![weather_line(weather)],
        Update::Announcements(Fetched { value, .. }) => announcement_lines(value, language),
    }
}

fn menu_lines(menu: &MenuResult, language: Language) -> Vec<String> {
    let mut lines = Vec::with_capacity(menu.courses.len() + 1);
    if !menu.provider_title.is_empty() {
        lines.push(menu.provider_title.clone());
    }
    for course in &menu.courses {
        let name = pick(&course.name, language).map_or("", String::as_str);
        let diets = if course.diet_codes.is_empty() {
            String::new()
        } else {
            let codes: Vec<&str> = course.diet_codes.iter().map(String::as_str).collect();
            format!(" ({})", codes.join(", "))
        };
        let price = course
            .price
            .as_ref()
            .map(|price| format!(" {price}"))
            .unwrap_or_default();
        lines.push(format!("{name}{diets}{price}"));
    }
    lines
}

fn departure_line(departure: &TransitDeparture) -> String {
    let time = departure
        .departure_time()
        .map_or_else(|| "--:--".to_owned(), |at| at.format("%H:%M").to_string());
    format!(
        "{time} {} {} ({} {})",
        departure.route_number, departure.destination, departure.stop_code, departure.stop_name
    )
}

fn weather_line(weather: &Fetched<Option<WeatherSnapshot>>) -> String {
    match &weather.value {
        Some(snapshot) => format!(
            "{:.1} °C {} in {}",
            snapshot.temperature_celsius, snapshot.condition_text, snapshot.location_name
        ),
        None => "weather unavailable".to_owned(),
    }
}

fn announcement_lines(announcements: &[Announcement], language: Language) -> Vec<String> {
    if announcements.is_empty() {
        return pick(&notices::no_announcements(), language)
            .cloned()
            .into_iter()
            .collect();
    }
    announcements
        .iter()
        .filter_map(|announcement| pick(&announcement.localized, language))
        .map(|content| content.title.clone())
        .collect()
}

/// Text in `language`, or in any language the provider gave.
fn pick<T>(localized: &Localized<T>, language: Language) -> Option<&T> {
    localized
        .get(&language)
        .or_else(|| localized.values().next())
}
