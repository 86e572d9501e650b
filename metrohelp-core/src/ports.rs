//! Traits describing provider capabilities and shared helper types.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Error as ReqwestError;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde_json::Error as JsonError;

use crate::model::{
    Announcement, Chain, MenuResult, TransitDeparture, TransitLocation, WeatherSnapshot,
};

#[derive(thiserror::Error, Debug)]
/// Errors that can occur while talking to provider backends.
pub enum FetchFailure {
    /// Transport failed, including client-side timeouts.
    #[error("Network error: {0}")]
    Network(#[from] ReqwestError),
    /// Provider answered with a non-success status.
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    /// Body is not valid JSON.
    #[error("Parse error: {0}")]
    Parse(#[from] JsonError),
    /// Body is JSON but lacks fields the normalizer needs.
    #[error("Schema error: {0}")]
    Schema(String),
}

#[async_trait]
/// Daily menu backend of one canteen chain.
pub trait MenuPort: Send + Sync {
    /// Chain served by this port.
    fn chain(&self) -> Chain;

    /// Fetch and normalize the menu of `restaurant_id` for `date`.
    ///
    /// A day without courses yields [`MenuResult::no_menu_today`], not an error.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchFailure`] when the provider request or decoding fails.
    async fn daily_menu(
        &self,
        restaurant_id: u32,
        date: NaiveDate,
    ) -> Result<MenuResult, FetchFailure>;
}

#[async_trait]
/// Real-time departures near a location.
pub trait TransitPort: Send + Sync {
    /// Fetch at most `per_stop` departures for every stop in the catchment,
    /// merged and sorted by departure time.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchFailure`] when the provider request or decoding fails.
    async fn departures(
        &self,
        location: &TransitLocation,
        per_stop: u32,
    ) -> Result<Vec<TransitDeparture>, FetchFailure>;
}

#[async_trait]
/// Current weather conditions.
pub trait WeatherPort: Send + Sync {
    /// Fetch the current conditions in `city`.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchFailure`] when the provider request or decoding fails.
    async fn current(&self, city: &str) -> Result<WeatherSnapshot, FetchFailure>;
}

#[async_trait]
/// Campus announcement feed.
pub trait AnnouncementPort: Send + Sync {
    /// Fetch the feed in display order.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchFailure`] when the provider request or decoding fails.
    async fn announcements(&self) -> Result<Vec<Announcement>, FetchFailure>;
}

/// Send `req` once and decode a JSON body into `T`.
///
/// # Errors
///
/// Maps transport errors to [`FetchFailure::Network`], non-2xx statuses to
/// [`FetchFailure::HttpStatus`], and decoding errors as in [`decode_json`].
pub async fn fetch_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, FetchFailure> {
    let response = req.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchFailure::HttpStatus(status.as_u16()));
    }
    let body = response.text().await?;
    decode_json(&body)
}

/// Decode `body` into `T`, telling malformed JSON apart from a wrong shape.
///
/// # Errors
///
/// Returns [`FetchFailure::Parse`] when `body` is not JSON and
/// [`FetchFailure::Schema`] when it does not match `T`.
pub fn decode_json<T: DeserializeOwned>(body: &str) -> Result<T, FetchFailure> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    serde_json::from_value(value).map_err(|err| FetchFailure::Schema(err.to_string()))
}

/// Keep the first `per_stop` departures of every stop and order the merged
/// list by departure time.
#[must_use]
pub fn merge_stop_departures(
    stops: Vec<Vec<TransitDeparture>>,
    per_stop: u32,
) -> Vec<TransitDeparture> {
    let per_stop = usize::try_from(per_stop).unwrap_or(usize::MAX);
    let mut merged: Vec<TransitDeparture> = stops
        .into_iter()
        .flat_map(|stop| stop.into_iter().take(per_stop))
        .collect();
    merged.sort_by_key(|departure| departure.realtime_departure_epoch_seconds);
    merged
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::model::TransitMode;

    #[derive(Debug, Deserialize)]
    struct Probe {
        #[expect(dead_code, reason = "only presence is checked")]
        name: String,
    }

    fn departure(stop: &str, at: i64) -> TransitDeparture {
        TransitDeparture {
            mode: TransitMode::Bus,
            stop_code: stop.to_owned(),
            stop_name: format!("Stop {stop}"),
            route_number: "55".to_owned(),
            destination: "Rautatientori".to_owned(),
            realtime_departure_epoch_seconds: at,
            stop_lat: 60.2,
            stop_lon: 24.9,
        }
    }

    #[test]
    fn malformed_body_is_a_parse_failure() {
        let result = decode_json::<Probe>("{not json");
        assert!(matches!(result, Err(FetchFailure::Parse(_))), "got {result:?}");
    }

    #[test]
    fn missing_field_is_a_schema_failure() {
        let result = decode_json::<Probe>(r#"{"title": "x"}"#);
        assert!(matches!(result, Err(FetchFailure::Schema(_))), "got {result:?}");
    }

    #[test]
    fn merged_departures_are_sorted_ascending() {
        let merged = merge_stop_departures(
            vec![vec![departure("H1", 50)], vec![departure("H2", 10), departure("H2", 30)]],
            2,
        );
        let times: Vec<i64> = merged
            .iter()
            .map(|dep| dep.realtime_departure_epoch_seconds)
            .collect();
        assert_eq!(times, vec![10, 30, 50], "departures must be globally ordered");
    }

    #[test]
    fn each_stop_contributes_at_most_per_stop_departures() {
        let merged = merge_stop_departures(
            vec![
                vec![departure("H1", 5), departure("H1", 6), departure("H1", 7)],
                vec![departure("H2", 1)],
            ],
            2,
        );
        let codes: Vec<&str> = merged.iter().map(|dep| dep.stop_code.as_str()).collect();
        assert_eq!(codes, vec!["H2", "H1", "H1"], "H1 is capped at two, H2 has one");
    }
}
