//! Weather provider backed by the weatherapi.com current conditions endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use metrohelp_core::{
    model::WeatherSnapshot,
    ports::{FetchFailure, WeatherPort, fetch_json},
};

const BASE_URL: &str = "https://api.weatherapi.com/v1";

/// Response from /current.json
#[derive(Debug, Deserialize)]
struct CurrentResponse {
    location: Location,
    current: Current,
}

#[derive(Debug, Deserialize)]
struct Location {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Current {
    temp_c: f64,
    condition: Condition,
}

#[derive(Debug, Deserialize)]
struct Condition {
    text: String,
    icon: String, // "//cdn.weatherapi.com/weather/64x64/day/116.png"
}

/// Current conditions lookups for a city name.
pub struct WeatherApiPort {
    client: Client,
    api_key: String,
}

impl WeatherApiPort {
    /// Create a new weather port bound to the given HTTP client and API key.
    #[must_use]
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl WeatherPort for WeatherApiPort {
    async fn current(&self, city: &str) -> Result<WeatherSnapshot, FetchFailure> {
        let req = self
            .client
            .get(format!("{BASE_URL}/current.json"))
            .query(&[("key", self.api_key.as_str()), ("q", city.trim())]);

        let resp = fetch_json::<CurrentResponse>(req).await?;
        Ok(normalize(resp))
    }
}

/// Build the weather port.
#[must_use]
pub fn port(client: Client, api_key: impl Into<String>) -> Arc<dyn WeatherPort> {
    Arc::new(WeatherApiPort::new(client, api_key))
}

fn normalize(resp: CurrentResponse) -> WeatherSnapshot {
    WeatherSnapshot {
        condition_icon_url: absolute_icon_url(&resp.current.condition.icon),
        condition_text: resp.current.condition.text,
        temperature_celsius: resp.current.temp_c,
        location_name: resp.location.name,
    }
}

/// weatherapi.com hands out scheme-relative icon URLs.
fn absolute_icon_url(icon: &str) -> String {
    let icon = icon.trim();
    if icon.starts_with("//") {
        format!("https:{icon}")
    } else if icon.contains("://") {
        icon.to_owned()
    } else {
        format!("https://{icon}")
    }
}

#[cfg(test)]
mod tests {
    use metrohelp_core::ports::decode_json;

    use super::*;

    const CURRENT: &str = r#"{
        "location": { "name": "Helsinki", "country": "Finland" },
        "current": {
            "temp_c": -3.5,
            "is_day": 1,
            "condition": {
                "text": "Light snow",
                "icon": "//cdn.weatherapi.com/weather/64x64/day/326.png",
                "code": 1213
            }
        }
    }"#;

    #[test]
    fn snapshot_fields_are_mapped() {
        let snapshot = normalize(decode_json(CURRENT).expect("fixture matches wire format"));

        assert_eq!(snapshot.location_name, "Helsinki", "location");
        assert_eq!(snapshot.condition_text, "Light snow", "condition");
        assert!((snapshot.temperature_celsius - -3.5).abs() < f64::EPSILON, "temperature");
        assert_eq!(
            snapshot.condition_icon_url,
            "https://cdn.weatherapi.com/weather/64x64/day/326.png",
            "icon gets https scheme"
        );
    }

    #[test]
    fn icon_with_scheme_is_left_alone() {
        assert_eq!(
            absolute_icon_url("http://example.com/icon.png"),
            "http://example.com/icon.png",
            "existing scheme"
        );
    }

    #[test]
    fn bare_icon_host_gets_https() {
        assert_eq!(
            absolute_icon_url("cdn.weatherapi.com/a.png"),
            "https://cdn.weatherapi.com/a.png",
            "bare host"
        );
    }

    #[test]
    fn missing_current_block_is_a_schema_failure() {
        let result = decode_json::<CurrentResponse>(r#"{ "location": { "name": "Espoo" } }"#);
        assert!(matches!(result, Err(FetchFailure::Schema(_))), "got {result:?}");
    }
}
