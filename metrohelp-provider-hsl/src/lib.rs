//! Transit provider for HSL real-time departures via the Digitransit routing API.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::debug;

use metrohelp_core::{
    model::{TransitDeparture, TransitLocation, TransitMode},
    ports::{FetchFailure, TransitPort, fetch_json, merge_stop_departures},
};

const GRAPHQL_URL: &str = "https://api.digitransit.fi/routing/v1/routers/hsl/index/graphql";
const SUBSCRIPTION_KEY_HEADER: &str = "digitransit-subscription-key";

/// Departures leaving sooner than this cannot be reached from the kiosk.
const WALK_MARGIN_SECS: i64 = 240;

/// GraphQL envelope; `data` is absent when the query failed.
#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<StopsData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StopsData {
    #[serde(default)]
    stops_by_radius: Option<StopConnection>,
}

#[derive(Debug, Deserialize)]
struct StopConnection {
    #[serde(default)]
    edges: Vec<StopEdge>,
}

#[derive(Debug, Deserialize)]
struct StopEdge {
    node: StopAtDistance,
}

#[derive(Debug, Deserialize)]
struct StopAtDistance {
    #[serde(default)]
    stop: Option<Stop>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Stop {
    lat: f64,
    lon: f64,
    #[serde(default)]
    code: Option<String>, // absent on some platform stops
    name: String,
    #[serde(default)]
    stoptimes_without_patterns: Vec<StopTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StopTime {
    realtime_departure: i64, // seconds since service day start
    service_day: i64,        // epoch seconds of the service day
    trip: Trip,
    #[serde(default)]
    headsign: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Trip {
    route: Route,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Route {
    #[serde(default)]
    short_name: Option<String>,
    #[serde(default)]
    mode: Option<String>,
}

/// Departure lookups against the HSL region of Digitransit.
pub struct HslTransitPort {
    client: Client,
    subscription_key: Option<String>,
}

impl HslTransitPort {
    /// Create a new transit port bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            subscription_key: None,
        }
    }

    /// Send `key` as the Digitransit subscription key on every request.
    #[must_use]
    pub fn with_subscription_key(mut self, key: impl Into<String>) -> Self {
        self.subscription_key = Some(key.into());
        self
    }
}

#[async_trait]
impl TransitPort for HslTransitPort {
    async fn departures(
        &self,
        location: &TransitLocation,
        per_stop: u32,
    ) -> Result<Vec<TransitDeparture>, FetchFailure> {
        let start_time = Utc::now().timestamp() + WALK_MARGIN_SECS;
        let mut req = self
            .client
            .post(GRAPHQL_URL)
            .header(CONTENT_TYPE, "application/graphql")
            .body(stops_query(location, per_stop, start_time));
        if let Some(key) = &self.subscription_key {
            req = req.header(SUBSCRIPTION_KEY_HEADER, key);
        }

        let resp = fetch_json::<GraphQlResponse>(req).await?;
        let departures = normalize(resp, per_stop)?;
        debug!(
            lat = location.lat,
            lon = location.lon,
            count = departures.len(),
            "hsl departures"
        );
        Ok(departures)
    }
}

/// Build the transit port, attaching the subscription key when one is configured.
#[must_use]
pub fn port(client: Client, subscription_key: Option<String>) -> Arc<dyn TransitPort> {
    let port = HslTransitPort::new(client);
    match subscription_key {
        Some(key) => Arc::new(port.with_subscription_key(key)),
        None => Arc::new(port),
    }
}

fn stops_query(location: &TransitLocation, per_stop: u32, start_time: i64) -> String {
    format!(
        "{{
  stopsByRadius(lat: {lat}, lon: {lon}, radius: {radius}) {{
    edges {{
      node {{
        stop {{
          lat
          lon
          code
          name
          stoptimesWithoutPatterns(numberOfDepartures: {per_stop}, startTime: {start_time}) {{
            realtimeDeparture
            serviceDay
            trip {{
              route {{
                shortName
                mode
              }}
            }}
            headsign
          }}
        }}
      }}
    }}
  }}
}}",
        lat = location.lat,
        lon = location.lon,
        radius = location.radius_meters,
    )
}

fn normalize(resp: GraphQlResponse, per_stop: u32) -> Result<Vec<TransitDeparture>, FetchFailure> {
    let connection = resp
        .data
        .ok_or_else(|| FetchFailure::Schema("response has no data".to_owned()))?
        .stops_by_radius
        .ok_or_else(|| FetchFailure::Schema("response has no stopsByRadius".to_owned()))?;

    let stops = connection
        .edges
        .into_iter()
        .filter_map(|edge| edge.node.stop)
        .map(stop_departures)
        .collect();

    Ok(merge_stop_departures(stops, per_stop))
}

fn stop_departures(stop: Stop) -> Vec<TransitDeparture> {
    let stop_code = stop.code.unwrap_or_default();
    stop.stoptimes_without_patterns
        .into_iter()
        .map(|time| TransitDeparture {
            mode: parse_mode(time.trip.route.mode.as_deref()),
            stop_code: stop_code.clone(),
            stop_name: stop.name.clone(),
            route_number: time.trip.route.short_name.unwrap_or_default(),
            destination: time.headsign.unwrap_or_default(),
            realtime_departure_epoch_seconds: time.service_day + time.realtime_departure,
            stop_lat: stop.lat,
            stop_lon: stop.lon,
        })
        .collect()
}

fn parse_mode(mode: Option<&str>) -> TransitMode {
    match mode {
        Some("BUS") => TransitMode::Bus,
        Some("SUBWAY") => TransitMode::Subway,
        Some("TRAM") => TransitMode::Tram,
        Some("RAIL") => TransitMode::Rail,
        _ => TransitMode::Other,
    }
}
