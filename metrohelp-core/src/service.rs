//! Aggregation facade: fetch from providers, fall back to the cache, never fail.

use std::sync::Arc;

use chrono::Local;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::task;

use crate::cache::{Domain, PersistentCache};
use crate::model::{Announcement, MenuResult, Site, TransitDeparture, WeatherSnapshot};
use crate::plugin::ProviderRegistry;
use crate::ports::FetchFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Where a served value came from.
pub enum Freshness {
    /// Fetched from the provider just now.
    Fresh,
    /// Last-known-good value from the cache; the provider failed.
    Stale,
    /// Placeholder; the provider failed and nothing was cached.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq)]
/// A value served by the [`Aggregator`] together with its origin.
pub struct Fetched<T> {
    /// The served value; same shape whatever its origin.
    pub value: T,
    /// Origin of `value`.
    pub freshness: Freshness,
}

impl<T> Fetched<T> {
    /// Transform the value, keeping its origin.
    pub fn map<U>(self, transform: impl FnOnce(T) -> U) -> Fetched<U> {
        Fetched {
            value: transform(self.value),
            freshness: self.freshness,
        }
    }

    fn unavailable(value: T) -> Self {
        Self {
            value,
            freshness: Freshness::Unavailable,
        }
    }
}

/// Public entry point for reading kiosk data.
///
/// Every method returns a value: provider failures are logged and replaced by
/// the cached value, or by the domain's placeholder when nothing is cached.
pub struct Aggregator {
    registry: Arc<ProviderRegistry>,
    cache: PersistentCache,
}

impl Aggregator {
    /// Create an aggregator over `registry`, persisting into `cache`.
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>, cache: PersistentCache) -> Self {
        Self { registry, cache }
    }

    /// Today's menu for `site`.
    pub async fn menu(&self, site: &Site) -> Fetched<MenuResult> {
        let provider = site.menu_provider;
        let today = Local::now().date_naive();
        let result = self
            .registry
            .menu(provider.chain)
            .daily_menu(provider.id, today)
            .await;
        self.settle(Domain::Menus, Some(&site.name), result)
            .await
            .unwrap_or_else(|| Fetched::unavailable(MenuResult::unavailable()))
    }

    /// Upcoming departures near `site`, at most `per_stop` per stop, soonest first.
    pub async fn routes(&self, site: &Site, per_stop: u32) -> Fetched<Vec<TransitDeparture>> {
        let result = self
            .registry
            .transit()
            .departures(&site.transit, per_stop.max(1))
            .await;
        self.settle(Domain::Routes, Some(&site.name), result)
            .await
            .unwrap_or_else(|| Fetched::unavailable(Vec::new()))
    }

    /// Current weather in `site`'s city; `None` when never fetched.
    pub async fn weather(&self, site: &Site) -> Fetched<Option<WeatherSnapshot>> {
        let result = self.registry.weather().current(&site.city).await;
        self.settle(Domain::Weather, Some(&site.name), result)
            .await
            .map_or_else(|| Fetched::unavailable(None), |fetched| fetched.map(Some))
    }

    /// Campus announcements in feed order.
    pub async fn announcements(&self) -> Fetched<Vec<Announcement>> {
        let result = self.registry.announcements().announcements().await;
        self.settle(Domain::Announcements, None, result)
            .await
            .unwrap_or_else(|| Fetched::unavailable(Vec::new()))
    }

    /// Fresh value written through to the cache, or the cached value, or
    /// `None` when there is nothing valid to serve.
    async fn settle<T>(
        &self,
        domain: Domain,
        site_key: Option<&str>,
        result: Result<T, FetchFailure>,
    ) -> Option<Fetched<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        match result {
            Ok(value) => {
                self.write_through(domain, site_key, &value).await;
                Some(Fetched {
                    value,
                    freshness: Freshness::Fresh,
                })
            }
            Err(failure) => {
                tracing::warn!(%domain, site = ?site_key, error = %failure, "Provider fetch failed");
                let Some(value) = self.cache.get_payload(domain, site_key) else {
                    tracing::warn!(%domain, site = ?site_key, "No cached data, serving placeholder");
                    return None;
                };
                tracing::info!(%domain, site = ?site_key, "Serving cached data");
                Some(Fetched {
                    value,
                    freshness: Freshness::Stale,
                })
            }
        }
    }

    /// Store `value` off the async workers; returns once the write finished.
    async fn write_through<T: Serialize>(&self, domain: Domain, site_key: Option<&str>, value: &T) {
        let payload = match serde_json::to_value(value) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(%domain, site = ?site_key, error = %err, "Failed to cache fresh data");
                return;
            }
        };
        let cache = self.cache.clone();
        let key = site_key.map(str::to_owned);
        let written =
            task::spawn_blocking(move || cache.put(domain, key.as_deref(), &payload)).await;
        match written {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(%domain, site = ?site_key, error = %err, "Failed to cache fresh data");
            }
            Err(err) => {
                tracing::warn!(%domain, site = ?site_key, error = %err, "Cache write task failed");
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Fakes, Scripted, departure, menu, site, weather};
    use super::*;
    use crate::notices;

    fn aggregator(fakes: &Fakes, cache: &PersistentCache) -> Aggregator {
        Aggregator::new(fakes.registry(), cache.clone())
    }

    #[tokio::test]
    async fn fresh_menu_is_cached() {
        let fakes = Fakes::failing();
        fakes.food_and_co.push(Scripted::Ok(menu("Food & Co", "Lohikeitto")));
        let cache = PersistentCache::in_memory();

        let served = aggregator(&fakes, &cache).menu(&site("Arabia")).await;

        assert_eq!(served.freshness, Freshness::Fresh, "provider answered");
        let cached: Option<MenuResult> = cache.get_payload(Domain::Menus, Some("Arabia"));
        assert_eq!(cached, Some(served.value), "fresh value written through");
    }

    #[tokio::test]
    async fn failed_menu_falls_back_to_cache() {
        let fakes = Fakes::failing();
        let cache = PersistentCache::in_memory();
        let stored = menu("Food & Co", "Broileria");
        cache
            .put(Domain::Menus, Some("Arabia"), &stored)
            .expect("memory write succeeds");

        let served = aggregator(&fakes, &cache).menu(&site("Arabia")).await;

        assert_eq!(served.freshness, Freshness::Stale, "served from cache");
        assert_eq!(served.value, stored, "cached payload returned unchanged");
    }

    #[tokio::test]
    async fn menu_without_cache_is_the_unavailable_notice() {
        let fakes = Fakes::failing();

        let served = aggregator(&fakes, &PersistentCache::in_memory())
            .menu(&site("Myyrmäki"))
            .await;

        assert_eq!(served.freshness, Freshness::Unavailable, "nothing to serve");
        assert_eq!(served.value.courses.len(), 1, "exactly one placeholder course");
        assert_eq!(
            served.value.courses.first().map(|course| &course.name),
            Some(&notices::menu_unavailable()),
            "localized placeholder text"
        );
    }

    #[tokio::test]
    async fn chain_selects_the_menu_port() {
        let fakes = Fakes::failing();
        let cache = PersistentCache::in_memory();
        let service = aggregator(&fakes, &cache);

        service.menu(&site("Arabia")).await;
        service.menu(&site("Myllypuro")).await;

        assert_eq!(fakes.food_and_co.calls(), vec!["1251".to_owned()], "Food & Co site");
        assert_eq!(fakes.sodexo.calls(), vec!["158".to_owned()], "Sodexo site");
    }

    #[tokio::test]
    async fn failed_routes_without_cache_are_empty() {
        let fakes = Fakes::failing();

        let served = aggregator(&fakes, &PersistentCache::in_memory())
            .routes(&site("Arabia"), 2)
            .await;

        assert_eq!(served.freshness, Freshness::Unavailable, "nothing to serve");
        assert!(served.value.is_empty(), "empty departure list");
    }

    #[tokio::test]
    async fn routes_request_at_least_one_departure() {
        let fakes = Fakes::failing();
        fakes.transit.push(Scripted::Ok(vec![departure(10)]));

        aggregator(&fakes, &PersistentCache::in_memory())
            .routes(&site("Arabia"), 0)
            .await;

        let calls = fakes.transit.calls();
        assert!(
            calls.first().is_some_and(|call| call.ends_with(":1")),
            "got {calls:?}"
        );
    }

    #[tokio::test]
    async fn failed_weather_repeats_do_not_rewrite_cache() {
        let fakes = Fakes::failing();
        fakes.weather.push(Scripted::Ok(weather(-3.0)));
        let cache = PersistentCache::in_memory();
        let service = aggregator(&fakes, &cache);

        service.weather(&site("Arabia")).await;
        let first = cache.get(Domain::Weather, Some("Arabia"));
        let stale = service.weather(&site("Arabia")).await;
        service.weather(&site("Arabia")).await;
        let last = cache.get(Domain::Weather, Some("Arabia"));

        assert!(first.is_some(), "first fetch was cached");
        assert_eq!(first, last, "failures leave the entry untouched");
        assert_eq!(stale.freshness, Freshness::Stale, "stale after failure");
        assert_eq!(stale.value, Some(weather(-3.0)), "cached snapshot served");
    }

    #[tokio::test]
    async fn null_weather_entry_is_not_served_as_stale() {
        let fakes = Fakes::failing();
        let cache = PersistentCache::in_memory();
        cache
            .put(Domain::Weather, Some("Arabia"), &serde_json::Value::Null)
            .expect("memory write succeeds");

        let served = aggregator(&fakes, &cache).weather(&site("Arabia")).await;

        assert_eq!(served.freshness, Freshness::Unavailable, "null entry is a miss");
        assert_eq!(served.value, None, "no weather to show");
    }

    #[tokio::test]
    async fn menu_turns_stale_when_provider_starts_failing() {
        let fakes = Fakes::failing();
        fakes.sodexo.push(Scripted::Ok(menu("Sodexo", "Hernekeitto")));
        fakes.sodexo.push(Scripted::Fail);
        fakes.sodexo.push(Scripted::Ok(menu("Sodexo", "Pannukakku")));
        let cache = PersistentCache::in_memory();
        let service = aggregator(&fakes, &cache);

        let fresh = service.menu(&site("Myllypuro")).await;
        let stale = service.menu(&site("Myllypuro")).await;
        let recovered = service.menu(&site("Myllypuro")).await;

        assert_eq!(fresh.freshness, Freshness::Fresh, "first answer");
        assert_eq!(stale.freshness, Freshness::Stale, "outage served from cache");
        assert_eq!(stale.value, fresh.value, "last good menu");
        assert_eq!(recovered.freshness, Freshness::Fresh, "provider back");
        assert_eq!(recovered.value, menu("Sodexo", "Pannukakku"), "new menu replaces old");
    }

    #[tokio::test]
    async fn weather_without_cache_is_absent() {
        let fakes = Fakes::failing();

        let served = aggregator(&fakes, &PersistentCache::in_memory())
            .weather(&site("Karaportti"))
            .await;

        assert_eq!(served.value, None, "no weather to show");
    }

    #[tokio::test]
    async fn announcements_fall_back_to_shared_entry() {
        let fakes = Fakes::failing();
        fakes.announcements.push(Scripted::Ok(Vec::new()));
        let cache = PersistentCache::in_memory();
        let service = aggregator(&fakes, &cache);

        let fresh = service.announcements().await;
        let stale = service.announcements().await;

        assert_eq!(fresh.freshness, Freshness::Fresh, "first call answered");
        assert_eq!(stale.freshness, Freshness::Stale, "second call served from cache");
        assert!(cache.get(Domain::Announcements, None).is_some(), "stored without site key");
    }

    #[tokio::test]
    async fn corrupt_cache_still_serves_a_value() {
        let fakes = Fakes::failing();
        let cache = PersistentCache::in_memory();
        cache
            .put(Domain::Routes, Some("Arabia"), &serde_json::json!({"oops": true}))
            .expect("memory write succeeds");

        let served = aggregator(&fakes, &cache).routes(&site("Arabia"), 1).await;

        assert_eq!(served.freshness, Freshness::Unavailable, "corrupt entry is a miss");
        assert!(served.value.is_empty(), "placeholder served");
    }
}
