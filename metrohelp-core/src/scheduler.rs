//! Timed refreshes: fixed-interval polling for routes and weather, and a
//! daily wall-clock refresh for menus and announcements.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveTime, TimeZone};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::cache::Domain;
use crate::config::KioskConfig;
use crate::model::{Announcement, MenuResult, Site, TransitDeparture, WeatherSnapshot};
use crate::selection::SelectionState;
use crate::service::{Aggregator, Fetched};

const FALLBACK_MENU_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
/// Result of one completed refresh.
pub enum Update {
    /// Menu of one site.
    Menu {
        /// Site the menu belongs to.
        site: String,
        /// Served menu.
        menu: Fetched<MenuResult>,
    },
    /// Departures near the active site.
    Routes {
        /// Site the departures were fetched for.
        site: String,
        /// Served departures.
        departures: Fetched<Vec<TransitDeparture>>,
    },
    /// Weather at the active site.
    Weather {
        /// Site the weather was fetched for.
        site: String,
        /// Served weather.
        weather: Fetched<Option<WeatherSnapshot>>,
    },
    /// Announcement feed.
    Announcements(Fetched<Vec<Announcement>>),
}

impl Update {
    /// Data domain of the update.
    #[must_use]
    pub fn domain(&self) -> Domain {
        match self {
            Update::Menu { .. } => Domain::Menus,
            Update::Routes { .. } => Domain::Routes,
            Update::Weather { .. } => Domain::Weather,
            Update::Announcements(_) => Domain::Announcements,
        }
    }

    /// Site the update belongs to, if any.
    #[must_use]
    pub fn site(&self) -> Option<&str> {
        match self {
            Update::Menu { site, .. }
            | Update::Routes { site, .. }
            | Update::Weather { site, .. } => Some(site.as_str()),
            Update::Announcements(_) => None,
        }
    }
}

/// Consumer of published updates, typically a UI layer.
pub trait Presenter: Send + Sync {
    /// Show `update`. Called on the refreshing task; keep it short.
    fn render(&self, update: &Update);
}

impl<F> Presenter for F
where
    F: Fn(&Update) + Send + Sync,
{
    fn render(&self, update: &Update) {
        self(update);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Lifecycle of the daily menu timer.
pub enum MenuTimerState {
    /// Not started, or stopped.
    Idle,
    /// Waiting for the next refresh.
    Scheduled {
        /// When the timer fires.
        at: DateTime<Local>,
    },
    /// Refreshing menus.
    Firing,
}

/// Next occurrence of wall-clock `at` after `now`, in `now`'s time zone.
///
/// When `now` is at or past `at` the result is tomorrow's occurrence. A local
/// time skipped by a DST change resolves one hour later.
#[must_use]
pub fn next_daily_run<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let today = now.date_naive();
    let target_date = if now.time() >= at {
        today.succ_opt().unwrap_or(today)
    } else {
        today
    };

    let zone = now.timezone();
    let target = target_date.and_time(at);
    zone.from_local_datetime(&target)
        .earliest()
        .or_else(|| {
            zone.from_local_datetime(&(target + ChronoDuration::hours(1)))
                .earliest()
        })
        .unwrap_or_else(|| {
            tracing::error!(%target, "Cannot resolve local refresh time, retrying in a day");
            now.clone() + ChronoDuration::days(1)
        })
}

/// Drives all periodic refreshes and publishes their results.
///
/// At most one refresh per `(domain, site)` runs at a time; a tick that finds
/// one in flight is skipped. Route and weather results are dropped when the
/// active site changed while they were being fetched.
pub struct RefreshScheduler {
    aggregator: Arc<Aggregator>,
    selection: Arc<SelectionState>,
    sites: Vec<Site>,
    poll_interval: Duration,
    menu_refresh_at: NaiveTime,
    presenters: RwLock<Vec<Arc<dyn Presenter>>>,
    in_flight: Mutex<HashSet<(Domain, String)>>,
    menu_timer: Mutex<MenuTimerState>,
}

/// Handle for stopping a started [`RefreshScheduler`].
pub struct SchedulerHandle {
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl SchedulerHandle {
    /// Cancel all timers and in-flight refreshes and wait for them to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        tracing::info!("Refresh scheduler stopped");
    }
}

struct InFlight<'guard> {
    registry: &'guard Mutex<HashSet<(Domain, String)>>,
    key: (Domain, String),
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl RefreshScheduler {
    /// Create a scheduler for the sites and timing in `config`.
    #[must_use]
    pub fn new(
        aggregator: Arc<Aggregator>,
        selection: Arc<SelectionState>,
        config: &KioskConfig,
    ) -> Self {
        Self {
            aggregator,
            selection,
            sites: config.sites.clone(),
            poll_interval: config.poll_interval(),
            menu_refresh_at: config.menu_refresh_time(),
            presenters: RwLock::new(Vec::new()),
            in_flight: Mutex::new(HashSet::new()),
            menu_timer: Mutex::new(MenuTimerState::Idle),
        }
    }

    /// Register `presenter` for every future update.
    pub fn subscribe(&self, presenter: impl Presenter + 'static) {
        self.presenters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(presenter));
    }

    /// Current state of the daily menu timer.
    #[must_use]
    pub fn menu_timer_state(&self) -> MenuTimerState {
        *self.menu_timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the timing loops on the current Tokio runtime.
    ///
    /// Routes and weather are fetched immediately and then every poll
    /// interval; menus and announcements are fetched immediately and then at
    /// the configured hour every day.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let shutdown = CancellationToken::new();
        let tasks = TaskTracker::new();

        for domain in [Domain::Routes, Domain::Weather] {
            tasks.spawn(Arc::clone(&self).run_polling(domain, shutdown.clone(), tasks.clone()));
        }
        tasks.spawn(Arc::clone(&self).run_daily(shutdown.clone()));

        tracing::info!(
            interval_secs = self.poll_interval.as_secs(),
            menu_refresh_at = %self.menu_refresh_at,
            "Refresh scheduler started"
        );
        SchedulerHandle { shutdown, tasks }
    }

    /// Refresh routes and weather for the active site right away, e.g. after
    /// the user switched sites.
    pub async fn refresh_active_site(&self) {
        tokio::join!(self.refresh_routes(), self.refresh_weather());
    }

    /// Refresh departures of the active site and publish them.
    pub async fn refresh_routes(&self) {
        let selection = self.selection.get();
        let Some(site) = self.site(&selection.active_site) else {
            return;
        };
        let Some(_guard) = self.begin(Domain::Routes, &site.name) else {
            return;
        };
        let departures = self
            .aggregator
            .routes(site, selection.departures_per_stop)
            .await;
        self.publish_for_active_site(Update::Routes {
            site: site.name.clone(),
            departures,
        });
    }

    /// Refresh weather of the active site and publish it.
    pub async fn refresh_weather(&self) {
        let active = self.selection.active_site();
        let Some(site) = self.site(&active) else {
            return;
        };
        let Some(_guard) = self.begin(Domain::Weather, &site.name) else {
            return;
        };
        let weather = self.aggregator.weather(site).await;
        self.publish_for_active_site(Update::Weather {
            site: site.name.clone(),
            weather,
        });
    }

    /// Refresh menus of every site and the announcement feed, publishing each.
    pub async fn refresh_menus(&self) {
        for site in &self.sites {
            let Some(_guard) = self.begin(Domain::Menus, &site.name) else {
                continue;
            };
            let menu = self.aggregator.menu(site).await;
            self.publish(&Update::Menu {
                site: site.name.clone(),
                menu,
            });
        }

        if let Some(_guard) = self.begin(Domain::Announcements, "") {
            let announcements = self.aggregator.announcements().await;
            self.publish(&Update::Announcements(announcements));
        }
    }

    async fn refresh(&self, domain: Domain) {
        match domain {
            Domain::Routes => self.refresh_routes().await,
            Domain::Weather => self.refresh_weather().await,
            Domain::Menus | Domain::Announcements => self.refresh_menus().await,
            Domain::Settings => {}
        }
    }

    async fn run_polling(
        self: Arc<Self>,
        domain: Domain,
        shutdown: CancellationToken,
        tasks: TaskTracker,
    ) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let scheduler = Arc::clone(&self);
                    let shutdown = shutdown.clone();
                    tasks.spawn(async move {
                        tokio::select! {
                            () = shutdown.cancelled() => {}
                            () = scheduler.refresh(domain) => {}
                        }
                    });
                }
            }
        }
        tracing::debug!(%domain, "Polling stopped");
    }

    async fn run_daily(self: Arc<Self>, shutdown: CancellationToken) {
        tokio::select! {
            () = shutdown.cancelled() => return,
            () = self.refresh_menus() => {}
        }

        loop {
            let now = Local::now();
            let at = next_daily_run(&now, self.menu_refresh_at);
            let delay = (at - now).to_std().unwrap_or(FALLBACK_MENU_DELAY);
            self.set_menu_timer(MenuTimerState::Scheduled { at });
            tracing::info!(%at, "Next menu refresh scheduled");

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }

            self.set_menu_timer(MenuTimerState::Firing);
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = self.refresh_menus() => {}
            }
        }
        self.set_menu_timer(MenuTimerState::Idle);
    }

    fn site(&self, name: &str) -> Option<&Site> {
        let site = self.sites.iter().find(|site| site.name == name);
        if site.is_none() {
            tracing::warn!(site = name, "Active site is not configured");
        }
        site
    }

    fn begin(&self, domain: Domain, site: &str) -> Option<InFlight<'_>> {
        let key = (domain, site.to_owned());
        let mut running = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !running.insert(key.clone()) {
            tracing::debug!(%domain, site, "Refresh already in flight, skipping");
            return None;
        }
        Some(InFlight {
            registry: &self.in_flight,
            key,
        })
    }

    fn publish_for_active_site(&self, update: Update) {
        let Some(site) = update.site() else {
            self.publish(&update);
            return;
        };
        if self
            .selection
            .while_active(site, || self.publish(&update))
            .is_none()
        {
            tracing::debug!(
                domain = %update.domain(),
                fetched_for = site,
                "Discarding result for inactive site"
            );
        }
    }

    fn publish(&self, update: &Update) {
        let presenters = self
            .presenters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for presenter in presenters {
            presenter.render(update);
        }
    }

    fn set_menu_timer(&self, state: MenuTimerState) {
        *self.menu_timer.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, NaiveDate};

    use super::*;
    use crate::cache::PersistentCache;
    use crate::service::Freshness;
    use crate::service::testing::{Fakes, Script, Scripted, departure, menu, weather};

    struct Harness {
        fakes: Fakes,
        selection: Arc<SelectionState>,
        scheduler: Arc<RefreshScheduler>,
        seen: Arc<Mutex<Vec<Update>>>,
    }

    fn harness(fakes: Fakes) -> Harness {
        let config = KioskConfig::default();
        let cache = PersistentCache::in_memory();
        let aggregator = Arc::new(Aggregator::new(fakes.registry(), cache.clone()));
        let selection = Arc::new(SelectionState::load(&config, cache));
        let scheduler = Arc::new(RefreshScheduler::new(
            aggregator,
            Arc::clone(&selection),
            &config,
        ));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        scheduler.subscribe(move |update: &Update| {
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(update.clone());
        });
        Harness {
            fakes,
            selection,
            scheduler,
            seen,
        }
    }

    impl Harness {
        fn seen(&self) -> Vec<Update> {
            self.seen
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<FixedOffset> {
        let helsinki = FixedOffset::east_opt(2 * 3600).expect("valid offset");
        NaiveDate::from_ymd_opt(2024, 3, 12)
            .and_then(|date| date.and_hms_opt(hour, minute, 0))
            .and_then(|naive| helsinki.from_local_datetime(&naive).single())
            .expect("valid local time")
    }

    fn seven() -> NaiveTime {
        NaiveTime::from_hms_opt(7, 0, 0).expect("valid time")
    }

    #[test]
    fn after_refresh_hour_targets_tomorrow() {
        let next = next_daily_run(&at(8, 0), seven());
        let tomorrow = at(8, 0).date_naive().succ_opt().expect("next day");
        assert_eq!(next.date_naive(), tomorrow, "tomorrow");
        assert_eq!(next.time(), seven(), "at seven");
    }

    #[test]
    fn before_refresh_hour_targets_today() {
        let next = next_daily_run(&at(6, 0), seven());
        assert_eq!(next, at(7, 0), "seven today");
    }

    #[test]
    fn exactly_at_refresh_hour_targets_tomorrow() {
        let next = next_daily_run(&at(7, 0), seven());
        assert_eq!(next - at(7, 0), ChronoDuration::days(1), "no immediate re-fire");
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_route_refresh_is_skipped() {
        let fakes = Fakes::failing();
        fakes
            .transit
            .push(Scripted::Slow(Duration::from_secs(10), vec![departure(10)]));
        let harness = harness(fakes);

        tokio::join!(
            harness.scheduler.refresh_routes(),
            harness.scheduler.refresh_routes()
        );

        assert_eq!(harness.fakes.transit.calls().len(), 1, "second tick skipped");
        assert_eq!(harness.seen().len(), 1, "one publication");
    }

    #[tokio::test(start_paused = true)]
    async fn result_for_previous_site_is_discarded() {
        let fakes = Fakes::failing();
        fakes
            .transit
            .push(Scripted::Slow(Duration::from_secs(5), vec![departure(10)]));
        let harness = harness(fakes);

        let scheduler = Arc::clone(&harness.scheduler);
        let pending = tokio::spawn(async move { scheduler.refresh_routes().await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        harness
            .selection
            .set_active_site("Myllypuro")
            .expect("known site");
        pending.await.expect("refresh task completes");

        assert!(harness.seen().is_empty(), "Arabia departures never shown for Myllypuro");
    }

    #[tokio::test]
    async fn route_refresh_publishes_for_active_site() {
        let fakes = Fakes::failing();
        fakes.transit.push(Scripted::Ok(vec![departure(10), departure(20)]));
        let harness = harness(fakes);
        harness
            .selection
            .set_departures_per_stop(2)
            .expect("positive count");

        harness.scheduler.refresh_routes().await;

        let seen = harness.seen();
        assert!(
            matches!(
                seen.as_slice(),
                [Update::Routes { site, departures }]
                    if site == "Arabia" && departures.freshness == Freshness::Fresh
            ),
            "got {seen:?}"
        );
        let calls = harness.fakes.transit.calls();
        assert!(calls.first().is_some_and(|call| call.ends_with(":2")), "got {calls:?}");
    }

    #[tokio::test]
    async fn menus_refresh_for_every_site() {
        let mut fakes = Fakes::failing();
        fakes.food_and_co = Script::always(menu("Food & Co", "Pasta"));
        fakes.sodexo = Script::always(menu("Sodexo", "Keitto"));
        let harness = harness(fakes);

        harness.scheduler.refresh_menus().await;

        let menu_sites: Vec<String> = harness
            .seen()
            .iter()
            .filter(|update| update.domain() == Domain::Menus)
            .filter_map(|update| update.site().map(str::to_owned))
            .collect();
        assert_eq!(
            menu_sites,
            vec!["Arabia", "Karaportti", "Myllypuro", "Myyrmäki"],
            "every configured site refreshed"
        );
        assert!(
            harness
                .seen()
                .iter()
                .any(|update| update.domain() == Domain::Announcements),
            "announcements refreshed with menus"
        );
    }

    #[tokio::test]
    async fn failed_refresh_is_still_published() {
        let harness = harness(Fakes::failing());

        harness.scheduler.refresh_weather().await;

        let seen = harness.seen();
        assert!(
            matches!(
                seen.as_slice(),
                [Update::Weather { weather, .. }] if weather.freshness == Freshness::Unavailable
            ),
            "got {seen:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn started_scheduler_polls_until_shutdown() {
        let mut fakes = Fakes::failing();
        fakes.weather = Script::always(weather(1.5));
        let harness = harness(fakes);

        let handle = Arc::clone(&harness.scheduler).start();
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert!(
            matches!(harness.scheduler.menu_timer_state(), MenuTimerState::Scheduled { .. }),
            "menu timer armed after the initial load"
        );
        let weather_calls = harness.fakes.weather.calls().len();
        assert_eq!(weather_calls, 2, "initial tick plus one interval");

        handle.shutdown().await;
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(
            harness.fakes.weather.calls().len(),
            weather_calls,
            "no polling after shutdown"
        );
        assert_eq!(harness.scheduler.menu_timer_state(), MenuTimerState::Idle, "timer idle");
    }

    #[tokio::test]
    async fn active_site_refresh_publishes_routes_and_weather() {
        let fakes = Fakes::failing();
        fakes.transit.push(Scripted::Ok(vec![departure(10)]));
        fakes.weather.push(Scripted::Ok(weather(2.0)));
        let harness = harness(fakes);
        harness
            .selection
            .set_active_site("Karaportti")
            .expect("known site");

        harness.scheduler.refresh_active_site().await;

        let seen = harness.seen();
        assert_eq!(seen.len(), 2, "got {seen:?}");
        assert!(
            seen.iter().all(|update| update.site() == Some("Karaportti")),
            "published for the new site: {seen:?}"
        );
        assert!(
            seen.iter().any(|update| matches!(
                update,
                Update::Routes { departures, .. } if departures.freshness == Freshness::Fresh
            )),
            "routes refreshed: {seen:?}"
        );
        assert!(
            seen.iter().any(|update| matches!(
                update,
                Update::Weather { weather, .. } if weather.freshness == Freshness::Fresh
            )),
            "weather refreshed: {seen:?}"
        );
        assert_eq!(harness.fakes.weather.calls(), vec!["Espoo".to_owned()], "site city");
    }

    #[tokio::test(start_paused = true)]
    async fn daily_timer_keeps_rescheduling() {
        let mut fakes = Fakes::failing();
        fakes.food_and_co = Script::always(menu("Food & Co", "Pasta"));
        fakes.sodexo = Script::always(menu("Sodexo", "Keitto"));
        let harness = harness(fakes);

        let handle = Arc::clone(&harness.scheduler).start();
        tokio::time::sleep(Duration::from_secs(49 * 3600)).await;
        let state = harness.scheduler.menu_timer_state();
        let food_calls = harness.fakes.food_and_co.calls();
        let sodexo_calls = harness.fakes.sodexo.calls();
        handle.shutdown().await;

        assert!(
            matches!(state, MenuTimerState::Scheduled { at } if at.time() == seven()),
            "rearmed for seven after firing, got {state:?}"
        );
        // Initial load plus at least two daily fires, each covering both sites of a chain.
        assert!(food_calls.len() >= 6, "got {food_calls:?}");
        let arabia = food_calls.iter().filter(|call| *call == "1251").count();
        let karaportti = food_calls.iter().filter(|call| *call == "3208").count();
        assert_eq!(arabia, karaportti, "every fire covers every Food & Co site");
        let myllypuro = sodexo_calls.iter().filter(|call| *call == "158").count();
        let myyrmaki = sodexo_calls.iter().filter(|call| *call == "152").count();
        assert_eq!(myllypuro, myyrmaki, "every fire covers every Sodexo site");
        assert_eq!(myllypuro, arabia, "both chains refreshed on each fire");
    }
}
