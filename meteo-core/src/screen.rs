//! Per-screen state and its lifecycle.
//!
//! A [`WeatherScreen`] is created on mount and consumed on unmount. It owns
//! the location subscription and the task that reacts to position changes,
//! and publishes [`ScreenState`] through a watch channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::FetchError;
use crate::forecast::{WeatherClient, forecast_request};
use crate::geocoding::GeocodingClient;
use crate::location::{HostPlatform, LocationPlatform, LocationTracker, Subscription};
use crate::model::{Coordinates, PlaceCandidate, WeatherSnapshot};
use crate::provider::{ForecastRequest, OpenMeteoProvider};
use crate::reverse::ReverseGeocoder;

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenState {
    pub coords: Coordinates,
    /// Empty until an address is known.
    pub address: String,
    pub snapshot: Option<Arc<WeatherSnapshot>>,
    pub loading: bool,
    /// Last fetch failure; the previous snapshot is kept when set.
    pub last_error: Option<String>,
    /// Whether device position changes move the screen.
    pub following: bool,
}

impl ScreenState {
    fn new(coords: Coordinates) -> Self {
        Self {
            coords,
            address: String::new(),
            snapshot: None,
            loading: true,
            last_error: None,
            following: true,
        }
    }
}

/// Everything a screen needs, wired from configuration.
#[derive(Debug, Clone)]
pub struct ScreenDeps {
    pub tracker: LocationTracker,
    pub weather: WeatherClient,
    pub geocoder: GeocodingClient,
    pub fallback: Coordinates,
    /// Variable lists and timezone; coordinates are filled in per fetch.
    pub template: ForecastRequest,
    /// Subscribe to position changes on mount.
    pub track: bool,
}

impl ScreenDeps {
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = config.http.client()?;
        let endpoints = &config.endpoints;

        let platform: Arc<dyn LocationPlatform> = Arc::new(
            HostPlatform::new(
                config.location_source()?,
                config.location.fixed,
                http.clone(),
                &endpoints.ip_location,
                &endpoints.reverse_geocoding,
            )
            .with_language(&config.search.language),
        );
        let provider = OpenMeteoProvider::new(http.clone(), &endpoints.forecast, &endpoints.ensemble);

        Ok(Self {
            tracker: LocationTracker::new(platform).with_watch_options(config.watch.options()),
            weather: WeatherClient::new(Arc::new(provider)),
            geocoder: GeocodingClient::new(http, &endpoints.geocoding)
                .with_count(config.search.count)
                .with_language(&config.search.language),
            fallback: config.location.fallback,
            template: forecast_request(config, config.location.fallback),
            track: true,
        })
    }

    pub fn reverse_geocoder(&self) -> ReverseGeocoder {
        ReverseGeocoder::new(Arc::clone(self.tracker.platform()))
    }
}

#[derive(Debug)]
struct ScreenContext {
    tracker: LocationTracker,
    reverse: ReverseGeocoder,
    weather: WeatherClient,
    template: ForecastRequest,
    state: watch::Sender<ScreenState>,
    /// Bumped, under the state lock, whenever a load starts.
    generation: AtomicU64,
}

impl ScreenContext {
    /// Move the screen to `coords` and fetch fresh data.
    ///
    /// `admit` runs under the state lock and may veto the move. A load that is
    /// overtaken by a newer one drops its results.
    async fn load<F>(&self, coords: Coordinates, address: Option<String>, admit: F)
    where
        F: FnOnce(&mut ScreenState) -> bool,
    {
        let mut generation = None;
        self.state.send_if_modified(|s| {
            if !admit(s) {
                return false;
            }
            s.coords = coords;
            s.loading = true;
            generation = Some(self.generation.fetch_add(1, Ordering::SeqCst) + 1);
            true
        });
        let Some(generation) = generation else {
            return;
        };

        let address = match address {
            Some(a) => a,
            None => self.reverse.describe(coords).await.unwrap_or_default(),
        };
        if !self.apply(generation, |s| s.address = address) {
            tracing::debug!(%coords, "load superseded before the address arrived");
            return;
        }

        let result = self.fetch(coords).await;
        let applied = self.apply(generation, |s| {
            match result {
                Ok(snapshot) => {
                    s.snapshot = Some(Arc::new(snapshot));
                    s.last_error = None;
                }
                Err(e) => {
                    tracing::warn!(%coords, "weather fetch failed, keeping previous data: {e}");
                    s.last_error = Some(e.to_string());
                }
            }
            s.loading = false;
        });
        if !applied {
            tracing::debug!(%coords, "load superseded; dropping its forecast");
        }
    }

    /// Apply `update` unless a load newer than `generation` has started.
    fn apply<F>(&self, generation: u64, update: F) -> bool
    where
        F: FnOnce(&mut ScreenState),
    {
        self.state.send_if_modified(|s| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            update(s);
            true
        })
    }

    async fn fetch(&self, coords: Coordinates) -> Result<WeatherSnapshot, FetchError> {
        let request = ForecastRequest { coords, ..self.template.clone() };
        self.weather.snapshot(&request).await
    }

    async fn on_position(&self, coords: Coordinates) {
        self.load(coords, None, |s| {
            let moved = s.following && s.coords != coords;
            if moved {
                tracing::debug!(%coords, "position changed");
            }
            moved
        })
        .await;
    }
}

pub struct WeatherScreen {
    ctx: Arc<ScreenContext>,
    geocoder: GeocodingClient,
    fallback: Coordinates,
    subscription: Option<Subscription>,
    updates: Option<JoinHandle<()>>,
}

impl WeatherScreen {
    /// Locate the device (or fall back), load its weather and start following it.
    pub async fn mount(deps: ScreenDeps) -> Self {
        let track = deps.track;
        let mut screen = Self::unloaded(deps);

        let coords = acquire_or_fallback(&screen.ctx.tracker, screen.fallback).await;
        screen.ctx.load(coords, None, |_| true).await;

        if track {
            screen.start_tracking().await;
        }
        screen
    }

    /// Open the screen on a search result instead of the device position.
    pub async fn mount_at(deps: ScreenDeps, place: &PlaceCandidate) -> Self {
        let screen = Self::unloaded(deps);
        screen.select_place(place).await;
        screen
    }

    fn unloaded(deps: ScreenDeps) -> Self {
        let (state, _) = watch::channel(ScreenState::new(deps.fallback));
        let reverse = deps.reverse_geocoder();
        let ctx = Arc::new(ScreenContext {
            tracker: deps.tracker,
            reverse,
            weather: deps.weather,
            template: deps.template,
            state,
            generation: AtomicU64::new(0),
        });

        Self {
            ctx,
            geocoder: deps.geocoder,
            fallback: deps.fallback,
            subscription: None,
            updates: None,
        }
    }

    async fn start_tracking(&mut self) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = self
            .ctx
            .tracker
            .subscribe(move |coords| {
                // The receiver only goes away on unmount.
                let _ = tx.send(coords);
            })
            .await;

        if subscription.is_some() {
            let ctx = Arc::clone(&self.ctx);
            self.updates = Some(tokio::spawn(async move {
                while let Some(coords) = rx.recv().await {
                    ctx.on_position(coords).await;
                }
            }));
        }
        self.subscription = subscription;
    }

    pub fn state(&self) -> ScreenState {
        self.ctx.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn watch(&self) -> watch::Receiver<ScreenState> {
        self.ctx.state.subscribe()
    }

    pub fn is_tracking(&self) -> bool {
        self.subscription.as_ref().is_some_and(Subscription::is_active)
    }

    pub async fn search(&self, query: &str) -> Result<Vec<PlaceCandidate>, FetchError> {
        self.geocoder.search(query).await
    }

    /// Show `place` and stop following the device position.
    pub async fn select_place(&self, place: &PlaceCandidate) {
        self.ctx
            .load(place.coordinates(), Some(place.label()), |s| {
                s.following = false;
                true
            })
            .await;
    }

    /// Go back to the device position.
    pub async fn follow_device(&self) {
        let coords = acquire_or_fallback(&self.ctx.tracker, self.fallback).await;
        self.ctx
            .load(coords, None, |s| {
                s.following = true;
                true
            })
            .await;
    }

    /// Refetch weather for the current coordinates, keeping the address.
    pub async fn refresh(&self) {
        let (coords, address) = {
            let state = self.ctx.state.borrow();
            (state.coords, state.address.clone())
        };
        // Skipped if the screen moved meanwhile.
        self.ctx.load(coords, Some(address), |s| s.coords == coords).await;
    }

    /// Release the location subscription and stop reacting to changes.
    pub async fn unmount(mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.release().await;
        }
        if let Some(updates) = self.updates.take() {
            updates.abort();
            let _ = updates.await;
        }
        tracing::debug!("screen unmounted");
    }
}

impl Drop for WeatherScreen {
    fn drop(&mut self) {
        if let Some(updates) = &self.updates {
            updates.abort();
        }
    }
}

async fn acquire_or_fallback(tracker: &LocationTracker, fallback: Coordinates) -> Coordinates {
    match tracker.acquire_once().await {
        Ok(Some(coords)) => coords,
        Ok(None) => {
            tracing::info!(%fallback, "no device position; using fallback");
            fallback
        }
        Err(e) => {
            tracing::warn!(%fallback, "could not read device position: {e}");
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::tests::{CannedProvider, sample_response};
    use crate::location::tests::ScriptedPlatform;
    use crate::model::AddressParts;
    use reqwest::Client;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const FALLBACK: Coordinates = Coordinates::new(48.8397, 2.2421);

    fn deps(platform: Arc<ScriptedPlatform>, provider: Arc<CannedProvider>, track: bool) -> ScreenDeps {
        let config = Config::default();
        ScreenDeps {
            tracker: LocationTracker::new(platform),
            weather: WeatherClient::new(provider),
            // Never reached in these tests.
            geocoder: GeocodingClient::new(Client::new(), "http://127.0.0.1:9"),
            fallback: FALLBACK,
            template: forecast_request(&config, FALLBACK),
            track,
        }
    }

    fn lyon_address() -> AddressParts {
        AddressParts {
            city: Some("Lyon".into()),
            country: Some("France".into()),
            ..AddressParts::default()
        }
    }

    #[tokio::test]
    async fn permission_denied_falls_back_to_default_coordinates() {
        let platform = Arc::new(ScriptedPlatform::denied());
        let provider = Arc::new(CannedProvider::new(sample_response()));

        let screen = WeatherScreen::mount(deps(platform, provider.clone(), true)).await;
        let state = screen.state();

        assert_eq!(state.coords, FALLBACK);
        assert_eq!(state.address, "");
        assert!(!state.loading);
        assert!(state.snapshot.is_some());
        assert_eq!(provider.requests.lock().unwrap().as_slice(), &[FALLBACK]);
        assert!(!screen.is_tracking());

        screen.unmount().await;
    }

    #[tokio::test]
    async fn mount_uses_device_position_and_address() {
        let lyon = Coordinates::new(45.76, 4.84);
        let platform = Arc::new(ScriptedPlatform {
            addresses: vec![lyon_address()],
            ..ScriptedPlatform::granted(vec![lyon])
        });
        let provider = Arc::new(CannedProvider::new(sample_response()));

        let screen = WeatherScreen::mount(deps(platform, provider, false)).await;
        let state = screen.state();

        assert_eq!(state.coords, lyon);
        assert_eq!(state.address, "Lyon, France");
        assert_eq!(state.snapshot.unwrap().location.coordinates(), lyon);
        screen.unmount().await;
    }

    #[tokio::test]
    async fn fetch_failure_keeps_the_previous_snapshot() {
        let platform = Arc::new(ScriptedPlatform::denied());
        let provider = Arc::new(CannedProvider::new(sample_response()));
        let screen = WeatherScreen::mount(deps(platform, provider.clone(), false)).await;
        let first = screen.state().snapshot.expect("first fetch succeeds");

        provider.fail.store(true, Ordering::SeqCst);
        screen.refresh().await;
        let state = screen.state();
        assert!(state.last_error.as_deref().unwrap().contains("canned failure"));
        assert_eq!(state.snapshot, Some(first));

        provider.fail.store(false, Ordering::SeqCst);
        screen.refresh().await;
        assert!(screen.state().last_error.is_none());
        screen.unmount().await;
    }

    #[tokio::test]
    async fn selecting_a_place_uses_its_label_and_stops_following() {
        let platform = Arc::new(ScriptedPlatform::denied());
        let provider = Arc::new(CannedProvider::new(sample_response()));
        let screen = WeatherScreen::mount(deps(platform, provider.clone(), false)).await;

        let place = PlaceCandidate {
            id: None,
            name: "Berlin".into(),
            admin1: Some("Land Berlin".into()),
            country: Some("Germany".into()),
            country_code: None,
            latitude: 52.52,
            longitude: 13.41,
            elevation: None,
            timezone: None,
        };
        screen.select_place(&place).await;
        let state = screen.state();

        assert_eq!(state.coords, Coordinates::new(52.52, 13.41));
        assert_eq!(state.address, "Berlin, Land Berlin, Germany");
        assert!(!state.following);
        assert_eq!(provider.requests.lock().unwrap().last(), Some(&Coordinates::new(52.52, 13.41)));

        screen.follow_device().await;
        assert_eq!(screen.state().coords, FALLBACK);
        assert!(screen.state().following);
        screen.unmount().await;
    }

    #[tokio::test]
    async fn mount_at_place_skips_device_lookup() {
        let platform = Arc::new(ScriptedPlatform::granted(vec![Coordinates::new(1.0, 1.0)]));
        let provider = Arc::new(CannedProvider::new(sample_response()));
        let place = PlaceCandidate {
            id: Some(2988507),
            name: "Paris".into(),
            admin1: None,
            country: Some("France".into()),
            country_code: Some("FR".into()),
            latitude: 48.85341,
            longitude: 2.3488,
            elevation: None,
            timezone: None,
        };

        let screen = WeatherScreen::mount_at(deps(platform.clone(), provider, true), &place).await;

        assert_eq!(screen.state().address, "Paris, France");
        assert_eq!(platform.reads.load(Ordering::SeqCst), 0);
        assert!(!screen.is_tracking());
        screen.unmount().await;
    }

    #[tokio::test(start_paused = true)]
    async fn slow_device_fetch_does_not_overwrite_a_selected_place() {
        let home = Coordinates::new(45.76, 4.84);
        let moved = Coordinates::new(45.77, 4.84);
        let berlin = Coordinates::new(52.52, 13.41);
        let platform = Arc::new(ScriptedPlatform::granted(vec![home, moved]));
        let provider = Arc::new(CannedProvider::new(sample_response()));
        provider.delay(moved, Duration::from_secs(3));

        let screen = WeatherScreen::mount(deps(platform, provider.clone(), true)).await;

        // The watcher saw `moved` at t=0; its forecast is still in flight.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(provider.requests.lock().unwrap().contains(&moved));

        let place = PlaceCandidate {
            id: None,
            name: "Berlin".into(),
            admin1: None,
            country: Some("Germany".into()),
            country_code: None,
            latitude: berlin.latitude,
            longitude: berlin.longitude,
            elevation: None,
            timezone: None,
        };
        screen.select_place(&place).await;

        tokio::time::sleep(Duration::from_secs(6)).await;
        let state = screen.state();
        assert_eq!(state.coords, berlin);
        assert_eq!(state.address, "Berlin, Germany");
        assert!(!state.following);
        assert!(!state.loading);
        assert_eq!(state.snapshot.unwrap().location.coordinates(), berlin);
        screen.unmount().await;
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_started_before_a_move_is_dropped() {
        let platform = Arc::new(ScriptedPlatform::denied());
        let provider = Arc::new(CannedProvider::new(sample_response()));
        provider.delay(FALLBACK, Duration::from_secs(3));
        let screen = Arc::new(WeatherScreen::mount(deps(platform, provider.clone(), false)).await);

        let refreshing = {
            let screen = Arc::clone(&screen);
            tokio::spawn(async move { screen.refresh().await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;

        let oslo = PlaceCandidate {
            id: None,
            name: "Oslo".into(),
            admin1: None,
            country: Some("Norway".into()),
            country_code: None,
            latitude: 59.91,
            longitude: 10.75,
            elevation: None,
            timezone: None,
        };
        screen.select_place(&oslo).await;
        refreshing.await.unwrap();

        let state = screen.state();
        assert_eq!(state.coords, oslo.coordinates());
        assert_eq!(state.snapshot.unwrap().location.coordinates(), oslo.coordinates());
    }

    #[tokio::test(start_paused = true)]
    async fn position_changes_reload_until_unmount() {
        let home = Coordinates::new(45.76, 4.84);
        let moved = Coordinates::new(45.77, 4.84);
        let platform = Arc::new(ScriptedPlatform::granted(vec![home, moved]));
        let provider = Arc::new(CannedProvider::new(sample_response()));

        let screen = WeatherScreen::mount(deps(platform.clone(), provider.clone(), true)).await;
        assert!(screen.is_tracking());

        tokio::time::sleep(Duration::from_secs(6)).await;
        let state = screen.state();
        assert_eq!(state.coords, moved);
        assert_eq!(state.snapshot.unwrap().location.coordinates(), moved);
        assert!(provider.requests.lock().unwrap().contains(&moved));

        screen.unmount().await;
        let reads = platform.reads.load(Ordering::SeqCst);
        let fetches = provider.requests.lock().unwrap().len();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(platform.reads.load(Ordering::SeqCst), reads);
        assert_eq!(provider.requests.lock().unwrap().len(), fetches);
    }
}
