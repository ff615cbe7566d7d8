//! Ties location, settings, connectivity and the provider together and
//! publishes a single [`ViewState`].
//!
//! Every trigger runs the same refresh cycle:
//!
//! 1. publish a loading snapshot (prior data kept)
//! 2. pick a position: the selected location if any, then a manual location,
//!    else the resolver chain
//! 3. if online, fetch current and forecast concurrently, each falling back
//!    to its own cache entry; if offline, read both from cache
//! 4. merge into the prior view and publish with the connectivity observed
//!    at publish time
//!
//! Overlapping cycles are ordered by generation: a cycle that finishes after
//! a newer one started is discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use nimbus_core::WeatherError;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::aggregate::aggregate;
use crate::cache::{CacheKey, WeatherCache};
use crate::connectivity::ConnectivityMonitor;
use crate::debounce::Debounced;
use crate::error::RefreshError;
use crate::location::LocationResolver;
use crate::observable::Observable;
use crate::provider::{parse_forecast, WeatherFetcher};
use crate::settings::SettingsStore;
use crate::types::{
    Coordinate, ForecastEntry, LocationSource, Position, RawWeatherPayload, Settings,
    TemperatureUnit, Units, ViewState,
};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Why a refresh cycle ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    AppStart,
    LocationChanged,
    SettingsChanged,
    ReturnedToView,
    ManualRefresh,
    ConnectivityChanged,
}

/// Values the most recent cycle ran with; change listeners skip repeats.
#[derive(Debug, Default)]
struct Applied {
    coords: Option<Coordinate>,
    unit: Option<TemperatureUnit>,
}

pub struct WeatherOrchestrator {
    resolver: Arc<LocationResolver>,
    settings: Arc<SettingsStore>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    fetcher: WeatherFetcher,
    cache: WeatherCache,
    view: Observable<ViewState>,
    generation: AtomicU64,
    applied: Mutex<Applied>,
    debounce: Duration,
}

impl WeatherOrchestrator {
    pub fn new(
        resolver: Arc<LocationResolver>,
        settings: Arc<SettingsStore>,
        connectivity: Arc<dyn ConnectivityMonitor>,
        fetcher: WeatherFetcher,
        cache: WeatherCache,
    ) -> Self {
        let initial = ViewState {
            is_online: connectivity.is_online(),
            temperature_unit: settings.current().temperature_unit,
            ..ViewState::default()
        };

        Self {
            resolver,
            settings,
            connectivity,
            fetcher,
            cache,
            view: Observable::new(initial),
            generation: AtomicU64::new(0),
            applied: Mutex::new(Applied::default()),
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Latest published view.
    pub fn state(&self) -> ViewState {
        self.view.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.view.subscribe()
    }

    pub fn resolver(&self) -> &Arc<LocationResolver> {
        &self.resolver
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    /// Run the startup refresh and begin reacting to location, settings and
    /// connectivity changes until the handle is stopped.
    pub fn start(self: &Arc<Self>) -> OrchestratorHandle {
        let token = CancellationToken::new();

        // Subscribe before the first cycle so no change is missed.
        let locations = Debounced::new(self.resolver.subscribe(), self.debounce);
        let settings = Debounced::new(self.settings.subscribe(), self.debounce);
        let connectivity = self.connectivity.subscribe();

        let startup = {
            let this = Arc::clone(self);
            let token = token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = this.refresh(RefreshTrigger::AppStart) => {}
                }
            })
        };

        let mut tasks = vec![
            startup,
            self.spawn_location_listener(token.clone(), locations),
            self.spawn_settings_listener(token.clone(), settings),
            self.spawn_connectivity_listener(token.clone(), connectivity),
        ];

        if let Some(watcher) = self.resolver.spawn_watch(token.child_token()) {
            tasks.push(watcher);
        }

        tracing::info!("Weather orchestrator started");
        OrchestratorHandle { token, tasks }
    }

    fn spawn_location_listener(
        self: &Arc<Self>,
        token: CancellationToken,
        mut updates: Debounced<Option<Coordinate>>,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = token.cancelled() => break,
                    next = updates.next() => next,
                };
                let Some(update) = next else { break };
                let Some(coords) = update else { continue };

                if this.applied.lock().coords == Some(coords) {
                    tracing::debug!("Location unchanged, skipping refresh");
                    continue;
                }

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = this.refresh(RefreshTrigger::LocationChanged) => {}
                }
            }
            tracing::debug!("Location listener stopped");
        })
    }

    fn spawn_settings_listener(
        self: &Arc<Self>,
        token: CancellationToken,
        mut updates: Debounced<Settings>,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = token.cancelled() => break,
                    next = updates.next() => next,
                };
                let Some(settings) = next else { break };

                // Only the unit affects what is fetched.
                if this.applied.lock().unit == Some(settings.temperature_unit) {
                    tracing::debug!("Temperature unit unchanged, skipping refresh");
                    continue;
                }

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = this.refresh(RefreshTrigger::SettingsChanged) => {}
                }
            }
            tracing::debug!("Settings listener stopped");
        })
    }

    fn spawn_connectivity_listener(
        self: &Arc<Self>,
        token: CancellationToken,
        mut online: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let changed = tokio::select! {
                    _ = token.cancelled() => break,
                    changed = online.changed() => changed,
                };
                if changed.is_err() {
                    break;
                }

                let is_online = *online.borrow_and_update();
                if is_online {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = this.refresh(RefreshTrigger::ConnectivityChanged) => {}
                    }
                } else {
                    tracing::info!("Went offline");
                    this.view.publish(ViewState {
                        is_online: false,
                        ..this.view.get()
                    });
                }
            }
            tracing::debug!("Connectivity listener stopped");
        })
    }

    /// Run one refresh cycle and publish its result.
    pub async fn refresh(&self, trigger: RefreshTrigger) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(?trigger, generation, "Refreshing weather");

        self.view.publish(ViewState {
            is_loading: true,
            error_message: None,
            ..self.view.get()
        });

        let outcome = self.run_cycle().await;

        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(generation, "Discarding superseded refresh");
            return;
        }

        match outcome {
            Ok(view) => self.view.publish(view),
            Err(e) => {
                tracing::error!("Refresh failed: {}", e);
                self.view.publish(ViewState {
                    is_loading: false,
                    is_online: self.connectivity.is_online(),
                    error_message: Some(e.user_message().to_string()),
                    ..self.view.get()
                });
            }
        }
    }

    /// The view became visible again; picks up a selection made elsewhere.
    pub async fn returned_to_view(&self) {
        self.refresh(RefreshTrigger::ReturnedToView).await;
    }

    pub async fn manual_refresh(&self) {
        self.refresh(RefreshTrigger::ManualRefresh).await;
    }

    async fn run_cycle(&self) -> Result<ViewState, RefreshError> {
        let position = self.determine_position().await;
        let unit = self.settings.current().temperature_unit;
        {
            let mut applied = self.applied.lock();
            applied.coords = Some(position.coords);
            applied.unit = Some(unit);
        }

        let (current, forecast) = if self.connectivity.is_online() {
            self.fetch_all(position.coords, unit.units()).await?
        } else {
            tracing::info!("Offline, reading weather from cache");
            (cached_current(&self.cache), cached_forecast(&self.cache))
        };

        Ok(self.merge(position, unit, current, forecast))
    }

    async fn determine_position(&self) -> Position {
        let position = if let Some(location) = self.resolver.selected_location() {
            tracing::debug!("Using selected location {:?}", location.city);
            Position {
                coords: location.coordinate(),
                source: LocationSource::CachedSelection,
            }
        } else if let Some(coords) = self.resolver.manual_location() {
            tracing::debug!("Using manual location");
            Position {
                coords,
                source: LocationSource::Manual,
            }
        } else {
            return self.resolver.resolve().await;
        };

        self.cache.put_or_warn(CacheKey::CurrentLocation, &position.coords);
        position
    }

    /// Fetch both fields concurrently; each falls back to its cache entry on failure.
    async fn fetch_all(
        &self,
        coords: Coordinate,
        units: Units,
    ) -> Result<(Option<RawWeatherPayload>, Option<Vec<ForecastEntry>>), RefreshError> {
        let current_task = {
            let fetcher = self.fetcher.clone();
            let cache = self.cache.clone();
            tokio::spawn(async move {
                match fetcher.fetch_current(coords, units).await {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        tracing::warn!("Current weather fetch failed, using cache: {}", e);
                        cached_current(&cache)
                    }
                }
            })
        };

        let forecast_task = {
            let fetcher = self.fetcher.clone();
            let cache = self.cache.clone();
            tokio::spawn(async move {
                match fetcher.fetch_forecast(coords, units).await {
                    Ok(entries) => Some(entries),
                    Err(e) => {
                        tracing::warn!("Forecast fetch failed, using cache: {}", e);
                        cached_forecast(&cache)
                    }
                }
            })
        };

        let (current, forecast) = tokio::join!(current_task, forecast_task);
        Ok((current?, forecast?))
    }

    fn merge(
        &self,
        position: Position,
        unit: TemperatureUnit,
        current: Option<RawWeatherPayload>,
        forecast: Option<Vec<ForecastEntry>>,
    ) -> ViewState {
        let prior = self.view.get();
        let mut next = ViewState {
            is_loading: false,
            is_online: self.connectivity.is_online(),
            position: Some(position),
            ..prior
        };

        if current.is_none() && forecast.is_none() {
            tracing::warn!("No weather data available from network or cache");
            next.error_message = Some(WeatherError::NoCachedData.user_message().to_string());
            return next;
        }

        if let Some(payload) = current {
            next.current_weather = Some(payload);
        }
        if let Some(series) = forecast {
            let views = aggregate(&series, Local::now().date_naive(), &Local);
            next.hourly = views.hourly;
            next.daily = views.daily;
        }
        next.temperature_unit = unit;
        next.error_message = position.advisory().map(str::to_string);
        next
    }
}

fn cached_current(cache: &WeatherCache) -> Option<RawWeatherPayload> {
    cache.get::<RawWeatherPayload>(CacheKey::CurrentWeather)
}

fn cached_forecast(cache: &WeatherCache) -> Option<Vec<ForecastEntry>> {
    cache.get_with(CacheKey::Forecast, |raw| {
        let payload: serde_json::Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        parse_forecast(&payload).map_err(|e| e.to_string())
    })
}

/// Stops the orchestrator's listeners. Stopping twice is a no-op; dropping
/// the handle stops it too.
pub struct OrchestratorHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl OrchestratorHandle {
    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            tracing::info!("Stopping weather orchestrator");
            self.token.cancel();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop and wait for every listener to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                tracing::warn!("Orchestrator task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for OrchestratorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{KeyValueStore, MemoryStore};
    use crate::connectivity::SharedConnectivity;
    use crate::error::{CacheError, LocationError};
    use crate::location::{PositionOptions, PositionSensor, StaticSensor};
    use crate::types::{SelectedLocation, SettingsUpdate, Theme};
    use async_trait::async_trait;
    use nimbus_core::ProviderConfig;
    use serde_json::json;

    struct Fixture {
        orchestrator: Arc<WeatherOrchestrator>,
        connectivity: Arc<SharedConnectivity>,
        cache: WeatherCache,
    }

    struct SlowSensor;

    #[async_trait]
    impl PositionSensor for SlowSensor {
        async fn current_position(
            &self,
            _options: PositionOptions,
        ) -> Result<Coordinate, LocationError> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(Coordinate::new(1.0, 2.0))
        }
    }

    /// Offline orchestrator over an in-memory cache. The provider address is a
    /// closed local port, so going online only ever falls back to cache.
    fn offline_fixture() -> Fixture {
        fixture_with_sensor(Arc::new(StaticSensor::fixed(Coordinate::new(1.0, 2.0))))
    }

    fn fixture_with_sensor(sensor: Arc<dyn PositionSensor>) -> Fixture {
        build_fixture(
            sensor,
            WeatherCache::in_memory(),
            Arc::new(SharedConnectivity::new(false)),
        )
    }

    fn build_fixture(
        sensor: Arc<dyn PositionSensor>,
        cache: WeatherCache,
        connectivity: Arc<SharedConnectivity>,
    ) -> Fixture {
        let resolver = Arc::new(LocationResolver::new(sensor, cache.clone()));
        let settings = Arc::new(SettingsStore::load(cache.clone()));
        let config = ProviderConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            geocode_url: "http://127.0.0.1:9".to_string(),
            api_key: "test-key".to_string(),
            request_timeout_secs: 1,
        };
        let fetcher = WeatherFetcher::new(&config, cache.clone()).unwrap();

        let orchestrator = Arc::new(WeatherOrchestrator::new(
            resolver,
            settings,
            connectivity.clone(),
            fetcher,
            cache.clone(),
        ));

        Fixture {
            orchestrator,
            connectivity,
            cache,
        }
    }

    fn seed_cache(cache: &WeatherCache) {
        let now = Local::now().timestamp();
        cache
            .put(CacheKey::CurrentWeather, &json!({"name": "Cached"}))
            .unwrap();
        cache
            .put(
                CacheKey::Forecast,
                &json!({"list": [{"dt": now, "main": {"temp": 20.0}, "weather": [{"main": "Clear"}]}]}),
            )
            .unwrap();
    }

    fn cycles(orchestrator: &WeatherOrchestrator) -> u64 {
        orchestrator.generation.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_initial_state_is_loading() {
        let fixture = offline_fixture();
        let state = fixture.orchestrator.state();
        assert!(state.is_loading);
        assert!(!state.is_online);
        assert!(!state.has_data());
    }

    #[tokio::test]
    async fn test_offline_refresh_reads_cache() {
        let fixture = offline_fixture();
        seed_cache(&fixture.cache);

        fixture.orchestrator.refresh(RefreshTrigger::ManualRefresh).await;

        let state = fixture.orchestrator.state();
        assert!(!state.is_loading);
        assert!(!state.is_online);
        assert_eq!(state.error_message, None);
        assert_eq!(state.current_weather, Some(json!({"name": "Cached"})));
        assert_eq!(state.hourly.len(), 1);
        assert_eq!(state.daily.len(), 1);
    }

    #[tokio::test]
    async fn test_offline_without_cache_keeps_prior_data() {
        let fixture = offline_fixture();
        seed_cache(&fixture.cache);
        fixture.orchestrator.refresh(RefreshTrigger::AppStart).await;
        let prior = fixture.orchestrator.state();

        fixture.cache.remove(CacheKey::CurrentWeather).unwrap();
        fixture.cache.remove(CacheKey::Forecast).unwrap();
        fixture.orchestrator.refresh(RefreshTrigger::ManualRefresh).await;

        let state = fixture.orchestrator.state();
        assert_eq!(
            state.error_message.as_deref(),
            Some("No cached weather data available.")
        );
        assert_eq!(state.current_weather, prior.current_weather);
        assert_eq!(state.hourly, prior.hourly);
        assert_eq!(state.daily, prior.daily);
        assert!(!state.is_loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loading_snapshot_clears_error_and_keeps_data() {
        let fixture = fixture_with_sensor(Arc::new(SlowSensor));
        seed_cache(&fixture.cache);
        fixture.orchestrator.refresh(RefreshTrigger::AppStart).await;
        fixture.cache.remove(CacheKey::CurrentWeather).unwrap();
        fixture.cache.remove(CacheKey::Forecast).unwrap();
        fixture.orchestrator.refresh(RefreshTrigger::ManualRefresh).await;
        assert!(fixture.orchestrator.state().error_message.is_some());

        let orchestrator = Arc::clone(&fixture.orchestrator);
        let pending = tokio::spawn(async move {
            orchestrator.refresh(RefreshTrigger::ManualRefresh).await;
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let loading = fixture.orchestrator.state();
        assert!(loading.is_loading);
        assert_eq!(loading.error_message, None);
        assert!(loading.has_data());

        pending.await.unwrap();
        assert!(!fixture.orchestrator.state().is_loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_refresh_is_discarded() {
        let fixture = fixture_with_sensor(Arc::new(SlowSensor));
        seed_cache(&fixture.cache);

        let orchestrator = Arc::clone(&fixture.orchestrator);
        let slow = tokio::spawn(async move {
            orchestrator.refresh(RefreshTrigger::AppStart).await;
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        fixture
            .orchestrator
            .resolver()
            .set_selected_location(SelectedLocation {
                latitude: 5.0,
                longitude: 6.0,
                city: None,
            })
            .unwrap();
        fixture.orchestrator.returned_to_view().await;
        slow.await.unwrap();

        let position = fixture.orchestrator.state().position.unwrap();
        assert_eq!(position.coords, Coordinate::new(5.0, 6.0));
        assert_eq!(cycles(&fixture.orchestrator), 2);
    }

    #[tokio::test]
    async fn test_selected_location_is_used_and_persisted() {
        let fixture = offline_fixture();
        seed_cache(&fixture.cache);
        fixture
            .orchestrator
            .resolver()
            .set_selected_location(SelectedLocation {
                latitude: 5.0,
                longitude: 6.0,
                city: Some("Elsewhere".into()),
            })
            .unwrap();

        fixture.orchestrator.returned_to_view().await;

        let position = fixture.orchestrator.state().position.unwrap();
        assert_eq!(position.source, LocationSource::CachedSelection);
        assert_eq!(position.coords, Coordinate::new(5.0, 6.0));
        assert_eq!(
            fixture.cache.get::<Coordinate>(CacheKey::CurrentLocation),
            Some(Coordinate::new(5.0, 6.0))
        );
    }

    #[tokio::test]
    async fn test_corrupt_cached_forecast_is_discarded() {
        let fixture = offline_fixture();
        fixture
            .cache
            .put(CacheKey::Forecast, &json!({"unexpected": true}))
            .unwrap();

        fixture.orchestrator.refresh(RefreshTrigger::ManualRefresh).await;

        assert_eq!(fixture.cache.get::<serde_json::Value>(CacheKey::Forecast), None);
        assert_eq!(
            fixture.orchestrator.state().error_message.as_deref(),
            Some("No cached weather data available.")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_location_burst_triggers_one_refresh() {
        let fixture = offline_fixture();
        seed_cache(&fixture.cache);
        let handle = fixture.orchestrator.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        let before = cycles(&fixture.orchestrator);

        let resolver = fixture.orchestrator.resolver();
        resolver.set_manual_location(Coordinate::new(3.0, 3.0));
        tokio::time::sleep(Duration::from_millis(100)).await;
        resolver.set_manual_location(Coordinate::new(4.0, 4.0));
        tokio::time::sleep(Duration::from_millis(100)).await;
        resolver.set_manual_location(Coordinate::new(5.0, 5.0));
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(cycles(&fixture.orchestrator) - before, 1);
        assert_eq!(
            fixture.orchestrator.state().position,
            Some(Position {
                coords: Coordinate::new(5.0, 5.0),
                source: LocationSource::Manual,
            })
        );
        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_location_change_keeps_selected_location() {
        let fixture = offline_fixture();
        seed_cache(&fixture.cache);
        let resolver = fixture.orchestrator.resolver();
        resolver
            .set_selected_location(SelectedLocation {
                latitude: 5.0,
                longitude: 6.0,
                city: None,
            })
            .unwrap();
        let handle = fixture.orchestrator.start();
        tokio::time::sleep(Duration::from_secs(1)).await;

        resolver.set_manual_location(Coordinate::new(3.0, 3.0));
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(cycles(&fixture.orchestrator), 2);
        assert_eq!(
            fixture.orchestrator.state().position,
            Some(Position {
                coords: Coordinate::new(5.0, 6.0),
                source: LocationSource::CachedSelection,
            })
        );
        handle.stop();
    }

    /// Drops connectivity as soon as the forecast fallback reads the cache.
    struct DisconnectingStore {
        inner: MemoryStore,
        connectivity: Arc<SharedConnectivity>,
    }

    impl KeyValueStore for DisconnectingStore {
        fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            if key == CacheKey::Forecast.as_str() {
                self.connectivity.set_online(false);
            }
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), CacheError> {
            self.inner.remove(key)
        }
    }

    #[tokio::test]
    async fn test_cycle_publishes_connectivity_seen_at_merge() {
        let connectivity = Arc::new(SharedConnectivity::new(true));
        let store = Arc::new(DisconnectingStore {
            inner: MemoryStore::new(),
            connectivity: connectivity.clone(),
        });
        let fixture = build_fixture(
            Arc::new(StaticSensor::fixed(Coordinate::new(1.0, 2.0))),
            WeatherCache::new(store),
            connectivity,
        );
        seed_cache(&fixture.cache);

        // Both fetches fail against the closed port; the forecast fallback goes offline.
        fixture.orchestrator.refresh(RefreshTrigger::ManualRefresh).await;

        let state = fixture.orchestrator.state();
        assert!(!state.is_online);
        assert!(state.has_data());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_location_is_skipped() {
        let fixture = offline_fixture();
        let handle = fixture.orchestrator.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(cycles(&fixture.orchestrator), 1);

        // The startup cycle already applied the sensor's coordinate.
        fixture
            .orchestrator
            .resolver()
            .set_manual_location(Coordinate::new(1.0, 2.0));
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(cycles(&fixture.orchestrator), 1);
        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_unit_changes_refresh() {
        let fixture = offline_fixture();
        let handle = fixture.orchestrator.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        let settings = fixture.orchestrator.settings();

        settings.update(SettingsUpdate::theme(Theme::Dark)).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(cycles(&fixture.orchestrator), 1);

        settings
            .update(SettingsUpdate::temperature_unit(TemperatureUnit::Fahrenheit))
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(cycles(&fixture.orchestrator), 2);
        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connectivity_transitions() {
        let fixture = offline_fixture();
        seed_cache(&fixture.cache);
        let handle = fixture.orchestrator.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(cycles(&fixture.orchestrator), 1);

        // Going online refreshes; the closed port makes both fetches fall back to cache.
        fixture.connectivity.set_online(true);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(cycles(&fixture.orchestrator), 2);
        assert!(fixture.orchestrator.state().is_online);

        // Going offline only republishes.
        fixture.connectivity.set_online(false);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let state = fixture.orchestrator.state();
        assert!(!state.is_online);
        assert!(state.has_data());
        assert_eq!(cycles(&fixture.orchestrator), 2);
        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_ends_listeners() {
        let fixture = offline_fixture();
        let handle = fixture.orchestrator.start();
        tokio::time::sleep(Duration::from_secs(1)).await;

        handle.stop();
        handle.stop();
        assert!(handle.is_stopped());
        handle.shutdown().await;

        fixture
            .orchestrator
            .resolver()
            .set_manual_location(Coordinate::new(8.0, 8.0));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(cycles(&fixture.orchestrator), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_debounce() {
        let fixture = offline_fixture();
        let handle = fixture.orchestrator.start();
        tokio::time::sleep(Duration::from_secs(1)).await;

        fixture
            .orchestrator
            .resolver()
            .set_manual_location(Coordinate::new(8.0, 8.0));
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(handle);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(cycles(&fixture.orchestrator), 1);
    }
}
