//! Best-effort position resolution.
//!
//! Tiers, in order: live sensor, persisted selection, cached last-known
//! location, hardcoded default. A tier is only consulted when every earlier
//! tier failed or had nothing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheKey, WeatherCache};
use crate::error::{CacheError, LocationError};
use crate::observable::Observable;
use crate::types::{Coordinate, LocationSource, Position, SelectedLocation, DEFAULT_COORDINATE};

pub const DEFAULT_SENSOR_TIMEOUT: Duration = Duration::from_secs(10);

/// Options passed to the device sensor for a single read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    /// Oldest cached reading the sensor may return; zero forces a fresh fix
    pub maximum_age: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: DEFAULT_SENSOR_TIMEOUT,
            maximum_age: Duration::ZERO,
        }
    }
}

/// Device geolocation.
#[async_trait]
pub trait PositionSensor: Send + Sync {
    async fn current_position(&self, options: PositionOptions)
        -> Result<Coordinate, LocationError>;

    /// Continuous updates, for sensors that support them.
    fn watch_position(&self, _high_accuracy: bool) -> Option<mpsc::Receiver<Coordinate>> {
        None
    }
}

/// Sensor with a fixed answer, for hosts without positioning hardware.
#[derive(Debug, Clone, Copy)]
pub struct StaticSensor {
    position: Option<Coordinate>,
}

impl StaticSensor {
    pub fn fixed(position: Coordinate) -> Self {
        Self {
            position: Some(position),
        }
    }

    pub fn unavailable() -> Self {
        Self { position: None }
    }
}

#[async_trait]
impl PositionSensor for StaticSensor {
    async fn current_position(
        &self,
        _options: PositionOptions,
    ) -> Result<Coordinate, LocationError> {
        self.position.ok_or(LocationError::SensorUnavailable)
    }
}

pub struct LocationResolver {
    sensor: Arc<dyn PositionSensor>,
    cache: WeatherCache,
    options: PositionOptions,
    default_position: Coordinate,
    last_known: Mutex<Option<Coordinate>>,
    manual: Mutex<Option<Coordinate>>,
    location: Observable<Option<Coordinate>>,
    selected: Observable<Option<SelectedLocation>>,
}

impl LocationResolver {
    /// Create a resolver, restoring any persisted selection.
    pub fn new(sensor: Arc<dyn PositionSensor>, cache: WeatherCache) -> Self {
        let saved = cache.get::<SelectedLocation>(CacheKey::SelectedLocation);
        if let Some(location) = &saved {
            tracing::info!(
                "Restored selected location {:?} ({}, {})",
                location.city,
                location.latitude,
                location.longitude
            );
        }

        Self {
            sensor,
            cache,
            options: PositionOptions::default(),
            default_position: DEFAULT_COORDINATE,
            last_known: Mutex::new(None),
            manual: Mutex::new(None),
            location: Observable::new(None),
            selected: Observable::new(saved),
        }
    }

    pub fn with_default_position(mut self, position: Coordinate) -> Self {
        self.default_position = position;
        self
    }

    pub fn with_sensor_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Walk the fallback chain. Never fails.
    pub async fn resolve(&self) -> Position {
        match self.read_sensor().await {
            Ok(coords) => {
                tracing::debug!("Live position {}, {}", coords.latitude, coords.longitude);
                self.record_live(coords);
                return Position {
                    coords,
                    source: LocationSource::Live,
                };
            }
            Err(e) => tracing::debug!("Live position unavailable: {}", e),
        }

        if let Some(selected) = self.selected_location() {
            tracing::debug!("Falling back to selected location");
            return Position {
                coords: selected.coordinate(),
                source: LocationSource::CachedSelection,
            };
        }

        if let Some(coords) = self.cache.get::<Coordinate>(CacheKey::CurrentLocation) {
            tracing::debug!("Falling back to cached location");
            return Position {
                coords,
                source: LocationSource::CachedLastKnown,
            };
        }

        tracing::warn!(
            "No location available, using default {}, {}",
            self.default_position.latitude,
            self.default_position.longitude
        );
        Position {
            coords: self.default_position,
            source: LocationSource::Default,
        }
    }

    async fn read_sensor(&self) -> Result<Coordinate, LocationError> {
        let read = self.sensor.current_position(self.options);
        match tokio::time::timeout(self.options.timeout, read).await {
            Ok(result) => result,
            Err(_) => Err(LocationError::Timeout),
        }
    }

    fn record_live(&self, coords: Coordinate) {
        *self.last_known.lock() = Some(coords);
        *self.manual.lock() = None;
        self.cache.put_or_warn(CacheKey::CurrentLocation, &coords);
        self.location.publish(Some(coords));
    }

    /// Most recent successful live reading in this session.
    pub fn last_known_position(&self) -> Option<Coordinate> {
        *self.last_known.lock()
    }

    /// Use a position without consulting the sensor.
    ///
    /// Holds until the next live reading; a selected location still wins.
    pub fn set_manual_location(&self, coords: Coordinate) {
        tracing::info!("Manual location {}, {}", coords.latitude, coords.longitude);
        *self.manual.lock() = Some(coords);
        self.location.publish(Some(coords));
    }

    pub fn manual_location(&self) -> Option<Coordinate> {
        *self.manual.lock()
    }

    /// Remember a chosen location across sessions and announce it.
    ///
    /// The selection takes effect even if persisting it fails.
    pub fn set_selected_location(&self, location: SelectedLocation) -> Result<(), CacheError> {
        let persisted = self.cache.put(CacheKey::SelectedLocation, &location);
        let coords = location.coordinate();
        self.selected.publish(Some(location));
        self.location.publish(Some(coords));
        persisted
    }

    pub fn clear_selected_location(&self) -> Result<(), CacheError> {
        let removed = self.cache.remove(CacheKey::SelectedLocation);
        self.selected.publish(None);
        removed
    }

    pub fn selected_location(&self) -> Option<SelectedLocation> {
        self.selected.get()
    }

    /// Location-changed channel.
    pub fn subscribe(&self) -> watch::Receiver<Option<Coordinate>> {
        self.location.subscribe()
    }

    pub fn subscribe_selected(&self) -> watch::Receiver<Option<SelectedLocation>> {
        self.selected.subscribe()
    }

    /// Forward continuous sensor updates onto the location channel until cancelled.
    ///
    /// Returns `None` when the sensor cannot watch.
    pub fn spawn_watch(self: &Arc<Self>, token: CancellationToken) -> Option<JoinHandle<()>> {
        let mut updates = self.sensor.watch_position(self.options.high_accuracy)?;
        let resolver = Arc::clone(self);

        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    update = updates.recv() => match update {
                        Some(coords) => resolver.record_live(coords),
                        None => {
                            tracing::debug!("Position watch ended");
                            break;
                        }
                    },
                }
            }
        }))
    }
}
