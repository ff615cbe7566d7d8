//! Weather engine for Nimbus
//!
//! Resolves a position, fetches current conditions and forecast from
//! OpenWeatherMap, falls back to cached data when offline, and publishes a
//! single view snapshot for the presentation layer.

pub mod aggregate;
pub mod cache;
pub mod connectivity;
pub mod debounce;
pub mod error;
pub mod geocode;
pub mod location;
pub mod observable;
pub mod orchestrator;
pub mod provider;
pub mod settings;
pub mod types;

pub use aggregate::{aggregate, ForecastViews};
pub use cache::{CacheKey, KeyValueStore, MemoryStore, SqliteStore, WeatherCache};
pub use connectivity::{ConnectivityMonitor, SharedConnectivity};
pub use error::{CacheError, FetchError, LocationError, RefreshError};
pub use geocode::{GeocodeResult, LocationSearch};
pub use location::{LocationResolver, PositionOptions, PositionSensor, StaticSensor};
pub use observable::Observable;
pub use orchestrator::{OrchestratorHandle, RefreshTrigger, WeatherOrchestrator};
pub use provider::{parse_forecast, WeatherFetcher};
pub use settings::SettingsStore;
pub use types::*;
