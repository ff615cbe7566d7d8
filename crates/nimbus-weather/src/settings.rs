//! Persisted user preferences.

use tokio::sync::watch;

use crate::cache::{CacheKey, WeatherCache};
use crate::error::CacheError;
use crate::observable::Observable;
use crate::types::{Settings, SettingsUpdate, Units};

pub struct SettingsStore {
    cache: WeatherCache,
    settings: Observable<Settings>,
}

impl SettingsStore {
    /// Load saved settings, falling back to defaults when absent or corrupt.
    pub fn load(cache: WeatherCache) -> Self {
        let settings = cache.get::<Settings>(CacheKey::Settings).unwrap_or_default();
        tracing::debug!("Loaded settings: {:?}", settings);

        Self {
            cache,
            settings: Observable::new(settings),
        }
    }

    pub fn current(&self) -> Settings {
        self.settings.get()
    }

    pub fn units(&self) -> Units {
        self.current().temperature_unit.units()
    }

    /// Merge a partial update, persist it and notify subscribers.
    ///
    /// The new settings apply for this session even when persisting fails.
    pub fn update(&self, update: SettingsUpdate) -> Result<Settings, CacheError> {
        let merged = self.current().merged(update);
        let persisted = self.cache.put(CacheKey::Settings, &merged);
        self.settings.publish(merged);
        tracing::info!("Settings updated: {:?}", merged);
        persisted.map(|()| merged)
    }

    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.settings.subscribe()
    }
}
