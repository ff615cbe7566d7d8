//! Durable key/value cache for weather payloads, locations and settings.
//!
//! Values are whole JSON blobs keyed by logical name. Writes overwrite;
//! there is no expiry.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use nimbus_core::RusqliteErrorExt;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CacheError;

/// Logical names of every persisted blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    CurrentWeather,
    Forecast,
    CurrentLocation,
    SelectedLocation,
    Settings,
}

impl CacheKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CurrentWeather => "currentWeather",
            Self::Forecast => "forecast",
            Self::CurrentLocation => "currentLocation",
            Self::SelectedLocation => "selectedLocation",
            Self::Settings => "app-settings",
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw blob storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;

    fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// SQLite-backed store; survives restarts.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, CacheError> {
        let conn = Connection::open(path).map_err(RusqliteErrorExt::into_database_error)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    #[cfg(test)]
    pub fn in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory().map_err(RusqliteErrorExt::into_database_error)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), CacheError> {
        self.conn
            .lock()
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS kv_cache (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                "#,
            )
            .map_err(RusqliteErrorExt::into_database_error)?;
        Ok(())
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let value = self
            .conn
            .lock()
            .query_row(
                "SELECT value FROM kv_cache WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(RusqliteErrorExt::into_database_error)?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let now = Utc::now().timestamp_millis();
        self.conn
            .lock()
            .execute(
                "INSERT OR REPLACE INTO kv_cache (key, value, updated_at) VALUES (?1, ?2, ?3)",
                params![key, value, now],
            )
            .map_err(RusqliteErrorExt::into_database_error)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.conn
            .lock()
            .execute("DELETE FROM kv_cache WHERE key = ?1", params![key])
            .map_err(RusqliteErrorExt::into_database_error)?;
        Ok(())
    }
}

/// Process-local store for tests and hosts without a writable disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Typed JSON access over a [`KeyValueStore`].
///
/// Reads never fail: a missing, unreadable or corrupt entry is `None`, and a
/// corrupt entry is removed so it does not fail again.
#[derive(Clone)]
pub struct WeatherCache {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for WeatherCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherCache").finish_non_exhaustive()
    }
}

impl WeatherCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn get<T: DeserializeOwned>(&self, key: CacheKey) -> Option<T> {
        self.get_with(key, |raw| {
            serde_json::from_str::<T>(raw).map_err(|e| e.to_string())
        })
    }

    /// Read an entry through a custom parser; parse failure discards the entry.
    pub fn get_with<T, F>(&self, key: CacheKey, parse: F) -> Option<T>
    where
        F: FnOnce(&str) -> Result<T, String>,
    {
        let raw = match self.store.get(key.as_str()) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!("Cache miss for {}", key);
                return None;
            }
            Err(e) => {
                tracing::warn!("Failed to read {} from cache: {}", key, e);
                return None;
            }
        };

        match parse(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Discarding corrupt cache entry {}: {}", key, e);
                if let Err(e) = self.store.remove(key.as_str()) {
                    tracing::warn!("Failed to discard {}: {}", key, e);
                }
                None
            }
        }
    }

    pub fn put<T: Serialize>(&self, key: CacheKey, value: &T) -> Result<(), CacheError> {
        let raw = serde_json::to_string(value).map_err(|e| CacheError::Serialize(e.to_string()))?;
        self.store.set(key.as_str(), &raw)
    }

    pub fn remove(&self, key: CacheKey) -> Result<(), CacheError> {
        self.store.remove(key.as_str())
    }

    /// Write an entry, logging instead of failing.
    pub fn put_or_warn<T: Serialize>(&self, key: CacheKey, value: &T) {
        if let Err(e) = self.put(key, value) {
            tracing::warn!("Failed to write {} to cache: {}", key, e);
        }
    }
}
