use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

type Result<T> = std::result::Result<T, ConfigError>;

/// Environment variable consulted when the config file has no API key.
pub const API_KEY_ENV: &str = "OPENWEATHER_API_KEY";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory (cache database lives here too)
    pub config_dir: PathBuf,

    /// Weather provider endpoints and credentials
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Location fallback settings
    #[serde(default)]
    pub location: LocationConfig,

    /// Reactive refresh tuning
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Offline cache settings
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL for the current-conditions and forecast endpoints
    pub base_url: String,

    /// Base URL for the geocoding (location search) endpoint
    pub geocode_url: String,

    /// Provider API key. Falls back to `OPENWEATHER_API_KEY` when empty.
    #[serde(default)]
    pub api_key: String,

    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openweathermap.org/data/2.5".to_string(),
            geocode_url: "https://api.openweathermap.org/geo/1.0".to_string(),
            api_key: String::new(),
            request_timeout_secs: 10,
        }
    }
}

impl ProviderConfig {
    /// The configured key, or the environment fallback.
    pub fn effective_api_key(&self) -> Option<String> {
        if !self.api_key.trim().is_empty() {
            return Some(self.api_key.clone());
        }
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Last-resort coordinate when no sensor reading or cached location exists
    pub default_latitude: f64,
    pub default_longitude: f64,

    /// Timeout for a single live position read
    pub sensor_timeout_secs: u64,

    /// Position reported by the static sensor on hosts without positioning
    /// hardware, as `[latitude, longitude]`
    #[serde(default)]
    pub fixed_position: Option<[f64; 2]>,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            default_latitude: 10.287020,
            default_longitude: 123.861557,
            sensor_timeout_secs: 10,
            fixed_position: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Window in which repeated location/settings changes collapse into one refresh
    pub debounce_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self { debounce_ms: 500 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// SQLite file name, relative to `config_dir`
    pub file_name: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            file_name: "weather_cache.db".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn path_in(&self, config_dir: &Path) -> PathBuf {
        config_dir.join(&self.file_name)
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nimbus");

        Self {
            config_dir,
            provider: ProviderConfig::default(),
            location: LocationConfig::default(),
            refresh: RefreshConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_path()?)
    }

    /// Load configuration from a specific file, creating it with defaults if missing
    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to_path(config_path)?;
            tracing::info!("Wrote default configuration to {}", config_path.display());
            return Ok(config);
        }

        let contents = std::fs::read_to_string(config_path).map_err(|e| io_error(config_path, e))?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load configuration and validate it
    ///
    /// Returns an error if validation fails with critical errors; warnings are logged.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()));
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        validate_url(&self.provider.base_url, "provider.base_url", &mut result);
        validate_url(&self.provider.geocode_url, "provider.geocode_url", &mut result);

        if self.provider.effective_api_key().is_none() {
            result.add_warning(
                "provider.api_key",
                format!("No API key configured (set it here or via {API_KEY_ENV}); only cached data will be shown"),
            );
        }

        if self.provider.request_timeout_secs == 0 {
            result.add_error(
                "provider.request_timeout_secs",
                "Request timeout must be greater than 0",
            );
        }

        validate_coordinate(
            self.location.default_latitude,
            self.location.default_longitude,
            "location.default",
            &mut result,
        );

        if let Some([lat, lon]) = self.location.fixed_position {
            validate_coordinate(lat, lon, "location.fixed_position", &mut result);
        }

        if self.location.sensor_timeout_secs == 0 {
            result.add_error(
                "location.sensor_timeout_secs",
                "Sensor timeout must be greater than 0",
            );
        }

        if self.refresh.debounce_ms == 0 {
            result.add_warning(
                "refresh.debounce_ms",
                "Debounce disabled; every location or settings change triggers a refresh",
            );
        } else if self.refresh.debounce_ms > 10_000 {
            result.add_warning(
                "refresh.debounce_ms",
                "Debounce window is longer than 10 seconds",
            );
        }

        if self.cache.file_name.trim().is_empty() {
            result.add_error("cache.file_name", "Cache file name must not be empty");
        }

        result
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_path()?)
    }

    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }

        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(config_path, contents).map_err(|e| io_error(config_path, e))
    }

    /// Path of the cache database
    pub fn cache_path(&self) -> PathBuf {
        self.cache.path_in(&self.config_dir)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or(ConfigError::NoConfigDir)?
            .join("nimbus");

        Ok(config_dir.join("config.toml"))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn validate_url(url_str: &str, field_name: &str, result: &mut ValidationResult) {
    match Url::parse(url_str) {
        Ok(url) => {
            if url.scheme() != "http" && url.scheme() != "https" {
                result.add_error(
                    field_name,
                    format!("URL must use http or https scheme, got: {}", url.scheme()),
                );
            }

            if url.host().is_none() {
                result.add_error(field_name, "URL must have a host");
            }
        }
        Err(e) => {
            result.add_error(field_name, format!("Invalid URL: {}", e));
        }
    }
}

fn validate_coordinate(lat: f64, lon: f64, field_name: &str, result: &mut ValidationResult) {
    if !(-90.0..=90.0).contains(&lat) {
        result.add_error(
            format!("{field_name}.latitude"),
            format!("Latitude out of range: {lat}"),
        );
    }
    if !(-180.0..=180.0).contains(&lon) {
        result.add_error(
            format!("{field_name}.longitude"),
            format!("Longitude out of range: {lon}"),
        );
    }
}
