use serde::{Deserialize, Serialize};

/// Coordinate used when every other location source is unavailable.
pub const DEFAULT_COORDINATE: Coordinate = Coordinate {
    latitude: 10.287020,
    longitude: 123.861557,
};

/// Advisory attached to the view when the default coordinate is used.
pub const DEFAULT_LOCATION_ADVISORY: &str =
    "Using default location. Enable location services for accuracy.";

/// Geographic coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A location chosen by the user (or by search), persisted across sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

impl SelectedLocation {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// Which fallback tier produced a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    Live,
    /// Set by the host with `set_manual_location`, never read from the sensor
    Manual,
    CachedSelection,
    CachedLastKnown,
    Default,
}

/// Result of location resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub coords: Coordinate,
    pub source: LocationSource,
}

impl Position {
    /// Non-fatal advisory for the user, if this position is degraded.
    pub fn advisory(&self) -> Option<&'static str> {
        match self.source {
            LocationSource::Default => Some(DEFAULT_LOCATION_ADVISORY),
            _ => None,
        }
    }
}

/// Opaque provider response, stored and cached verbatim.
pub type RawWeatherPayload = serde_json::Value;

/// One step of the provider's forecast series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    /// Unix timestamp, seconds
    pub timestamp: i64,
    pub temperature: f64,
    /// Short condition group, e.g. "Clouds"
    pub condition: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    /// Local hour (0-23); set by the aggregator
    #[serde(default)]
    pub hour_of_day: Option<u32>,
}

/// Temperature unit preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn units(self) -> Units {
        match self {
            Self::Celsius => Units::Metric,
            Self::Fahrenheit => Units::Imperial,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
        }
    }
}

/// Unit system understood by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Units {
    Metric,
    Imperial,
}

impl Units {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Metric => "metric",
            Self::Imperial => "imperial",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// Persisted user preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub temperature_unit: TemperatureUnit,
    pub theme: Theme,
}

/// Partial settings change; `None` fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub temperature_unit: Option<TemperatureUnit>,
    pub theme: Option<Theme>,
}

impl SettingsUpdate {
    pub fn temperature_unit(unit: TemperatureUnit) -> Self {
        Self {
            temperature_unit: Some(unit),
            ..Self::default()
        }
    }

    pub fn theme(theme: Theme) -> Self {
        Self {
            theme: Some(theme),
            ..Self::default()
        }
    }
}

impl Settings {
    pub fn merged(self, update: SettingsUpdate) -> Self {
        Self {
            temperature_unit: update.temperature_unit.unwrap_or(self.temperature_unit),
            theme: update.theme.unwrap_or(self.theme),
        }
    }
}

/// Snapshot consumed by the presentation layer. Replaced, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewState {
    pub current_weather: Option<RawWeatherPayload>,
    pub hourly: Vec<ForecastEntry>,
    pub daily: Vec<ForecastEntry>,
    pub is_loading: bool,
    pub is_online: bool,
    pub error_message: Option<String>,
    pub position: Option<Position>,
    pub temperature_unit: TemperatureUnit,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            current_weather: None,
            hourly: Vec::new(),
            daily: Vec::new(),
            is_loading: true,
            is_online: true,
            error_message: None,
            position: None,
            temperature_unit: TemperatureUnit::default(),
        }
    }
}

impl ViewState {
    pub fn has_data(&self) -> bool {
        self.current_weather.is_some() || !self.hourly.is_empty() || !self.daily.is_empty()
    }
}
