//! OpenWeatherMap client for current conditions and the 5-day forecast.

use std::time::Duration;

use nimbus_core::{ProviderConfig, ReqwestErrorExt};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use crate::cache::{CacheKey, WeatherCache};
use crate::error::FetchError;
use crate::types::{Coordinate, ForecastEntry, RawWeatherPayload, Units};

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    list: Vec<ForecastItem>,
}

#[derive(Debug, Deserialize)]
struct ForecastItem {
    dt: i64,
    main: ForecastMain,
    #[serde(default)]
    weather: Vec<ForecastCondition>,
}

#[derive(Debug, Deserialize)]
struct ForecastMain {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct ForecastCondition {
    main: String,
    description: Option<String>,
    icon: Option<String>,
}

impl From<ForecastItem> for ForecastEntry {
    fn from(item: ForecastItem) -> Self {
        let condition = item.weather.into_iter().next();
        Self {
            timestamp: item.dt,
            temperature: item.main.temp,
            condition: condition
                .as_ref()
                .map(|c| c.main.clone())
                .unwrap_or_default(),
            description: condition.as_ref().and_then(|c| c.description.clone()),
            icon: condition.and_then(|c| c.icon),
            hour_of_day: None,
        }
    }
}

/// Extract the forecast series from a provider payload.
pub fn parse_forecast(payload: &Value) -> Result<Vec<ForecastEntry>, FetchError> {
    let response = ForecastResponse::deserialize(payload)
        .map_err(|e| FetchError::Malformed(e.to_string()))?;
    Ok(response.list.into_iter().map(ForecastEntry::from).collect())
}

/// Fetches weather over HTTP and writes every successful payload through to
/// the cache. Never retries.
#[derive(Debug, Clone)]
pub struct WeatherFetcher {
    client: Client,
    base_url: String,
    api_key: String,
    cache: WeatherCache,
}

impl WeatherFetcher {
    pub fn new(config: &ProviderConfig, cache: WeatherCache) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(ReqwestErrorExt::into_network_error)?;

        let api_key = config.effective_api_key().unwrap_or_else(|| {
            tracing::warn!("No weather API key configured; requests will be rejected");
            String::new()
        });

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            cache,
        })
    }

    /// Current conditions, stored verbatim under `currentWeather`.
    #[instrument(skip(self), level = "info")]
    pub async fn fetch_current(
        &self,
        coords: Coordinate,
        units: Units,
    ) -> Result<RawWeatherPayload, FetchError> {
        let payload = self.get_json("weather", coords, units).await?;
        if !payload.is_object() {
            return Err(FetchError::Malformed(
                "current weather payload is not an object".to_string(),
            ));
        }

        self.cache.put_or_warn(CacheKey::CurrentWeather, &payload);
        tracing::info!("Fetched current weather");
        Ok(payload)
    }

    /// Forecast series. The raw payload is stored under `forecast` only if it parses.
    #[instrument(skip(self), level = "info")]
    pub async fn fetch_forecast(
        &self,
        coords: Coordinate,
        units: Units,
    ) -> Result<Vec<ForecastEntry>, FetchError> {
        let payload = self.get_json("forecast", coords, units).await?;
        let entries = parse_forecast(&payload)?;

        self.cache.put_or_warn(CacheKey::Forecast, &payload);
        tracing::info!("Fetched forecast with {} entries", entries.len());
        Ok(entries)
    }

    async fn get_json(
        &self,
        endpoint: &str,
        coords: Coordinate,
        units: Units,
    ) -> Result<Value, FetchError> {
        let url = format!("{}/{}", self.base_url, endpoint);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", coords.latitude.to_string()),
                ("lon", coords.longitude.to_string()),
                ("units", units.as_str().to_string()),
                ("appid", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(ReqwestErrorExt::into_network_error)?;

        self.handle_response(response).await
    }

    async fn handle_response(&self, response: reqwest::Response) -> Result<Value, FetchError> {
        let status = response.status();

        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| FetchError::Malformed(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!("Weather provider returned {}: {}", status, body);
        Err(FetchError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> ProviderConfig {
        ProviderConfig {
            base_url: server.uri(),
            geocode_url: server.uri(),
            api_key: "test-key".to_string(),
            request_timeout_secs: 5,
        }
    }

    fn forecast_payload() -> Value {
        json!({
            "cod": "200",
            "list": [
                {
                    "dt": 1_700_000_000,
                    "main": {"temp": 28.5},
                    "weather": [{"main": "Clouds", "description": "broken clouds", "icon": "04d"}]
                },
                {
                    "dt": 1_700_010_800,
                    "main": {"temp": 27.0},
                    "weather": [{"main": "Rain", "description": "light rain", "icon": "10d"}]
                }
            ]
        })
    }

    #[test]
    fn test_parse_forecast_items() {
        let entries = parse_forecast(&forecast_payload()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].timestamp, 1_700_000_000);
        assert_eq!(entries[0].temperature, 28.5);
        assert_eq!(entries[0].condition, "Clouds");
        assert_eq!(entries[1].description.as_deref(), Some("light rain"));
        assert_eq!(entries[1].icon.as_deref(), Some("10d"));
        assert_eq!(entries[0].hour_of_day, None);
    }

    #[test]
    fn test_parse_forecast_without_conditions() {
        let entries =
            parse_forecast(&json!({"list": [{"dt": 1, "main": {"temp": 1.0}}]})).unwrap();
        assert_eq!(entries[0].condition, "");
        assert_eq!(entries[0].icon, None);
    }

    #[test]
    fn test_parse_forecast_rejects_missing_list() {
        let err = parse_forecast(&json!({"cod": "401"})).unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_fetch_current_sends_query_and_writes_through() {
        let server = MockServer::start().await;
        let body = json!({"name": "Cebu City", "main": {"temp": 30.1}});

        Mock::given(method("GET"))
            .and(path("/weather"))
            .and(query_param("lat", "10.28702"))
            .and(query_param("lon", "123.861557"))
            .and(query_param("units", "imperial"))
            .and(query_param("appid", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .expect(1)
            .mount(&server)
            .await;

        let cache = WeatherCache::in_memory();
        let fetcher = WeatherFetcher::new(&config_for(&server), cache.clone()).unwrap();

        let payload = fetcher
            .fetch_current(Coordinate::new(10.287020, 123.861557), Units::Imperial)
            .await
            .unwrap();

        assert_eq!(payload, body);
        assert_eq!(cache.get::<Value>(CacheKey::CurrentWeather), Some(body));
    }

    #[tokio::test]
    async fn test_fetch_forecast_writes_raw_payload() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/forecast"))
            .and(query_param("units", "metric"))
            .respond_with(ResponseTemplate::new(200).set_body_json(forecast_payload()))
            .mount(&server)
            .await;

        let cache = WeatherCache::in_memory();
        let fetcher = WeatherFetcher::new(&config_for(&server), cache.clone()).unwrap();

        let entries = fetcher
            .fetch_forecast(Coordinate::new(1.0, 2.0), Units::Metric)
            .await
            .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(cache.get::<Value>(CacheKey::Forecast), Some(forecast_payload()));
    }

    #[tokio::test]
    async fn test_error_status_is_reported_and_not_cached() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API key"))
            .expect(1)
            .mount(&server)
            .await;

        let cache = WeatherCache::in_memory();
        let fetcher = WeatherFetcher::new(&config_for(&server), cache.clone()).unwrap();

        let err = fetcher
            .fetch_current(Coordinate::new(1.0, 2.0), Units::Metric)
            .await
            .unwrap_err();

        match err {
            FetchError::Status { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "Invalid API key");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(cache.get::<Value>(CacheKey::CurrentWeather), None);
    }

    #[tokio::test]
    async fn test_malformed_forecast_is_not_cached() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let cache = WeatherCache::in_memory();
        let fetcher = WeatherFetcher::new(&config_for(&server), cache.clone()).unwrap();

        let err = fetcher
            .fetch_forecast(Coordinate::new(1.0, 2.0), Units::Metric)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Malformed(_)));
        assert_eq!(cache.get::<Value>(CacheKey::Forecast), None);
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_network_error() {
        let config = ProviderConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            geocode_url: "http://127.0.0.1:9".to_string(),
            api_key: "test-key".to_string(),
            request_timeout_secs: 2,
        };
        let fetcher = WeatherFetcher::new(&config, WeatherCache::in_memory()).unwrap();

        let err = fetcher
            .fetch_current(Coordinate::new(1.0, 2.0), Units::Metric)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Network(_)));
    }
}
