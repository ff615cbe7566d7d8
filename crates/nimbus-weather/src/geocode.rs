//! Forward geocoding: turn a place name typed by the user into candidate
//! locations. Results come back in provider order; no ranking is applied.

use std::time::Duration;

use nimbus_core::{ProviderConfig, ReqwestErrorExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::FetchError;
use crate::types::SelectedLocation;

const RESULT_LIMIT: u32 = 5;

/// One geocoding candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub name: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    pub lat: f64,
    pub lon: f64,
}

impl GeocodeResult {
    /// Display name such as "Cebu City, Central Visayas, PH".
    pub fn display_name(&self) -> String {
        [Some(&self.name), self.state.as_ref(), self.country.as_ref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn to_selected_location(&self) -> SelectedLocation {
        SelectedLocation {
            latitude: self.lat,
            longitude: self.lon,
            city: Some(self.display_name()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocationSearch {
    client: Client,
    base_url: String,
    api_key: String,
}

impl LocationSearch {
    pub fn new(config: &ProviderConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(ReqwestErrorExt::into_network_error)?;

        Ok(Self {
            client,
            base_url: config.geocode_url.trim_end_matches('/').to_string(),
            api_key: config.effective_api_key().unwrap_or_default(),
        })
    }

    /// Look up places matching `query`. A blank query returns no results
    /// without contacting the provider.
    #[instrument(skip(self), level = "info")]
    pub async fn search(&self, query: &str) -> Result<Vec<GeocodeResult>, FetchError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/direct", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", query.to_string()),
                ("limit", RESULT_LIMIT.to_string()),
                ("appid", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(ReqwestErrorExt::into_network_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!("Geocode returned status {}", status);
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let results: Vec<GeocodeResult> = response
            .json()
            .await
            .map_err(|e| FetchError::Malformed(e.to_string()))?;

        tracing::info!("Geocode found {} results for {:?}", results.len(), query);
        Ok(results)
    }
}
