use crate::error::{Result, WeatherError};
use crate::types::{LocationResolver, ResolvedCity};
use serde_json::Value;
use tracing::{debug, instrument};

const GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

/// Google Geocoding API client. Forward lookups resolve free text to a
/// canonical formatted address; reverse lookups turn coordinates into one.
pub struct GoogleMapsResolver {
    client: reqwest::Client,
    api_key: String,
}

impl GoogleMapsResolver {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }

    async fn geocode(&self, query: &[(&str, String)]) -> Result<Value> {
        let mut params = query.to_vec();
        params.push(("key", self.api_key.clone()));

        let body: Value = self
            .client
            .get(GEOCODE_URL)
            .query(&params)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| WeatherError::Resolution(format!("geocoding request failed: {e}")))?
            .json()
            .await?;

        let status = body["status"].as_str().unwrap_or("UNKNOWN");
        if status != "OK" {
            return Err(WeatherError::Resolution(format!(
                "geocoding returned status {status}"
            )));
        }
        Ok(body)
    }

    fn first_result(body: &Value) -> Result<&Value> {
        body["results"]
            .as_array()
            .and_then(|r| r.first())
            .ok_or_else(|| WeatherError::Resolution("no geocoding results".into()))
    }
}

#[async_trait::async_trait]
impl LocationResolver for GoogleMapsResolver {
    #[instrument(skip(self))]
    async fn resolve_coordinates(&self, lat: f64, lng: f64) -> Result<String> {
        let body = self
            .geocode(&[("latlng", format!("{lat},{lng}")), ("result_type", "locality".into())])
            .await?;
        let result = Self::first_result(&body)?;

        let name = result["formatted_address"]
            .as_str()
            .ok_or_else(|| WeatherError::Resolution("missing formatted_address".into()))?;
        debug!("Reverse geocoded ({}, {}) to {}", lat, lng, name);
        Ok(name.to_string())
    }

    #[instrument(skip(self))]
    async fn resolve_query(&self, query: &str) -> Result<ResolvedCity> {
        let body = self.geocode(&[("address", query.to_string())]).await?;
        let result = Self::first_result(&body)?;

        let name = result["formatted_address"]
            .as_str()
            .ok_or_else(|| WeatherError::Resolution("missing formatted_address".into()))?;
        let loc = &result["geometry"]["location"];
        let lat = loc["lat"].as_f64().unwrap_or_default();
        let lng = loc["lng"].as_f64().unwrap_or_default();

        debug!("Resolved '{}' to {} ({}, {})", query, name, lat, lng);
        Ok(ResolvedCity {
            name: name.to_string(),
            lat,
            lng,
        })
    }
}
