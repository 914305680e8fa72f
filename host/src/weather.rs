//! ==============================================================================
//! weather.rs - field conditions from open-meteo + nominatim
//! ==============================================================================
//!
//! purpose:
//!     current temperature / humidity / wind / rain for a coordinate, plus a
//!     human-readable place name. the place name is best effort: any failure
//!     of the reverse-geocoding lookup yields "Unknown Location" instead of
//!     failing the whole request.
//!
//! relationships:
//!     - used by: server.rs (GET /api/weather)
//!
//! ==============================================================================

use crate::config::WeatherConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const UNKNOWN_LOCATION: &str = "Unknown Location";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherData {
    pub temperature: i32,
    pub humidity: i32,
    pub wind_speed: i32,
    pub is_raining: bool,
    pub rain_probability: f64,
    pub location_name: String,
}

// open-meteo wire format (only the fields we ask for)
#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: CurrentConditions,
    hourly: HourlyConditions,
}

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    temperature_2m: f64,
    relative_humidity_2m: f64,
    wind_speed_10m: f64,
    precipitation: f64,
}

#[derive(Debug, Deserialize)]
struct HourlyConditions {
    #[serde(default)]
    precipitation_probability: Vec<Option<f64>>,
}

// nominatim wire format
#[derive(Debug, Default, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    address: GeocodeAddress,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GeocodeAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    suburb: Option<String>,
}

impl GeocodeResponse {
    /// most specific settlement name available
    fn place_name(&self) -> Option<String> {
        let a = &self.address;
        a.city
            .clone()
            .or_else(|| a.town.clone())
            .or_else(|| a.village.clone())
            .or_else(|| a.suburb.clone())
            .or_else(|| {
                self.display_name
                    .as_deref()
                    .and_then(|name| name.split(',').next())
                    .map(|s| s.trim().to_string())
            })
            .filter(|s| !s.is_empty())
    }
}

impl WeatherData {
    fn from_forecast(forecast: ForecastResponse, location_name: String) -> Self {
        let c = forecast.current;
        Self {
            temperature: c.temperature_2m.round() as i32,
            humidity: c.relative_humidity_2m.round() as i32,
            wind_speed: c.wind_speed_10m.round() as i32,
            is_raining: c.precipitation > 0.0,
            rain_probability: forecast
                .hourly
                .precipitation_probability
                .first()
                .copied()
                .flatten()
                .unwrap_or(0.0),
            location_name,
        }
    }
}

pub struct WeatherClient {
    client: reqwest::Client,
    forecast_url: String,
    geocode_url: String,
}

impl WeatherClient {
    pub fn new(config: &WeatherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("failed to build weather http client")?;

        Ok(Self {
            client,
            forecast_url: config.forecast_url.clone(),
            geocode_url: config.geocode_url.clone(),
        })
    }

    pub async fn fetch(&self, lat: f64, lng: f64) -> Result<WeatherData> {
        let lat_s = lat.to_string();
        let lng_s = lng.to_string();
        let forecast: ForecastResponse = self
            .client
            .get(&self.forecast_url)
            .query(&[
                ("latitude", lat_s.as_str()),
                ("longitude", lng_s.as_str()),
                ("current", "temperature_2m,relative_humidity_2m,wind_speed_10m,precipitation"),
                ("hourly", "precipitation_probability"),
                ("forecast_days", "1"),
            ])
            .send()
            .await
            .context("Failed to fetch weather data")?
            .error_for_status()
            .context("Failed to fetch weather data")?
            .json()
            .await
            .context("weather response was malformed")?;

        let location = self.reverse_geocode(lat, lng).await;
        Ok(WeatherData::from_forecast(forecast, location))
    }

    /// place name for a coordinate, "Unknown Location" on any failure
    pub async fn reverse_geocode(&self, lat: f64, lng: f64) -> String {
        match self.lookup_place(lat, lng).await {
            Ok(Some(name)) => name,
            Ok(None) => UNKNOWN_LOCATION.to_string(),
            Err(e) => {
                tracing::warn!("[WEATHER] Reverse geocoding error: {:#}", e);
                UNKNOWN_LOCATION.to_string()
            }
        }
    }

    async fn lookup_place(&self, lat: f64, lng: f64) -> Result<Option<String>> {
        let lat_s = lat.to_string();
        let lng_s = lng.to_string();
        let geo: GeocodeResponse = self
            .client
            .get(&self.geocode_url)
            .query(&[("format", "json"), ("lat", lat_s.as_str()), ("lon", lng_s.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(geo.place_name())
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Json, Router};
    use serde_json::json;

    fn geocode(v: serde_json::Value) -> GeocodeResponse {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_place_name_precedence() {
        let g = geocode(json!({"address": {"town": "Ely", "village": "Littleport"}, "display_name": "x"}));
        assert_eq!(g.place_name().as_deref(), Some("Ely"));

        let g = geocode(json!({"address": {"suburb": "Chesterton"}}));
        assert_eq!(g.place_name().as_deref(), Some("Chesterton"));

        let g = geocode(json!({"address": {}, "display_name": "Field 12, Fenland, England"}));
        assert_eq!(g.place_name().as_deref(), Some("Field 12"));

        let g = geocode(json!({"error": "Unable to geocode"}));
        assert_eq!(g.place_name(), None);
    }

    #[test]
    fn test_forecast_conversion() {
        let forecast: ForecastResponse = serde_json::from_value(json!({
            "current": {
                "temperature_2m": 23.6,
                "relative_humidity_2m": 61.4,
                "wind_speed_10m": 11.5,
                "precipitation": 0.2
            },
            "hourly": { "precipitation_probability": [35, 40, null] }
        }))
        .unwrap();

        let data = WeatherData::from_forecast(forecast, "Ely".to_string());
        assert_eq!(data.temperature, 24);
        assert_eq!(data.humidity, 61);
        assert_eq!(data.wind_speed, 12);
        assert!(data.is_raining);
        assert_eq!(data.rain_probability, 35.0);
        assert_eq!(data.location_name, "Ely");
    }

    #[tokio::test]
    async fn test_fetch_with_failing_geocoder() {
        let app = Router::new().route(
            "/v1/forecast",
            get(|| async {
                Json(json!({
                    "current": {
                        "temperature_2m": 18.2,
                        "relative_humidity_2m": 70.0,
                        "wind_speed_10m": 4.0,
                        "precipitation": 0.0
                    },
                    "hourly": { "precipitation_probability": [] }
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = WeatherClient::new(&WeatherConfig {
            forecast_url: format!("http://{}/v1/forecast", addr),
            geocode_url: "http://127.0.0.1:1/reverse".to_string(),
            ..WeatherConfig::default()
        })
        .unwrap();

        let data = client.fetch(52.4, 0.26).await.unwrap();
        assert_eq!(data.temperature, 18);
        assert!(!data.is_raining);
        assert_eq!(data.rain_probability, 0.0);
        assert_eq!(data.location_name, UNKNOWN_LOCATION);
    }

    #[tokio::test]
    async fn test_fetch_fails_when_forecast_unreachable() {
        let client = WeatherClient::new(&WeatherConfig {
            forecast_url: "http://127.0.0.1:1/v1/forecast".to_string(),
            ..WeatherConfig::default()
        })
        .unwrap();
        assert!(client.fetch(0.0, 0.0).await.is_err());
    }
}
