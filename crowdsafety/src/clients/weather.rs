//! Current-conditions client for an OpenWeatherMap-compatible API.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{check_status, http_client, ClientError};
use crate::models::WeatherType;

/// Temperature (Celsius) from which observed conditions count as extreme heat.
pub const EXTREME_HEAT_CELSIUS: f64 = 40.0;

/// Weather API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Endpoint returning current conditions
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key sent as `appid`
    #[serde(default)]
    pub api_key: String,

    /// Site latitude
    #[serde(default = "default_lat")]
    pub lat: f64,

    /// Site longitude
    #[serde(default = "default_lon")]
    pub lon: f64,

    /// Request timeout
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

fn default_base_url() -> String {
    "https://api.openweathermap.org/data/2.5/weather".to_string()
}
fn default_lat() -> f64 { 25.4358 }
fn default_lon() -> f64 { 81.8463 }
fn default_timeout() -> u64 { 5_000 }

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            lat: default_lat(),
            lon: default_lon(),
            timeout_ms: default_timeout(),
        }
    }
}

/// Observed conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherInfo {
    /// Condition group, e.g. `Rain`
    pub main: String,
    pub description: String,
    pub icon: String,
    /// Celsius
    pub temp: f64,
    /// Provider alert text; the current-conditions endpoint carries none
    pub alert: Option<String>,
}

impl WeatherInfo {
    /// Category used by the live weather stream.
    pub fn weather_type(&self) -> WeatherType {
        if self.temp >= EXTREME_HEAT_CELSIUS {
            return WeatherType::ExtremeHeat;
        }
        match self.main.as_str() {
            "Thunderstorm" | "Squall" | "Tornado" => WeatherType::Storm,
            "Rain" | "Drizzle" => WeatherType::Rain,
            "Clear" => WeatherType::Sunny,
            _ => WeatherType::Cloudy,
        }
    }
}

#[derive(Deserialize)]
struct CurrentResponse {
    weather: Vec<Condition>,
    main: Readings,
}

#[derive(Deserialize)]
struct Condition {
    main: String,
    description: String,
    icon: String,
}

#[derive(Deserialize)]
struct Readings {
    temp: f64,
}

/// Client for current conditions at the configured site.
#[derive(Clone)]
pub struct WeatherClient {
    config: WeatherConfig,
    http: reqwest::Client,
}

impl WeatherClient {
    pub fn new(config: WeatherConfig) -> Self {
        let http = http_client(Duration::from_millis(config.timeout_ms));
        Self { config, http }
    }

    pub fn config(&self) -> &WeatherConfig {
        &self.config
    }

    /// Fetch current conditions at `lat`/`lon`.
    pub async fn fetch_current(&self, lat: f64, lon: f64) -> Result<WeatherInfo, ClientError> {
        debug!(lat, lon, "Fetching current weather");
        let response = self
            .http
            .get(&self.config.base_url)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("appid", self.config.api_key.clone()),
                ("units", "metric".to_string()),
            ])
            .send()
            .await?;

        let body: CurrentResponse = check_status(response)?
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

        let condition = body
            .weather
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::InvalidResponse("empty weather list".to_string()))?;

        Ok(WeatherInfo {
            main: condition.main,
            description: condition.description,
            icon: condition.icon,
            temp: body.main.temp,
            alert: None,
        })
    }

    /// Current conditions, or `None` on any failure.
    pub async fn current(&self, lat: f64, lon: f64) -> Option<WeatherInfo> {
        match self.fetch_current(lat, lon).await {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(error = %e, "Weather fetch failed");
                None
            }
        }
    }

    /// Current conditions at the configured site.
    pub async fn current_at_site(&self) -> Option<WeatherInfo> {
        self.current(self.config.lat, self.config.lon).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> WeatherClient {
        WeatherClient::new(WeatherConfig {
            base_url: format!("{}/data/2.5/weather", server.uri()),
            api_key: "test-key".to_string(),
            ..WeatherConfig::default()
        })
    }

    #[tokio::test]
    async fn test_decodes_current_conditions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .and(query_param("appid", "test-key"))
            .and(query_param("units", "metric"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "weather": [{"main": "Rain", "description": "light rain", "icon": "10d"}],
                "main": {"temp": 27.4, "humidity": 80}
            })))
            .mount(&server)
            .await;

        let info = client(&server).current(25.43, 81.84).await.unwrap();
        assert_eq!(info.main, "Rain");
        assert_eq!(info.description, "light rain");
        assert_eq!(info.icon, "10d");
        assert_eq!(info.temp, 27.4);
        assert!(info.alert.is_none());
        assert_eq!(info.weather_type(), WeatherType::Rain);
    }

    #[tokio::test]
    async fn test_failures_become_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        let weather = client(&server);
        assert!(weather.current(0.0, 0.0).await.is_none());
        assert!(matches!(
            weather.fetch_current(0.0, 0.0).await,
            Err(ClientError::Status { status: 401, .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_condition_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"weather": [], "main": {"temp": 20.0}})))
            .mount(&server)
            .await;
        assert!(matches!(
            client(&server).fetch_current(0.0, 0.0).await,
            Err(ClientError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_weather_type_mapping() {
        let info = |main: &str, temp: f64| WeatherInfo {
            main: main.to_string(),
            description: String::new(),
            icon: String::new(),
            temp,
            alert: None,
        };
        assert_eq!(info("Clear", 30.0).weather_type(), WeatherType::Sunny);
        assert_eq!(info("Clear", 43.0).weather_type(), WeatherType::ExtremeHeat);
        assert_eq!(info("Thunderstorm", 25.0).weather_type(), WeatherType::Storm);
        assert_eq!(info("Haze", 25.0).weather_type(), WeatherType::Cloudy);
    }
}
