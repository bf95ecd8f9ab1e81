//! Client for the on-site crowd counter.
//!
//! The counter serves `GET /count` (per-zone person counts), an MJPEG stream
//! at `/video_feed?zone=<zone>` and still frames at `/snapshot?zone=<zone>`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{check_status, http_client, ClientError};
use crate::stream::StateStream;

/// Crowd counter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrowdFeedConfig {
    /// Base URL of the counter, e.g. `http://172.19.81.89:5000`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// Delay between count polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}
fn default_timeout() -> u64 { 2_000 }
fn default_poll_interval() -> u64 { 800 }

impl CrowdFeedConfig {
    /// Delay between polls, never shorter than one millisecond.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for CrowdFeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

/// Read a count from a JSON scalar: a number or a numeric string.
fn scalar_count(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().map(|n| n.min(u64::from(u32::MAX)) as u32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Count for `zone` from a `/count` response body.
///
/// The body is a JSON map keyed by zone name. A value can be a number, a
/// numeric string or an object with `display` (preferred) or `raw_last`.
/// A zone missing under its own name is looked up without spaces. A body
/// that is not JSON is read as a bare integer. Anything else counts as 0.
pub fn parse_count(body: &str, zone: &str) -> u32 {
    let json: Value = match serde_json::from_str(body) {
        Ok(json) => json,
        Err(_) => return body.trim().parse().unwrap_or(0),
    };
    let Value::Object(counts) = &json else {
        return scalar_count(&json).unwrap_or(0);
    };

    match counts.get(zone) {
        Some(Value::Object(entry)) => entry
            .get("display")
            .and_then(scalar_count)
            .or_else(|| entry.get("raw_last").and_then(scalar_count))
            .unwrap_or(0),
        Some(value @ (Value::Number(_) | Value::String(_))) => scalar_count(value).unwrap_or(0),
        _ => counts
            .get(&zone.replace(' ', ""))
            .and_then(scalar_count)
            .unwrap_or(0),
    }
}

/// Client for one crowd counter.
#[derive(Clone)]
pub struct CrowdFeedClient {
    config: CrowdFeedConfig,
    http: reqwest::Client,
}

impl CrowdFeedClient {
    pub fn new(config: CrowdFeedConfig) -> Self {
        let http = http_client(Duration::from_millis(config.timeout_ms));
        Self { config, http }
    }

    pub fn config(&self) -> &CrowdFeedConfig {
        &self.config
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn zone_url(&self, endpoint: &str, zone: &str) -> String {
        format!("{}/{}?zone={}", self.base(), endpoint, urlencoding::encode(zone))
    }

    /// Current person count for `zone`.
    pub async fn count(&self, zone: &str) -> Result<u32, ClientError> {
        let url = format!("{}/count", self.base());
        let response = self.http.get(&url).send().await?;
        let body = check_status(response)?.text().await?;
        Ok(parse_count(&body, zone))
    }

    /// URL of the live MJPEG stream for `zone`.
    pub fn video_feed_url(&self, zone: &str) -> String {
        self.zone_url("video_feed", zone)
    }

    /// One still frame for `zone`.
    pub async fn snapshot(&self, zone: &str) -> Result<Bytes, ClientError> {
        let url = self.zone_url("snapshot", zone);
        let response = self.http.get(&url).send().await?;
        Ok(check_status(response)?.bytes().await?)
    }

    /// Poll the count for `zone` into `counts` until the task is aborted.
    ///
    /// Failed polls leave the last value in place.
    pub fn poll(&self, zone: &str, counts: StateStream<u32>) -> JoinHandle<()> {
        let client = self.clone();
        let zone = zone.to_string();
        let period = self.config.poll_interval();
        info!(zone = %zone, interval_ms = self.config.poll_interval_ms, "Polling crowd counter");

        tokio::spawn(async move {
            loop {
                match client.count(&zone).await {
                    Ok(count) => {
                        if counts.get() != count {
                            counts.set(count);
                        }
                    }
                    Err(e) => debug!(zone = %zone, error = %e, "Count poll failed"),
                }
                tokio::time::sleep(period).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_count_shapes() {
        assert_eq!(parse_count(r#"{"Zone A": 42}"#, "Zone A"), 42);
        assert_eq!(parse_count(r#"{"Zone A": "17"}"#, "Zone A"), 17);
        assert_eq!(parse_count(r#"{"Zone A": {"display": 9, "raw_last": 11}}"#, "Zone A"), 9);
        assert_eq!(parse_count(r#"{"Zone A": {"raw_last": 11}}"#, "Zone A"), 11);
        assert_eq!(parse_count(r#"{"ZoneA": 5}"#, "Zone A"), 5);
        assert_eq!(parse_count("  23\n", "Zone A"), 23);
        assert_eq!(parse_count(r#"{"Zone B": 3}"#, "Zone A"), 0);
        assert_eq!(parse_count("offline", "Zone A"), 0);
        assert_eq!(parse_count(r#"{"Zone A": "many"}"#, "Zone A"), 0);
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let config = CrowdFeedConfig {
            poll_interval_ms: 0,
            ..CrowdFeedConfig::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_video_feed_url_encodes_spaces() {
        let client = CrowdFeedClient::new(CrowdFeedConfig {
            base_url: "http://172.19.81.89:5000/".to_string(),
            ..CrowdFeedConfig::default()
        });
        assert_eq!(
            client.video_feed_url("Zone A"),
            "http://172.19.81.89:5000/video_feed?zone=Zone%20A"
        );
    }

    fn client(server: &MockServer) -> CrowdFeedClient {
        CrowdFeedClient::new(CrowdFeedConfig {
            base_url: server.uri(),
            ..CrowdFeedConfig::default()
        })
    }

    #[tokio::test]
    async fn test_count_and_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/count"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"Bridge C": {"display": 131}}"#))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/snapshot"))
            .and(query_param("zone", "Bridge C"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF]))
            .mount(&server)
            .await;

        let feed = client(&server);
        assert_eq!(feed.count("Bridge C").await.unwrap(), 131);
        let frame = feed.snapshot("Bridge C").await.unwrap();
        assert_eq!(&frame[..], &[0xFF, 0xD8, 0xFF]);
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        assert!(matches!(
            client(&server).count("Zone A").await,
            Err(ClientError::Status { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_poll_publishes_counts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/count"))
            .respond_with(ResponseTemplate::new(200).set_body_string("57"))
            .mount(&server)
            .await;

        let counts = StateStream::new(0u32);
        let handle = client(&server).poll("Zone A", counts.clone());
        let seen = tokio::time::timeout(Duration::from_secs(5), counts.wait_until(|c| *c == 57)).await;
        handle.abort();
        assert_eq!(seen.unwrap(), 57);
    }
}
