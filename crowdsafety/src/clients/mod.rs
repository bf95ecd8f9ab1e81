//! HTTP clients for external peers.
//!
//! - [`CrowdFeedClient`]: the on-site camera counter (person counts, MJPEG
//!   feed URLs, still snapshots)
//! - [`WeatherClient`]: current conditions from a third-party weather API

pub mod crowd_feed;
pub mod weather;

pub use crowd_feed::{CrowdFeedClient, CrowdFeedConfig};
pub use weather::{WeatherClient, WeatherConfig, WeatherInfo};

/// Error types for the HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Request could not be sent or timed out
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Peer answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// Response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

pub(crate) fn http_client(timeout: std::time::Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("crowdsafety/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

/// Reject non-success responses.
fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ClientError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        })
    }
}
