//! HTTP client utilities.

use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::TimeoutConfig;
use crate::sources::SourceError;

/// Shared HTTP client with sensible defaults
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Arc<Client>,
}

impl HttpClient {
    /// Create a client with a 30s request timeout and 10s connect timeout.
    ///
    /// Adapter calls are additionally bounded by the caller's own timeout.
    pub fn new() -> Result<Self, SourceError> {
        Self::with_timeouts(Duration::from_secs(30), Duration::from_secs(10))
    }

    /// Create a client from the configured timeouts
    pub fn from_config(timeouts: &TimeoutConfig) -> Result<Self, SourceError> {
        Self::with_timeouts(timeouts.adapter(), timeouts.connect())
    }

    pub fn with_timeouts(request: Duration, connect: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(request)
            .connect_timeout(connect)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| SourceError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
        })
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self {
            client: Arc::new(Client::new()),
        })
    }
}

/// Send a request and decode a JSON body, mapping failures to source outcomes.
///
/// `context` describes the request in error messages ("semantic: paper 123").
pub async fn fetch_json(request: RequestBuilder, context: &str) -> Result<Value, SourceError> {
    let response = request
        .send()
        .await
        .map_err(|e| SourceError::Unavailable(format!("{}: {}", context, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::from_status(status.as_u16(), context));
    }

    response.json::<Value>().await.map_err(|e| {
        if e.is_decode() {
            SourceError::Malformed(format!("{}: {}", context, e))
        } else {
            SourceError::Unavailable(format!("{}: {}", context, e))
        }
    })
}

/// Percent-encode an identifier for use as a URL path segment.
///
/// `/` and `:` are kept literally since DOIs and prefixed ids rely on them.
pub fn encode_id(id: &str) -> String {
    urlencoding::encode(id)
        .replace("%2F", "/")
        .replace("%3A", ":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_json_status_mapping() {
        let mut server = mockito::Server::new_async().await;
        let missing = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;
        let limited = server
            .mock("GET", "/limited")
            .with_status(429)
            .create_async()
            .await;
        let garbage = server
            .mock("GET", "/garbage")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let client = HttpClient::new().unwrap();
        let base = server.url();

        let result = fetch_json(client.get(&format!("{}/missing", base)), "test").await;
        assert!(matches!(result, Err(SourceError::NotFound(_))));

        let result = fetch_json(client.get(&format!("{}/limited", base)), "test").await;
        assert!(matches!(result, Err(SourceError::Unavailable(_))));

        let result = fetch_json(client.get(&format!("{}/garbage", base)), "test").await;
        assert!(matches!(result, Err(SourceError::Malformed(_))));

        missing.assert_async().await;
        limited.assert_async().await;
        garbage.assert_async().await;
    }

    #[test]
    fn test_encode_id() {
        assert_eq!(encode_id("10.1000/abc"), "10.1000/abc");
        assert_eq!(encode_id("DOI:10.1/a b"), "DOI:10.1/a%20b");
        assert_eq!(encode_id("10.1002/(SICI)1;2"), "10.1002/%28SICI%291%3B2");
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        let client = HttpClient::with_timeouts(Duration::from_secs(2), Duration::from_secs(1))
            .unwrap();
        let result = fetch_json(client.get("http://127.0.0.1:1/none"), "test").await;
        assert!(matches!(result, Err(SourceError::Unavailable(_))));
    }
}
