use crate::config::SonarQubeConfig;
use crate::errors::{GatewayError, Result};
use std::error::Error as _;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use url::Url;

/// HTTP client for the SonarQube web API.
///
/// The timeout covers connecting, sending the request and receiving the
/// response headers. The body is streamed afterwards without a deadline.
#[derive(Clone)]
pub struct SonarClient {
    client: reqwest::Client,
    token: Option<String>,
    timeout: Duration,
}

impl SonarClient {
    pub fn new(config: &SonarQubeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout())
            .build()
            .map_err(|e| GatewayError::InternalError(format!("Failed to build client: {e}")))?;

        Ok(Self {
            client,
            token: config.token().map(str::to_string),
            timeout: config.timeout(),
        })
    }

    /// Issues `GET url`, with basic auth when a token is configured.
    pub async fn get(&self, url: Url) -> Result<reqwest::Response> {
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.basic_auth(token, Some(""));
        }

        let started = Instant::now();
        let response = timeout(self.timeout, request.send())
            .await
            // Outer error: deadline elapsed before response headers arrived
            .map_err(|_| GatewayError::UpstreamTimeout(self.timeout.as_secs()))?
            // Inner error: DNS, connection refused, TLS, protocol errors
            .map_err(|e| GatewayError::UpstreamRequestFailed(error_chain(&e)))?;

        tracing::debug!(
            status = %response.status(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Upstream responded"
        );
        Ok(response)
    }
}

/// Joins an error with its sources, so the caller sees the root cause
/// ("connection refused") and not only reqwest's summary.
fn error_chain(e: &reqwest::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn config(timeout_secs: u64) -> SonarQubeConfig {
        SonarQubeConfig {
            timeout_secs,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = SonarClient::new(&config(5)).unwrap();
        let url = Url::parse(&format!("http://127.0.0.1:{port}/api")).unwrap();

        let err = client.get(url).await.unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamRequestFailed(_)));
        assert!(!err.to_string().is_empty());
    }

    #[tokio::test]
    async fn test_timeout() {
        // Accepts connections but never answers
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                held.push(stream);
            }
        });

        let client = SonarClient::new(&config(1)).unwrap();
        let url = Url::parse(&format!("http://127.0.0.1:{port}/api")).unwrap();

        let started = Instant::now();
        let err = client.get(url).await.unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamTimeout(1)));
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
