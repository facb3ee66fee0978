//! HTTP client for the controller and scheduler health endpoints

use anyhow::{Context, Result};
use meshsched_lib::health::{HealthResponse, ReadinessResponse};
use reqwest::Client;
use serde::de::DeserializeOwned;
use url::Url;

/// Client for a component's `/healthz` and `/readyz`
pub struct StatusClient {
    client: Client,
    base_url: Url,
}

impl StatusClient {
    /// Create a new status client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid status URL")?;

        Ok(Self { client, base_url })
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get("healthz").await
    }

    pub async fn readiness(&self) -> Result<ReadinessResponse> {
        self.get("readyz").await
    }

    /// GET `path` and decode the JSON body.
    ///
    /// Health endpoints answer 503 with a JSON body when unhealthy or not
    /// ready, so that status is decoded rather than treated as an error.
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if !status.is_success() && status != reqwest::StatusCode::SERVICE_UNAVAILABLE {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshsched_lib::health::ComponentStatus;

    #[tokio::test]
    async fn test_health_parses_degraded_report() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/healthz")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":"degraded","components":{"mesh":{"status":"degraded","message":"mesh status unavailable","last_check_timestamp":1700000000}}}"#,
            )
            .create_async()
            .await;

        let client = StatusClient::new(&server.url()).unwrap();
        let health = client.health().await.unwrap();

        mock.assert_async().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(
            health.components["mesh"].message.as_deref(),
            Some("mesh status unavailable")
        );
    }

    #[tokio::test]
    async fn test_readiness_accepts_503_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/readyz")
            .with_status(503)
            .with_body(r#"{"ready":false,"reason":"Not yet initialized"}"#)
            .create_async()
            .await;

        let client = StatusClient::new(&server.url()).unwrap();
        let readiness = client.readiness().await.unwrap();

        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("Not yet initialized"));
    }

    #[tokio::test]
    async fn test_other_errors_are_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/healthz")
            .with_status(404)
            .with_body("not found")
            .create_async()
            .await;

        let client = StatusClient::new(&server.url()).unwrap();
        let err = client.health().await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(StatusClient::new("not a url").is_err());
    }
}
