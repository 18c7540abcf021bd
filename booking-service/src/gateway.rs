use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use shared::InitializeRequest;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub secret_key: String,
    pub currency: String,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("gateway returned an unreadable body: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("could not build gateway client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Thin HTTP client for the remote payment API. Responses are handed back as
/// raw JSON; interpretation lives in `shared::GatewayEnvelope`.
#[derive(Clone)]
pub struct GatewayClient {
    http: Client,
    config: GatewayConfig,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(GatewayError::Client)?;
        Ok(Self { http, config })
    }

    pub fn currency(&self) -> &str {
        &self.config.currency
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    pub async fn initialize(&self, request: &InitializeRequest) -> Result<Value, GatewayError> {
        debug!(tx_ref = %request.tx_ref, "Initializing gateway transaction");
        let response = self
            .http
            .post(self.url("transaction/initialize"))
            .bearer_auth(&self.config.secret_key)
            .json(request)
            .send()
            .await
            .map_err(GatewayError::Transport)?;
        response.json::<Value>().await.map_err(GatewayError::Decode)
    }

    pub async fn verify(&self, transaction_id: &str) -> Result<Value, GatewayError> {
        debug!(transaction_id, "Verifying gateway transaction");
        let response = self
            .http
            .get(self.url(&format!("transaction/verify/{}", transaction_id)))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(GatewayError::Transport)?;
        response.json::<Value>().await.map_err(GatewayError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(base_url: String) -> GatewayClient {
        GatewayClient::new(GatewayConfig {
            base_url,
            secret_key: "sk_test_123".to_string(),
            currency: "USD".to_string(),
            timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    fn request() -> InitializeRequest {
        InitializeRequest {
            amount: "400.00".to_string(),
            currency: "USD".to_string(),
            email: "guest@example.com".to_string(),
            first_name: "Abebe".to_string(),
            last_name: "Kebede".to_string(),
            tx_ref: "booking_1_1717200000".to_string(),
            callback_url: "http://localhost:3001/api/bookings/1/verify_payment".to_string(),
            return_url: "http://localhost:3001/api/bookings/1/verify_payment".to_string(),
        }
    }

    #[tokio::test]
    async fn initialize_posts_json_with_bearer_auth() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/transaction/initialize")
                .header("Authorization", "Bearer sk_test_123")
                .json_body(serde_json::to_value(request()).unwrap());
            then.status(200).json_body(json!({
                "status": "success",
                "data": {"checkout_url": "https://checkout.example/abc"}
            }));
        });

        let raw = client(server.base_url()).initialize(&request()).await.unwrap();

        mock.assert();
        assert_eq!(raw["data"]["checkout_url"], "https://checkout.example/abc");
    }

    #[tokio::test]
    async fn error_statuses_still_return_the_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/transaction/initialize");
            then.status(400)
                .json_body(json!({"status": "failed", "message": "Invalid currency"}));
        });

        let raw = client(server.base_url()).initialize(&request()).await.unwrap();
        assert_eq!(raw["message"], "Invalid currency");
    }

    #[tokio::test]
    async fn verify_hits_transaction_path() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/transaction/verify/tx-42")
                .header("Authorization", "Bearer sk_test_123");
            then.status(200)
                .json_body(json!({"data": {"status": "success"}}));
        });

        let raw = client(format!("{}/", server.base_url()))
            .verify("tx-42")
            .await
            .unwrap();

        mock.assert();
        assert_eq!(raw["data"]["status"], "success");
    }

    #[tokio::test]
    async fn html_body_is_a_decode_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/transaction/verify/tx-1");
            then.status(502).body("<html>bad gateway</html>");
        });

        let err = client(server.base_url()).verify("tx-1").await.unwrap_err();
        assert!(matches!(err, GatewayError::Decode(_)));
    }

    #[tokio::test]
    async fn unreachable_gateway_is_a_transport_error() {
        let err = client("http://127.0.0.1:9".to_string())
            .verify("tx-1")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
    }
}
