use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("mail API rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError>;
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: String,
    pub token: String,
    pub from: String,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<&'a str>,
}

/// Delivers mail through a JSON HTTP API authenticated with a bearer token.
pub struct HttpMailTransport {
    http: Client,
    config: MailConfig,
}

impl HttpMailTransport {
    pub fn new(config: MailConfig) -> Result<Self, MailError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl MailTransport for HttpMailTransport {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        let body = SendRequest {
            from: &self.config.from,
            to: [message.to.as_str()],
            subject: &message.subject,
            text: &message.text,
            html: message.html.as_deref(),
        };

        let response = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(&self.config.token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn transport(api_url: String) -> HttpMailTransport {
        HttpMailTransport::new(MailConfig {
            api_url,
            token: "mail-token".to_string(),
            from: "noreply@stay.example".to_string(),
            timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    fn message(html: Option<&str>) -> MailMessage {
        MailMessage {
            to: "guest@example.com".to_string(),
            subject: "Booking Confirmation".to_string(),
            text: "Dear Abebe".to_string(),
            html: html.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn posts_message_with_bearer_token() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/send")
                .header("Authorization", "Bearer mail-token")
                .json_body(json!({
                    "from": "noreply@stay.example",
                    "to": ["guest@example.com"],
                    "subject": "Booking Confirmation",
                    "text": "Dear Abebe",
                    "html": "<p>Dear Abebe</p>"
                }));
            then.status(202);
        });

        transport(server.url("/send"))
            .send(&message(Some("<p>Dear Abebe</p>")))
            .await
            .unwrap();
        mock.assert();
    }

    #[tokio::test]
    async fn html_is_omitted_when_absent() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/send").json_body(json!({
                "from": "noreply@stay.example",
                "to": ["guest@example.com"],
                "subject": "Booking Confirmation",
                "text": "Dear Abebe"
            }));
            then.status(200);
        });

        transport(server.url("/send")).send(&message(None)).await.unwrap();
        mock.assert();
    }

    #[tokio::test]
    async fn error_status_is_a_rejection() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/send");
            then.status(503).body("overloaded");
        });

        let err = transport(server.url("/send"))
            .send(&message(None))
            .await
            .unwrap_err();
        match err {
            MailError::Rejected { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn unreachable_api_is_a_transport_error() {
        let err = transport("http://127.0.0.1:9/send".to_string())
            .send(&message(None))
            .await
            .unwrap_err();
        assert!(matches!(err, MailError::Transport(_)));
    }
}
