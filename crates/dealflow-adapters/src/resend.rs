use async_trait::async_trait;
use dealflow_core::error::TransportError;
use dealflow_core::transport::{MessageTransport, OutboundMessage, TransportReceipt};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const FALLBACK_FROM: &str = "onboarding@resend.dev";

/// Settings for the Resend HTTP API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResendConfig {
    pub api_key: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Verified sender that replaces the caller's address in `from`.
    #[serde(default)]
    pub default_from: Option<String>,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_base_url() -> String {
    "https://api.resend.com".to_string()
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

impl ResendConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: default_base_url(),
            default_from: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Email delivery through `POST {base_url}/emails`.
#[derive(Debug, Clone)]
pub struct ResendTransport {
    client: Client,
    config: ResendConfig,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

impl ResendTransport {
    pub fn new(config: ResendConfig) -> Result<Self, TransportError> {
        if config.api_key.trim().is_empty() {
            return Err(TransportError::unavailable("resend api key is not configured"));
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .map_err(|e| TransportError::unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn payload(&self, message: &OutboundMessage) -> Value {
        let from = self
            .config
            .default_from
            .as_deref()
            .filter(|from| !from.trim().is_empty())
            .or_else(|| Some(message.from.as_str()).filter(|from| !from.trim().is_empty()))
            .unwrap_or(FALLBACK_FROM);
        let reply_to = if message.reply_to.trim().is_empty() {
            &message.from
        } else {
            &message.reply_to
        };

        json!({
            "from": from,
            "to": [message.to],
            "subject": message.subject,
            "html": message.html,
            "reply_to": reply_to,
        })
    }
}

#[async_trait]
impl MessageTransport for ResendTransport {
    fn provider(&self) -> &'static str {
        "resend"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<TransportReceipt, TransportError> {
        let url = format!("{}/emails", self.config.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&self.payload(message))
            .send()
            .await
            .map_err(|e| TransportError::unavailable(format!("resend request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body: SendResponse = response
            .json()
            .await
            .map_err(|e| TransportError::rejected(format!("invalid resend response: {e}")))?;

        debug!(message_id = %body.id, "Resend accepted message");
        Ok(TransportReceipt::new(body.id))
    }
}

/// 5xx and 429 mean the provider cannot take traffic right now; anything else
/// is a rejection of this particular message.
fn classify_status(status: StatusCode, body: &str) -> TransportError {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| truncate(body, 320));
    let message = format!("resend error {status}: {detail}");

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        TransportError::unavailable(message)
    } else {
        TransportError::rejected(message)
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        value.to_string()
    } else {
        let mut out: String = value.chars().take(max_chars).collect();
        out.push_str("...");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(from: &str) -> OutboundMessage {
        OutboundMessage {
            to: "ada@example.com".to_string(),
            subject: "Hello".to_string(),
            html: "<p>hi</p>".to_string(),
            from: from.to_string(),
            reply_to: from.to_string(),
        }
    }

    #[test]
    fn verified_sender_overrides_from() {
        let mut config = ResendConfig::new("re_test");
        config.default_from = Some("crm@verified.dev".to_string());
        let transport = ResendTransport::new(config).unwrap();

        let payload = transport.payload(&message("rep@example.com"));
        assert_eq!(payload["from"], "crm@verified.dev");
        assert_eq!(payload["reply_to"], "rep@example.com");
        assert_eq!(payload["to"][0], "ada@example.com");
    }

    #[test]
    fn falls_back_to_sandbox_sender() {
        let transport = ResendTransport::new(ResendConfig::new("re_test")).unwrap();
        assert_eq!(transport.payload(&message("rep@example.com"))["from"], "rep@example.com");
        assert_eq!(transport.payload(&message(""))["from"], FALLBACK_FROM);
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let err = ResendTransport::new(ResendConfig::new("  ")).unwrap_err();
        assert!(matches!(err, TransportError::Unavailable(_)));
    }

    #[test]
    fn status_classification() {
        let err = classify_status(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"statusCode":422,"message":"Invalid `to` field"}"#,
        );
        assert_eq!(
            err,
            TransportError::rejected("resend error 422 Unprocessable Entity: Invalid `to` field")
        );

        let err = classify_status(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(err, TransportError::Unavailable(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        let mut config = ResendConfig::new("re_test");
        config.base_url = "http://127.0.0.1:9".to_string();
        config.request_timeout_ms = 500;
        let transport = ResendTransport::new(config).unwrap();

        let err = transport.send(&message("rep@example.com")).await.unwrap_err();
        assert!(matches!(err, TransportError::Unavailable(_)));
    }
}
