//! Pluggable adapters for Dealflow: in-memory collaborators and message
//! transports.

#![deny(unsafe_code)]

mod memory;
mod resend;

pub use memory::{InMemoryDealRepository, InMemoryDirectory};
pub use resend::{ResendConfig, ResendTransport};

use async_trait::async_trait;
use dealflow_core::error::TransportError;
use dealflow_core::transport::{MessageTransport, OutboundMessage, TransportReceipt};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Accepts every message and remembers it.
#[derive(Debug, Default)]
pub struct MockTransport {
    sent: Mutex<Vec<OutboundMessage>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages accepted so far, in send order.
    pub async fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl MessageTransport for MockTransport {
    fn provider(&self) -> &'static str {
        "mock"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<TransportReceipt, TransportError> {
        let short_id: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        self.sent.lock().await.push(message.clone());
        Ok(TransportReceipt::new(format!("mock-{short_id}")))
    }
}

/// Deterministic failing transport for chaos testing.
#[derive(Debug, Clone)]
pub struct AlwaysFailTransport {
    provider: &'static str,
    error: TransportError,
}

impl AlwaysFailTransport {
    pub fn new(provider: &'static str, reason: impl Into<String>) -> Self {
        Self {
            provider,
            error: TransportError::rejected(reason),
        }
    }

    /// Fails as if the provider could not be reached at all.
    pub fn unreachable(provider: &'static str, reason: impl Into<String>) -> Self {
        Self {
            provider,
            error: TransportError::unavailable(reason),
        }
    }
}

#[async_trait]
impl MessageTransport for AlwaysFailTransport {
    fn provider(&self) -> &'static str {
        self.provider
    }

    async fn send(&self, _message: &OutboundMessage) -> Result<TransportReceipt, TransportError> {
        Err(self.error.clone())
    }
}

/// Succeeds unless the recipient has a scripted failure or stall.
///
/// Addresses are matched case-insensitively.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    failures: HashMap<String, TransportError>,
    stalls: HashMap<String, Duration>,
    attempts: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(mut self, address: &str, reason: impl Into<String>) -> Self {
        self.failures
            .insert(address.to_ascii_lowercase(), TransportError::rejected(reason));
        self
    }

    pub fn fail_with(mut self, address: &str, error: TransportError) -> Self {
        self.failures.insert(address.to_ascii_lowercase(), error);
        self
    }

    /// Delay the send to `address` by `delay` before answering.
    pub fn stall_for(mut self, address: &str, delay: Duration) -> Self {
        self.stalls.insert(address.to_ascii_lowercase(), delay);
        self
    }

    /// Recipients of every attempt, in arrival order.
    pub async fn attempts(&self) -> Vec<String> {
        self.attempts.lock().await.clone()
    }
}

#[async_trait]
impl MessageTransport for ScriptedTransport {
    fn provider(&self) -> &'static str {
        "scripted"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<TransportReceipt, TransportError> {
        let address = message.to.to_ascii_lowercase();
        self.attempts.lock().await.push(address.clone());

        if let Some(delay) = self.stalls.get(&address) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(error) = self.failures.get(&address) {
            return Err(error.clone());
        }
        Ok(TransportReceipt::new(format!("scripted-{address}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(to: &str) -> OutboundMessage {
        OutboundMessage {
            to: to.to_string(),
            subject: "Hello".to_string(),
            html: "<p>hi</p>".to_string(),
            from: "rep@example.com".to_string(),
            reply_to: "rep@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn mock_transport_records_and_issues_ids() {
        let transport = MockTransport::new();
        let receipt = transport.send(&message("ada@example.com")).await.unwrap();
        assert!(receipt.id.starts_with("mock-"));
        assert_eq!(receipt.id.len(), "mock-".len() + 8);
        assert_eq!(transport.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn always_fail_transport_fails() {
        let transport = AlwaysFailTransport::new("mock", "mailbox full");
        let err = transport.send(&message("ada@example.com")).await.unwrap_err();
        assert_eq!(err, TransportError::rejected("mailbox full"));

        let transport = AlwaysFailTransport::unreachable("resend", "connection refused");
        let err = transport.send(&message("ada@example.com")).await.unwrap_err();
        assert!(matches!(err, TransportError::Unavailable(_)));
    }

    #[tokio::test]
    async fn scripted_transport_fails_by_address() {
        let transport = ScriptedTransport::new().fail_for("Bad@Example", "invalid address");
        assert!(transport.send(&message("ada@example.com")).await.is_ok());
        let err = transport.send(&message("bad@example")).await.unwrap_err();
        assert_eq!(err.message(), "invalid address");
        assert_eq!(
            transport.attempts().await,
            vec!["ada@example.com".to_string(), "bad@example".to_string()]
        );
    }
}
