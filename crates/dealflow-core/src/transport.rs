use crate::error::TransportError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One message addressed to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub from: String,
    pub reply_to: String,
}

/// Proof that the transport accepted a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportReceipt {
    /// The provider's own message id.
    pub id: String,
    pub accepted_at: DateTime<Utc>,
}

impl TransportReceipt {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            accepted_at: Utc::now(),
        }
    }
}

/// Pluggable delivery backend.
///
/// The core is transport-agnostic; `provider` is recorded on each audit entry
/// as metadata only.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    fn provider(&self) -> &'static str;

    async fn send(&self, message: &OutboundMessage) -> Result<TransportReceipt, TransportError>;
}
