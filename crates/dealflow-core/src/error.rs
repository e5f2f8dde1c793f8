use std::time::Duration;
use thiserror::Error;

/// Dealflow core errors.
///
/// The core only classifies failures; mapping them to wire status codes is the
/// job of whatever surface embeds it.
#[derive(Debug, Error)]
pub enum DealflowError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Dispatch via '{provider}' failed: {message}")]
    DispatchFailed { provider: String, message: String },

    #[error("Transport '{provider}' unavailable: {message}")]
    TransportUnavailable { provider: String, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DealflowError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Classify a transport failure for a single send.
    ///
    /// `TransportUnavailable` is the special case of `DispatchFailed` where the
    /// transport itself could not be reached.
    pub fn from_transport(provider: &str, error: &TransportError) -> Self {
        match error {
            TransportError::Unavailable(message) => Self::TransportUnavailable {
                provider: provider.to_string(),
                message: message.clone(),
            },
            other => Self::DispatchFailed {
                provider: provider.to_string(),
                message: other.message(),
            },
        }
    }

    /// True for both dispatch failure flavours.
    pub fn is_dispatch_failure(&self) -> bool {
        matches!(
            self,
            Self::DispatchFailed { .. } | Self::TransportUnavailable { .. }
        )
    }
}

/// Failure reported by a message transport for one send.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("{0}")]
    Rejected(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("send timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl TransportError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Human-readable text recorded in the audit log.
    pub fn message(&self) -> String {
        self.to_string()
    }
}
