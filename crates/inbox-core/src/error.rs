use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad error category used for user-facing notices.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClientErrorCategory {
    /// Invalid input or client configuration.
    Config,
    /// Transient network or transport failure (rejected, timed out, 5xx).
    Network,
    /// Backend answered with a structured application error.
    Application,
    /// Referenced conversation, message or media does not exist.
    NotFound,
    /// Serialization/deserialization failure.
    Serialization,
    /// Client bug or invariant break.
    Internal,
}

/// Stable client error payload carried across the command/event boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct ClientError {
    /// High-level error category.
    pub category: ClientErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl ClientError {
    /// Construct a new client error.
    pub fn new(
        category: ClientErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Error reported by the backend in its `{status: "error"}` envelope.
    pub fn application(message: impl Into<String>) -> Self {
        Self::new(ClientErrorCategory::Application, "api_error", message)
    }

    /// Error for a non-2xx HTTP response.
    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        Self::new(classify_http_status(status), "http_status", message)
    }

    /// Transport-level failure before any response was received.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ClientErrorCategory::Network, "transport_error", message)
    }

    /// Payload could not be encoded or decoded.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ClientErrorCategory::Serialization, "serde_error", message)
    }

    /// Whether the failure is worth re-triggering by the operator.
    pub fn is_transient(&self) -> bool {
        matches!(self.category, ClientErrorCategory::Network)
    }
}

/// Map HTTP status codes to client error categories.
pub fn classify_http_status(status: u16) -> ClientErrorCategory {
    match status {
        404 => ClientErrorCategory::NotFound,
        400..=499 => ClientErrorCategory::Application,
        500..=599 => ClientErrorCategory::Network,
        _ => ClientErrorCategory::Internal,
    }
}
