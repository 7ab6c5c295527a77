//! Error taxonomy shared by the transport, retry and client layers.
//!
//! Failures are tagged variants rather than distinguished at runtime:
//! connectivity failures, structured server errors and protocol violations
//! each have their own arm, so retry classification is an exhaustive match.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::constants::RETRY_AFTER_HEADER;
use super::traits::{Headers, ReadyState};

/// Malformed inbound data. Always fatal to the current connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The message is not valid JSON.
    #[error("message is not valid JSON: {0}")]
    InvalidJson(String),

    /// The message is valid JSON but not an array.
    #[error("message is expected to be an array, got: {0}")]
    NotAnArray(String),

    /// The message is an empty array.
    #[error("message is an empty array")]
    Empty,

    /// Element 0 is not a non-negative integer.
    #[error("invalid message type tag: {0}")]
    InvalidType(String),

    /// Element 0 is an integer that names no known message type.
    #[error("unknown message type: {0}")]
    UnknownType(u64),

    /// A subscription-scoped message carries no subscription id.
    #[error("{kind} message has no subscription id")]
    MissingSubscriptionId {
        /// Message type name.
        kind: &'static str,
    },

    /// The subscription id is not a non-negative integer.
    #[error("invalid subscription id: {0}")]
    InvalidSubscriptionId(String),

    /// The payload has the wrong number of elements.
    #[error("{kind} message has {actual} payload elements (expected {expected})")]
    Arity {
        /// Message type name.
        kind: &'static str,
        /// Required payload length.
        expected: usize,
        /// Received payload length.
        actual: usize,
    },

    /// A payload element has the wrong JSON type.
    #[error("invalid {field} in {kind} message")]
    InvalidField {
        /// Message type name.
        kind: &'static str,
        /// Offending field.
        field: &'static str,
    },

    /// A client-to-server message type arrived from the server.
    #[error("unexpected {0} message from server")]
    UnexpectedType(&'static str),

    /// The server referenced a subscription id the client never issued.
    #[error("received message for non existing subscription id: {0}")]
    UnknownSubscription(u64),
}

/// Socket boundary failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SocketError {
    /// `send` was called while the socket was not open.
    #[error("can't send in {0:?} state")]
    NotOpen(ReadyState),

    /// The underlying socket rejected the message.
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Structured failure returned by the server.
///
/// Carries enough structure (status, headers, body) for callers to tell
/// causes apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("server responded with status {status_code}")]
pub struct ErrorResponse {
    /// HTTP-like status code.
    pub status_code: u16,
    /// Response headers.
    pub headers: Headers,
    /// Response body.
    pub body: serde_json::Value,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(status_code: u16, headers: Headers, body: serde_json::Value) -> Self {
        Self {
            status_code,
            headers,
            body,
        }
    }

    /// Look up a header, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Server-supplied retry delay from the `Retry-After` header.
    ///
    /// Only whole seconds are understood; anything else is ignored.
    pub fn retry_after(&self) -> Option<Duration> {
        self.header(RETRY_AFTER_HEADER)
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    /// Check if the status is in the 5xx range.
    pub fn is_server_fault(&self) -> bool {
        (500..600).contains(&self.status_code)
    }
}

/// Top-level failure surfaced to subscription listeners and retry callers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlatformError {
    /// Connectivity failure (could not deliver, liveness check failed).
    #[error("network error: {0}")]
    Network(String),

    /// Structured server failure.
    #[error(transparent)]
    Server(#[from] ErrorResponse),

    /// Malformed or unexpected protocol traffic.
    #[error("protocol violation: {0}")]
    Protocol(#[from] FrameError),
}

impl PlatformError {
    /// Create a connectivity failure.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Check if this is a connectivity failure.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Status code of a server failure.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Server(response) => Some(response.status_code),
            _ => None,
        }
    }

    /// Server-supplied retry delay, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Server(response) => response.retry_after(),
            _ => None,
        }
    }
}
