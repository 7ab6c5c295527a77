//! Transport layer error types.

use thiserror::Error;

use super::frame::SubscriptionId;
use crate::core::{FrameError, SocketError};

/// Transport layer errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Malformed inbound frame.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Socket rejected an operation.
    #[error("socket error: {0}")]
    Socket(#[from] SocketError),

    /// No subscription with this id is registered.
    #[error("subscription {0} not found")]
    UnknownSubscription(SubscriptionId),
}

impl TransportError {
    /// Check if this error is fatal to the connection.
    ///
    /// Protocol violations tear the connection down; everything else is
    /// reported and ignored.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Frame(_))
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
