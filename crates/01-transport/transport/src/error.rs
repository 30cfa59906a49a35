//! Error surface of the transport boundary.
//!
//! Broker implementations report routing and lifecycle failures through
//! [`TransportError`]. A closed channel carries the [`ShutdownSignal`] that
//! closed it so callers can tell a clean close from a hard failure.

use thiserror::Error;

use crate::shutdown::ShutdownSignal;

/// Convenience result alias for fallible transport operations.
pub type TransportResult<T, E = TransportError> = Result<T, E>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("channel is closed: {0}")]
    ChannelClosed(ShutdownSignal),

    #[error("no queue named '{0}'")]
    QueueNotFound(String),

    #[error("no exchange named '{0}'")]
    ExchangeNotFound(String),

    #[error("queue '{0}' is exclusive to another channel")]
    AccessRefused(String),

    #[error("queue '{0}' already has a consumer")]
    QueueBusy(String),

    #[error("unknown consumer tag '{0}'")]
    UnknownConsumer(String),

    #[error("failed to spawn delivery thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl TransportError {
    pub fn queue_not_found(queue: impl Into<String>) -> Self {
        TransportError::QueueNotFound(queue.into())
    }

    /// Returns the shutdown cause when the failure is a closed channel.
    pub fn shutdown_signal(&self) -> Option<&ShutdownSignal> {
        match self {
            TransportError::ChannelClosed(signal) => Some(signal),
            _ => None,
        }
    }
}
