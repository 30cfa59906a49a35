use std::time::Duration;

use thiserror::Error;
use transport::{ShutdownSignal, TransportError};

pub type RpcResult<T> = Result<T, RpcError>;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("rpc client is not open")]
    NotOpen,

    #[error("rpc client has been closed")]
    Closed,

    #[error("rpc client is already open")]
    AlreadyOpen,

    #[error("no reply to call {correlation_id} within {waited:?}")]
    Timeout {
        correlation_id: String,
        waited: Duration,
    },

    /// The remote side rejected the call itself.
    #[error("remote rejected the call: {}", String::from_utf8_lossy(.payload))]
    RemoteCall { payload: Vec<u8> },

    /// The remote side ran the call and reported a service-level failure.
    #[error("remote service failure: {}", String::from_utf8_lossy(.payload))]
    RemoteService { payload: Vec<u8> },

    #[error("rpc call returned unexpected exception: {header}:{}", String::from_utf8_lossy(.payload))]
    UnexpectedException { header: String, payload: Vec<u8> },

    #[error("reply channel shut down")]
    TransportShutdown {
        #[source]
        signal: ShutdownSignal,
    },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("timeout must be NO_TIMEOUT (-1) or non-negative, got {0}")]
    InvalidTimeout(i64),
}

impl RpcError {
    pub fn shutdown(signal: ShutdownSignal) -> Self {
        RpcError::TransportShutdown { signal }
    }

    /// The shutdown cause, when the call failed because the transport died.
    pub fn shutdown_signal(&self) -> Option<&ShutdownSignal> {
        match self {
            RpcError::TransportShutdown { signal } => Some(signal),
            RpcError::Transport(err) => err.shutdown_signal(),
            _ => None,
        }
    }

    /// Payload reported by the remote side for remote failures.
    pub fn remote_payload(&self) -> Option<&[u8]> {
        match self {
            RpcError::RemoteCall { payload }
            | RpcError::RemoteService { payload }
            | RpcError::UnexpectedException { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// Timeouts are the only failures worth retrying unchanged.
    pub fn is_timeout(&self) -> bool {
        matches!(self, RpcError::Timeout { .. })
    }
}
