use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{RpcError, RpcResult};

/// Millisecond sentinel meaning "wait forever".
pub const NO_TIMEOUT: i64 = -1;

/// How long a caller waits for a reply.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeout {
    #[default]
    Infinite,
    After(Duration),
}

impl Timeout {
    /// Accepts [`NO_TIMEOUT`] or a non-negative number of milliseconds.
    pub fn from_millis(millis: i64) -> RpcResult<Self> {
        match millis {
            NO_TIMEOUT => Ok(Timeout::Infinite),
            m if m >= 0 => Ok(Timeout::After(Duration::from_millis(m as u64))),
            other => Err(RpcError::InvalidTimeout(other)),
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Timeout::Infinite => None,
            Timeout::After(duration) => Some(*duration),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Timeout::After(duration)
    }
}

/// Per-client settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcClientConfig {
    /// Applied uniformly to every call made through the client.
    pub timeout: Timeout,
}

impl RpcClientConfig {
    pub fn with_timeout(timeout: impl Into<Timeout>) -> Self {
        Self {
            timeout: timeout.into(),
        }
    }
}
