use std::fmt;

use crate::channel::ConsumerTag;

/// What was shut down.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShutdownReference {
    /// A single channel, identified by its number on the connection.
    Channel(u16),
    /// The whole connection and every channel on it.
    Connection,
    /// A subscription cancelled while it still had work outstanding.
    Consumer(ConsumerTag),
}

impl fmt::Display for ShutdownReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReference::Channel(number) => write!(f, "channel {number}"),
            ShutdownReference::Connection => f.write_str("connection"),
            ShutdownReference::Consumer(tag) => write!(f, "consumer {tag}"),
        }
    }
}

/// Cause delivered to consumers when their channel or connection terminates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShutdownSignal {
    hard_error: bool,
    initiated_by_application: bool,
    reason: String,
    reference: ShutdownReference,
}

impl ShutdownSignal {
    pub fn new(
        hard_error: bool,
        initiated_by_application: bool,
        reason: impl Into<String>,
        reference: ShutdownReference,
    ) -> Self {
        Self {
            hard_error,
            initiated_by_application,
            reason: reason.into(),
            reference,
        }
    }

    /// Clean, application-initiated close of a subscription.
    pub fn consumer_cancelled(tag: &ConsumerTag) -> Self {
        Self::new(
            false,
            true,
            "consumer cancelled",
            ShutdownReference::Consumer(tag.clone()),
        )
    }

    /// True when the shutdown was caused by a connection-level error.
    pub fn is_hard_error(&self) -> bool {
        self.hard_error
    }

    /// True when the local application asked for the shutdown.
    pub fn is_initiated_by_application(&self) -> bool {
        self.initiated_by_application
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn reference(&self) -> &ShutdownReference {
        &self.reference
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = if self.hard_error { "hard error" } else { "clean" };
        let origin = if self.initiated_by_application {
            "application"
        } else {
            "peer"
        };
        write!(
            f,
            "{severity} shutdown of {} initiated by {origin}: {}",
            self.reference, self.reason
        )
    }
}

impl std::error::Error for ShutdownSignal {}
