//! Channel and consumer traits implemented by broker backends.

use std::fmt;
use std::sync::Arc;

use crate::error::TransportResult;
use crate::properties::BasicProperties;
use crate::shutdown::ShutdownSignal;

/// Broker-assigned queue name.
pub type QueueName = String;

/// Handle identifying one subscription on a channel.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConsumerTag(String);

impl ConsumerTag {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ConsumerTag {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ConsumerTag {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ConsumerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Routing information attached to a delivered message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
}

/// Callbacks invoked by the transport on its own delivery thread.
pub trait Consumer: Send + Sync {
    /// Called once per message routed to the subscribed queue.
    fn handle_delivery(
        &self,
        consumer_tag: &ConsumerTag,
        envelope: &Envelope,
        properties: &BasicProperties,
        body: &[u8],
    );

    /// Called once when the channel or connection carrying the subscription dies.
    fn handle_shutdown_signal(&self, consumer_tag: &ConsumerTag, signal: &ShutdownSignal);

    /// Called once after the subscription has been cancelled. Defaults to a no-op.
    fn handle_cancel_ok(&self, _consumer_tag: &ConsumerTag) {}
}

/// Fire-and-forget publish/subscribe primitives.
pub trait Channel: Send + Sync {
    /// Declares a server-named queue that is exclusive to this channel and
    /// deleted once its consumer goes away.
    fn queue_declare_exclusive(&self) -> TransportResult<QueueName>;

    /// Subscribes `consumer` to `queue`. With `auto_ack` the broker treats
    /// every message as acknowledged once it has been handed to the consumer.
    fn basic_consume(
        &self,
        queue: &str,
        auto_ack: bool,
        consumer: Arc<dyn Consumer>,
    ) -> TransportResult<ConsumerTag>;

    /// Deletes `queue`, cancelling its consumer if it has one.
    fn queue_delete(&self, queue: &str) -> TransportResult<()>;

    /// Cancels a subscription created by [`Channel::basic_consume`].
    fn basic_cancel(&self, consumer_tag: &ConsumerTag) -> TransportResult<()>;

    /// Publishes `body` to `exchange` with `routing_key`. Unroutable messages are dropped.
    fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        properties: &BasicProperties,
        body: &[u8],
    ) -> TransportResult<()>;
}
