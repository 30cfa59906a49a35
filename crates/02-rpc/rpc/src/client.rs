//! Blocking RPC client: one private reply queue, many concurrent calls.
//!
//! The client moves through `Unopened -> Open -> Closed`; `Closed` is
//! terminal. The state lock covers the open gate, correlation id allocation,
//! slot registration and the publish itself, so a call either registers and
//! publishes against an open client or fails without side effects. Waiting
//! for the reply happens outside the lock, so callers never wait on each other.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use transport::{BasicProperties, Channel, ConsumerTag, QueueName, TransportError};

use crate::config::{RpcClientConfig, Timeout};
use crate::envelope::RpcReturn;
use crate::error::{RpcError, RpcResult};
use crate::listener::ReplyConsumer;
use crate::registry::{ContinuationMap, ReplySlot};
use crate::slot::{Slot, SlotTimeout};

enum Lifecycle {
    Unopened,
    Open {
        reply_queue: QueueName,
        consumer_tag: ConsumerTag,
    },
    Closed {
        reply_queue: QueueName,
    },
}

struct ClientState {
    lifecycle: Lifecycle,
    /// Most recently used correlation id.
    correlation_id: u64,
}

pub struct RpcClient<C: Channel> {
    channel: C,
    timeout: Timeout,
    state: Mutex<ClientState>,
    continuations: Arc<ContinuationMap>,
}

impl<C: Channel> RpcClient<C> {
    /// Creates a client that waits forever for replies.
    pub fn new(channel: C) -> Self {
        Self::with_config(channel, RpcClientConfig::default())
    }

    /// Creates a client from a millisecond timeout, `NO_TIMEOUT` meaning none.
    pub fn with_timeout_millis(channel: C, millis: i64) -> RpcResult<Self> {
        Ok(Self::with_timeout(channel, Timeout::from_millis(millis)?))
    }

    pub fn with_timeout(channel: C, timeout: impl Into<Timeout>) -> Self {
        Self::with_config(channel, RpcClientConfig::with_timeout(timeout))
    }

    pub fn with_config(channel: C, config: RpcClientConfig) -> Self {
        Self {
            channel,
            timeout: config.timeout,
            state: Mutex::new(ClientState {
                lifecycle: Lifecycle::Unopened,
                correlation_id: 0,
            }),
            continuations: Arc::new(ContinuationMap::new()),
        }
    }

    pub fn timeout(&self) -> Timeout {
        self.timeout
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Declares the reply queue and subscribes to it.
    ///
    /// Fails with [`RpcError::Closed`] after [`close`](Self::close) and with
    /// [`RpcError::AlreadyOpen`] when the client is open already.
    pub fn open(&self) -> RpcResult<()> {
        let mut state = self.state.lock();
        match state.lifecycle {
            Lifecycle::Unopened => {}
            Lifecycle::Open { .. } => return Err(RpcError::AlreadyOpen),
            Lifecycle::Closed { .. } => return Err(RpcError::Closed),
        }

        let reply_queue = self.channel.queue_declare_exclusive()?;
        let consumer = Arc::new(ReplyConsumer::new(Arc::clone(&self.continuations)));
        let consumer_tag = match self.channel.basic_consume(&reply_queue, true, consumer) {
            Ok(tag) => tag,
            Err(err) => {
                if let Err(cleanup) = self.channel.queue_delete(&reply_queue) {
                    warn!(reply_queue = %reply_queue, "failed to delete unused reply queue: {cleanup}");
                }
                return Err(err.into());
            }
        };
        debug!(reply_queue = %reply_queue, consumer_tag = %consumer_tag, "rpc client open");

        state.lifecycle = Lifecycle::Open {
            reply_queue,
            consumer_tag,
        };
        Ok(())
    }

    /// Cancels the reply subscription. Idempotent; a closed client never reopens.
    ///
    /// Calls still waiting when the subscription goes away fail with
    /// [`RpcError::TransportShutdown`].
    pub fn close(&self) -> RpcResult<()> {
        let mut state = self.state.lock();
        let Lifecycle::Open {
            reply_queue,
            consumer_tag,
        } = &state.lifecycle
        else {
            return Ok(());
        };

        match self.channel.basic_cancel(consumer_tag) {
            Ok(()) => {}
            // The subscription died with the channel.
            Err(TransportError::ChannelClosed(_)) => {}
            Err(err) => return Err(err.into()),
        }
        debug!(reply_queue = %reply_queue, consumer_tag = %consumer_tag, "rpc client closed");

        let reply_queue = reply_queue.clone();
        state.lifecycle = Lifecycle::Closed { reply_queue };
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state.lock().lifecycle, Lifecycle::Open { .. })
    }

    /// Name of the reply queue, or `None` if the client was never opened.
    pub fn reply_queue(&self) -> Option<QueueName> {
        match &self.state.lock().lifecycle {
            Lifecycle::Unopened => None,
            Lifecycle::Open { reply_queue, .. } | Lifecycle::Closed { reply_queue } => {
                Some(reply_queue.clone())
            }
        }
    }

    /// Number of calls currently waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        self.continuations.len()
    }

    /// Publishes `body` to `exchange`/`routing_key` and blocks for the reply.
    pub fn call(&self, exchange: &str, routing_key: &str, body: &[u8]) -> RpcResult<Vec<u8>> {
        self.call_with_properties(exchange, routing_key, &BasicProperties::default(), body)
    }

    /// Like [`call`](Self::call), publishing with a copy of `properties`.
    ///
    /// The copy's correlation id and reply-to are always replaced by the
    /// client's own; every other field is sent as given.
    pub fn call_with_properties(
        &self,
        exchange: &str,
        routing_key: &str,
        properties: &BasicProperties,
        body: &[u8],
    ) -> RpcResult<Vec<u8>> {
        let (correlation_id, slot) = self.publish_request(exchange, routing_key, properties, body)?;
        await_reply(&self.continuations, correlation_id, &slot, self.timeout)?.into_result()
    }

    fn publish_request(
        &self,
        exchange: &str,
        routing_key: &str,
        properties: &BasicProperties,
        body: &[u8],
    ) -> RpcResult<(String, ReplySlot)> {
        let mut state = self.state.lock();
        let reply_queue = match &state.lifecycle {
            Lifecycle::Open { reply_queue, .. } => reply_queue.clone(),
            Lifecycle::Unopened | Lifecycle::Closed { .. } => return Err(RpcError::NotOpen),
        };

        state.correlation_id += 1;
        let correlation_id = state.correlation_id.to_string();
        let slot: ReplySlot = Arc::new(Slot::new());
        self.continuations
            .insert(correlation_id.clone(), Arc::clone(&slot))
            .map_err(RpcError::shutdown)?;

        let properties = properties
            .clone()
            .with_correlation_id(correlation_id.as_str())
            .with_reply_to(reply_queue);
        if let Err(err) = self
            .channel
            .basic_publish(exchange, routing_key, &properties, body)
        {
            self.continuations.take(&correlation_id);
            return Err(match err {
                TransportError::ChannelClosed(signal) => RpcError::shutdown(signal),
                other => other.into(),
            });
        }
        trace!(exchange, routing_key, correlation_id = %correlation_id, "rpc request published");

        Ok((correlation_id, slot))
    }
}

/// Waits for `slot` and, on timeout, withdraws it from `continuations`.
fn await_reply(
    continuations: &ContinuationMap,
    correlation_id: String,
    slot: &ReplySlot,
    timeout: Timeout,
) -> RpcResult<RpcReturn> {
    match slot.get(timeout) {
        Ok(reply) => Ok(reply),
        Err(SlotTimeout { waited }) => match continuations.take(&correlation_id) {
            Some(_) => {
                debug!(correlation_id = %correlation_id, ?waited, "rpc call timed out");
                Err(RpcError::Timeout {
                    correlation_id,
                    waited,
                })
            }
            // A reply or a shutdown took the slot first and is about to fill it.
            None => Ok(wait_resolved(slot)),
        },
    }
}

fn wait_resolved(slot: &ReplySlot) -> RpcReturn {
    loop {
        if let Ok(reply) = slot.get(Timeout::Infinite) {
            return reply;
        }
    }
}

impl<C: Channel> Drop for RpcClient<C> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("failed to close rpc client: {err}");
        }
    }
}
