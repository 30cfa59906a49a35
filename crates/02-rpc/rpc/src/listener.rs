use std::sync::Arc;

use tracing::{trace, warn};
use transport::{BasicProperties, Consumer, ConsumerTag, Envelope, ShutdownSignal};

use crate::envelope::RpcReturn;
use crate::registry::ContinuationMap;

/// Consumer bound to a client's reply queue.
///
/// Replies resolve the slot registered under their correlation id. Replies
/// nobody is waiting for any more are dropped. When the subscription ends,
/// every call still pending fails with the shutdown cause.
pub struct ReplyConsumer {
    continuations: Arc<ContinuationMap>,
}

impl ReplyConsumer {
    pub fn new(continuations: Arc<ContinuationMap>) -> Self {
        Self { continuations }
    }

    fn fail_pending(&self, consumer_tag: &ConsumerTag, signal: &ShutdownSignal) {
        let pending = self.continuations.shutdown(signal);
        if !pending.is_empty() {
            warn!(
                consumer_tag = %consumer_tag,
                pending = pending.len(),
                %signal,
                "failing outstanding calls"
            );
        }
        for slot in pending {
            slot.set(RpcReturn::Shutdown(signal.clone()));
        }
    }
}

impl Consumer for ReplyConsumer {
    fn handle_delivery(
        &self,
        consumer_tag: &ConsumerTag,
        envelope: &Envelope,
        properties: &BasicProperties,
        body: &[u8],
    ) {
        let Some(correlation_id) = properties.correlation_id() else {
            trace!(consumer_tag = %consumer_tag, delivery_tag = envelope.delivery_tag, "dropping reply without correlation id");
            return;
        };
        match self.continuations.take(correlation_id) {
            Some(slot) => {
                trace!(consumer_tag = %consumer_tag, correlation_id, len = body.len(), "reply received");
                slot.set(RpcReturn::from_delivery(properties, body));
            }
            None => {
                trace!(consumer_tag = %consumer_tag, correlation_id, "dropping reply with no pending call");
            }
        }
    }

    fn handle_shutdown_signal(&self, consumer_tag: &ConsumerTag, signal: &ShutdownSignal) {
        self.fail_pending(consumer_tag, signal);
    }

    fn handle_cancel_ok(&self, consumer_tag: &ConsumerTag) {
        self.fail_pending(consumer_tag, &ShutdownSignal::consumer_cancelled(consumer_tag));
    }
}
