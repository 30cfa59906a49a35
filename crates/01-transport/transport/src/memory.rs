//! In-process broker used by tests and demos.
//!
//! [`MemoryBroker`] keeps exchanges, queues and subscriptions behind one lock
//! and hands every subscription its own delivery thread fed through an
//! unbounded `crossbeam-channel`. Consumers therefore always run on a thread
//! other than the publisher's, the same way a networked client library
//! dispatches deliveries.
//!
//! Routing follows the usual direct-exchange rules:
//! * the default exchange (`""`) routes to the queue named by the routing key;
//! * a declared exchange routes to every queue bound with a matching key;
//! * messages nobody can receive are dropped, messages for a queue without a
//!   consumer wait in its backlog until one subscribes.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::channel::{Channel, Consumer, ConsumerTag, Envelope, QueueName};
use crate::error::{TransportError, TransportResult};
use crate::properties::BasicProperties;
use crate::shutdown::{ShutdownReference, ShutdownSignal};

const DEFAULT_EXCHANGE: &str = "";

struct Message {
    exchange: String,
    routing_key: String,
    properties: BasicProperties,
    body: Arc<[u8]>,
}

impl Message {
    fn into_event(self, delivery_tag: u64) -> Event {
        Event::Deliver {
            envelope: Envelope {
                delivery_tag,
                redelivered: false,
                exchange: self.exchange,
                routing_key: self.routing_key,
            },
            properties: self.properties,
            body: self.body,
        }
    }
}

enum Event {
    Deliver {
        envelope: Envelope,
        properties: BasicProperties,
        body: Arc<[u8]>,
    },
    Shutdown(ShutdownSignal),
    CancelOk,
}

struct Queue {
    exclusive_to: Option<u16>,
    auto_delete: bool,
    backlog: VecDeque<Message>,
    consumer: Option<ConsumerTag>,
}

impl Queue {
    fn shared() -> Self {
        Self {
            exclusive_to: None,
            auto_delete: false,
            backlog: VecDeque::new(),
            consumer: None,
        }
    }

    fn exclusive(owner: u16) -> Self {
        Self {
            exclusive_to: Some(owner),
            auto_delete: true,
            backlog: VecDeque::new(),
            consumer: None,
        }
    }

    fn check_access(&self, name: &str, channel: u16) -> TransportResult<()> {
        match self.exclusive_to {
            Some(owner) if owner != channel => Err(TransportError::AccessRefused(name.to_string())),
            _ => Ok(()),
        }
    }
}

struct Subscription {
    channel: u16,
    queue: String,
    events: Sender<Event>,
}

#[derive(Default)]
struct BrokerState {
    next_channel: u16,
    next_queue: u64,
    next_tag: u64,
    next_delivery: u64,
    exchanges: HashMap<String, Vec<(String, String)>>,
    queues: HashMap<String, Queue>,
    subscriptions: HashMap<ConsumerTag, Subscription>,
    closed: HashMap<u16, ShutdownSignal>,
}

impl BrokerState {
    fn ensure_open(&self, channel: u16) -> TransportResult<()> {
        match self.closed.get(&channel) {
            Some(signal) => Err(TransportError::ChannelClosed(signal.clone())),
            None => Ok(()),
        }
    }

    fn route(
        &mut self,
        exchange: &str,
        routing_key: &str,
        properties: &BasicProperties,
        body: &[u8],
    ) -> TransportResult<usize> {
        let targets: Vec<String> = if exchange == DEFAULT_EXCHANGE {
            self.queues
                .contains_key(routing_key)
                .then(|| routing_key.to_string())
                .into_iter()
                .collect()
        } else {
            self.exchanges
                .get(exchange)
                .ok_or_else(|| TransportError::ExchangeNotFound(exchange.to_string()))?
                .iter()
                .filter(|(key, _)| key == routing_key)
                .map(|(_, queue)| queue.clone())
                .collect()
        };

        let body: Arc<[u8]> = Arc::from(body);
        for queue in &targets {
            self.enqueue(
                queue,
                Message {
                    exchange: exchange.to_string(),
                    routing_key: routing_key.to_string(),
                    properties: properties.clone(),
                    body: Arc::clone(&body),
                },
            );
        }
        Ok(targets.len())
    }

    fn enqueue(&mut self, queue: &str, message: Message) {
        let Some(target) = self.queues.get_mut(queue) else {
            return;
        };
        match target
            .consumer
            .as_ref()
            .and_then(|tag| self.subscriptions.get(tag))
        {
            Some(subscription) => {
                self.next_delivery += 1;
                // A send only fails once the delivery thread is gone, which
                // happens after the subscription has already been removed.
                let _ = subscription
                    .events
                    .send(message.into_event(self.next_delivery));
            }
            None => target.backlog.push_back(message),
        }
    }

    /// Clears the consumer of `queue`, deleting it when it is auto-delete.
    fn detach(&mut self, queue: &str) {
        let delete = match self.queues.get_mut(queue) {
            Some(target) => {
                target.consumer = None;
                target.auto_delete
            }
            None => false,
        };
        if delete {
            self.remove_queue(queue);
        }
    }

    fn remove_queue(&mut self, queue: &str) {
        self.queues.remove(queue);
        for bindings in self.exchanges.values_mut() {
            bindings.retain(|(_, bound)| bound != queue);
        }
        trace!(queue, "queue deleted");
    }

    fn shutdown_channel(&mut self, channel: u16, signal: &ShutdownSignal) -> usize {
        if self.closed.contains_key(&channel) {
            return 0;
        }
        self.closed.insert(channel, signal.clone());

        let tags: Vec<ConsumerTag> = self
            .subscriptions
            .iter()
            .filter(|(_, sub)| sub.channel == channel)
            .map(|(tag, _)| tag.clone())
            .collect();
        for tag in &tags {
            if let Some(sub) = self.subscriptions.remove(tag) {
                let _ = sub.events.send(Event::Shutdown(signal.clone()));
                self.detach(&sub.queue);
            }
        }

        let owned: Vec<String> = self
            .queues
            .iter()
            .filter(|(_, queue)| queue.exclusive_to == Some(channel))
            .map(|(name, _)| name.clone())
            .collect();
        for queue in owned {
            self.remove_queue(&queue);
        }

        debug!(channel, consumers = tags.len(), %signal, "channel shut down");
        tags.len()
    }
}

/// Shared broker state. Cloning yields another handle to the same broker.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new channel on the broker.
    pub fn channel(&self) -> MemoryChannel {
        let mut state = self.state.lock();
        state.next_channel += 1;
        MemoryChannel {
            number: state.next_channel,
            state: Arc::clone(&self.state),
        }
    }

    /// Simulates the connection dying: every open channel is shut down with a
    /// hard error that the application did not initiate.
    pub fn abort_connection(&self, reason: &str) {
        let signal = ShutdownSignal::new(true, false, reason, ShutdownReference::Connection);
        let mut state = self.state.lock();
        for channel in 1..=state.next_channel {
            state.shutdown_channel(channel, &signal);
        }
    }

    pub fn has_queue(&self, queue: &str) -> bool {
        self.state.lock().queues.contains_key(queue)
    }

    /// Number of messages waiting in `queue` for a consumer.
    pub fn queue_depth(&self, queue: &str) -> Option<usize> {
        self.state
            .lock()
            .queues
            .get(queue)
            .map(|target| target.backlog.len())
    }
}

/// One channel on a [`MemoryBroker`].
#[derive(Clone)]
pub struct MemoryChannel {
    number: u16,
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryChannel {
    pub fn number(&self) -> u16 {
        self.number
    }

    pub fn is_open(&self) -> bool {
        !self.state.lock().closed.contains_key(&self.number)
    }

    /// Declares a direct exchange. Declaring an existing exchange is a no-op.
    pub fn exchange_declare(&self, exchange: &str) -> TransportResult<()> {
        let mut state = self.state.lock();
        state.ensure_open(self.number)?;
        if exchange != DEFAULT_EXCHANGE {
            state.exchanges.entry(exchange.to_string()).or_default();
        }
        Ok(())
    }

    /// Declares a named, shared queue. Declaring an existing queue is a no-op.
    pub fn queue_declare(&self, queue: &str) -> TransportResult<QueueName> {
        let mut state = self.state.lock();
        state.ensure_open(self.number)?;
        state
            .queues
            .entry(queue.to_string())
            .or_insert_with(Queue::shared)
            .check_access(queue, self.number)?;
        Ok(queue.to_string())
    }

    pub fn queue_bind(&self, queue: &str, exchange: &str, routing_key: &str) -> TransportResult<()> {
        let mut state = self.state.lock();
        state.ensure_open(self.number)?;
        if !state.queues.contains_key(queue) {
            return Err(TransportError::queue_not_found(queue));
        }
        let bindings = state
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| TransportError::ExchangeNotFound(exchange.to_string()))?;
        let binding = (routing_key.to_string(), queue.to_string());
        if !bindings.contains(&binding) {
            bindings.push(binding);
        }
        Ok(())
    }

    /// Closes the channel on behalf of the application.
    pub fn close(&self) {
        let signal = ShutdownSignal::new(
            false,
            true,
            "channel closed by application",
            ShutdownReference::Channel(self.number),
        );
        self.state.lock().shutdown_channel(self.number, &signal);
    }

    /// Fails the channel with a hard error, as if the peer had closed it.
    pub fn abort(&self, reason: &str) {
        let signal = ShutdownSignal::new(
            true,
            false,
            reason,
            ShutdownReference::Channel(self.number),
        );
        self.state.lock().shutdown_channel(self.number, &signal);
    }
}

impl Channel for MemoryChannel {
    fn queue_declare_exclusive(&self) -> TransportResult<QueueName> {
        let mut state = self.state.lock();
        state.ensure_open(self.number)?;
        state.next_queue += 1;
        let name = format!("amq.gen-{}", state.next_queue);
        state.queues.insert(name.clone(), Queue::exclusive(self.number));
        trace!(channel = self.number, queue = %name, "exclusive queue declared");
        Ok(name)
    }

    /// Deliveries are never redelivered, so `auto_ack` has no effect here.
    fn basic_consume(
        &self,
        queue: &str,
        _auto_ack: bool,
        consumer: Arc<dyn Consumer>,
    ) -> TransportResult<ConsumerTag> {
        let mut guard = self.state.lock();
        guard.ensure_open(self.number)?;
        let state = &mut *guard;

        let target = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| TransportError::queue_not_found(queue))?;
        target.check_access(queue, self.number)?;
        if target.consumer.is_some() {
            return Err(TransportError::QueueBusy(queue.to_string()));
        }

        state.next_tag += 1;
        let tag = ConsumerTag::from(format!("ctag-{}.{}", self.number, state.next_tag));
        let (events, inbox) = unbounded();
        spawn_delivery(tag.clone(), consumer, inbox)?;

        for message in target.backlog.drain(..) {
            state.next_delivery += 1;
            let _ = events.send(message.into_event(state.next_delivery));
        }
        target.consumer = Some(tag.clone());
        state.subscriptions.insert(
            tag.clone(),
            Subscription {
                channel: self.number,
                queue: queue.to_string(),
                events,
            },
        );

        debug!(channel = self.number, queue, consumer_tag = %tag, "consumer attached");
        Ok(tag)
    }

    fn queue_delete(&self, queue: &str) -> TransportResult<()> {
        let mut state = self.state.lock();
        state.ensure_open(self.number)?;
        let target = state
            .queues
            .get(queue)
            .ok_or_else(|| TransportError::queue_not_found(queue))?;
        target.check_access(queue, self.number)?;
        if let Some(tag) = target.consumer.clone() {
            if let Some(sub) = state.subscriptions.remove(&tag) {
                let _ = sub.events.send(Event::CancelOk);
            }
        }
        state.remove_queue(queue);
        Ok(())
    }

    fn basic_cancel(&self, consumer_tag: &ConsumerTag) -> TransportResult<()> {
        let mut state = self.state.lock();
        state.ensure_open(self.number)?;
        match state.subscriptions.get(consumer_tag) {
            Some(sub) if sub.channel == self.number => {}
            _ => return Err(TransportError::UnknownConsumer(consumer_tag.to_string())),
        }
        if let Some(sub) = state.subscriptions.remove(consumer_tag) {
            let _ = sub.events.send(Event::CancelOk);
            state.detach(&sub.queue);
        }
        debug!(channel = self.number, consumer_tag = %consumer_tag, "consumer cancelled");
        Ok(())
    }

    fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        properties: &BasicProperties,
        body: &[u8],
    ) -> TransportResult<()> {
        let mut state = self.state.lock();
        state.ensure_open(self.number)?;
        let routed = state.route(exchange, routing_key, properties, body)?;
        if routed == 0 {
            trace!(exchange, routing_key, "dropping unroutable message");
        }
        Ok(())
    }
}

fn spawn_delivery(
    tag: ConsumerTag,
    consumer: Arc<dyn Consumer>,
    inbox: Receiver<Event>,
) -> TransportResult<()> {
    thread::Builder::new()
        .name(format!("memory-{tag}"))
        .spawn(move || {
            for event in inbox.iter() {
                match event {
                    Event::Deliver {
                        envelope,
                        properties,
                        body,
                    } => consumer.handle_delivery(&tag, &envelope, &properties, &body),
                    Event::Shutdown(signal) => {
                        consumer.handle_shutdown_signal(&tag, &signal);
                        return;
                    }
                    Event::CancelOk => {
                        consumer.handle_cancel_ok(&tag);
                        return;
                    }
                }
            }
        })?;
    Ok(())
}
