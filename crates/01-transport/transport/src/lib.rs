//! Publish/subscribe transport boundary consumed by the RPC layer.
//!
//! This crate exposes the pieces the RPC client needs from a broker:
//! * [`Channel`] – queue declaration, consume/cancel and publish primitives.
//! * [`Consumer`] – callbacks invoked on the transport's delivery thread.
//! * [`BasicProperties`] – immutable message metadata (correlation id, reply-to, headers).
//! * [`ShutdownSignal`] – the cause reported when a channel or connection dies.
//! * [`MemoryBroker`] – an in-process broker used by tests and demos.

mod channel;
mod error;
pub mod memory;
mod properties;
mod shutdown;

pub use channel::{Channel, Consumer, ConsumerTag, Envelope, QueueName};
pub use error::{TransportError, TransportResult};
pub use memory::{MemoryBroker, MemoryChannel};
pub use properties::BasicProperties;
pub use shutdown::{ShutdownReference, ShutdownSignal};
