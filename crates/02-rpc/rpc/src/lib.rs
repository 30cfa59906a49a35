//! Synchronous request/response calls over a publish/subscribe transport.
//!
//! An [`RpcClient`] owns a private reply queue on a [`transport::Channel`].
//! Each call publishes a request stamped with a fresh correlation id and the
//! reply queue name, then blocks on a one-shot [`Slot`] until the matching
//! reply arrives, the channel shuts down, or the client timeout elapses.
//!
//! * [`Slot`] – single-assignment cell waited on by the calling thread.
//! * [`RpcReturn`] – the tagged outcome delivered into a slot.
//! * [`ContinuationMap`] – correlation id → pending slot, one lock domain.
//! * [`ReplyConsumer`] – the transport consumer that resolves slots.
//! * [`RpcHandler`] – server-side call/cast handler with narrowing defaults.

mod client;
mod config;
mod envelope;
mod error;
pub mod handler;
mod listener;
mod registry;
mod slot;

pub use client::RpcClient;
pub use config::{RpcClientConfig, Timeout, NO_TIMEOUT};
pub use envelope::{
    ExceptionKind, RpcReturn, RPC_EXCEPTION_HEADER, RPC_EXCEPTION_HEADER_RPC,
    RPC_EXCEPTION_HEADER_SERVICE,
};
pub use error::{RpcError, RpcResult};
pub use handler::{HandlerError, HandlerResult, RpcHandler};
pub use listener::ReplyConsumer;
pub use registry::{ContinuationMap, ReplySlot};
pub use slot::{Slot, SlotTimeout};
