//! Server-side call and cast handlers.
//!
//! A server decodes each request into a `P` and hands it to an
//! [`RpcHandler`]. Calls produce an `R` to send back; casts produce nothing.
//! Implementors override the narrowest method that still sees everything
//! they need: each default drops one piece of context and forwards to the
//! next, ending in methods that report [`HandlerError::Unsupported`].

use thiserror::Error;
use transport::{BasicProperties, Envelope};

pub type HandlerResult<T> = Result<T, HandlerError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandlerError {
    /// The handler does not override any method for this kind of request.
    #[error("no handler implemented for {0}")]
    Unsupported(&'static str),

    /// The handler ran and rejected the request.
    #[error("{0}")]
    Failed(String),
}

pub trait RpcHandler<P, R> {
    /// Handles a call with the full delivery context.
    ///
    /// `reply_props` starts empty; whatever the handler sets on it travels
    /// with the reply.
    fn handle_call(
        &self,
        _envelope: &Envelope,
        request_props: &BasicProperties,
        parm: P,
        reply_props: &mut BasicProperties,
    ) -> HandlerResult<R> {
        self.handle_call_props(request_props, parm, reply_props)
    }

    fn handle_call_props(
        &self,
        _request_props: &BasicProperties,
        parm: P,
        reply_props: &mut BasicProperties,
    ) -> HandlerResult<R> {
        self.handle_call_reply(parm, reply_props)
    }

    fn handle_call_reply(&self, parm: P, _reply_props: &mut BasicProperties) -> HandlerResult<R> {
        self.handle_call_parm(parm)
    }

    fn handle_call_parm(&self, _parm: P) -> HandlerResult<R> {
        Err(HandlerError::Unsupported("call"))
    }

    /// Handles a one-way request with the full delivery context.
    fn handle_cast(
        &self,
        _envelope: &Envelope,
        request_props: &BasicProperties,
        parm: P,
    ) -> HandlerResult<()> {
        self.handle_cast_props(request_props, parm)
    }

    fn handle_cast_props(&self, _request_props: &BasicProperties, parm: P) -> HandlerResult<()> {
        self.handle_cast_parm(parm)
    }

    fn handle_cast_parm(&self, _parm: P) -> HandlerResult<()> {
        Err(HandlerError::Unsupported("cast"))
    }
}
