//! Outcome of a call as delivered into its slot.

use transport::{BasicProperties, ShutdownSignal};

use crate::error::{RpcError, RpcResult};

/// Header carried by replies that report a failure instead of a result.
pub const RPC_EXCEPTION_HEADER: &str = "x-rpc-exception";
/// Header value: the call itself was malformed or unsupported.
pub const RPC_EXCEPTION_HEADER_RPC: &str = "rpc";
/// Header value: the service ran the call and reported a declared failure.
pub const RPC_EXCEPTION_HEADER_SERVICE: &str = "service";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExceptionKind {
    Rpc,
    Service,
    /// A header value neither side of the contract defines.
    Other(String),
}

impl ExceptionKind {
    pub fn from_header(value: &str) -> Self {
        match value {
            RPC_EXCEPTION_HEADER_RPC => ExceptionKind::Rpc,
            RPC_EXCEPTION_HEADER_SERVICE => ExceptionKind::Service,
            other => ExceptionKind::Other(other.to_string()),
        }
    }

    pub fn as_header(&self) -> &str {
        match self {
            ExceptionKind::Rpc => RPC_EXCEPTION_HEADER_RPC,
            ExceptionKind::Service => RPC_EXCEPTION_HEADER_SERVICE,
            ExceptionKind::Other(value) => value,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RpcReturn {
    Success(Vec<u8>),
    RemoteException {
        kind: ExceptionKind,
        payload: Vec<u8>,
    },
    Shutdown(ShutdownSignal),
}

impl RpcReturn {
    /// Builds the outcome for an inbound reply from its headers and body.
    pub fn from_delivery(properties: &BasicProperties, body: &[u8]) -> Self {
        match properties.header(RPC_EXCEPTION_HEADER) {
            Some(marker) => RpcReturn::RemoteException {
                kind: ExceptionKind::from_header(marker),
                payload: body.to_vec(),
            },
            None => RpcReturn::Success(body.to_vec()),
        }
    }

    /// Maps the outcome onto what a caller of `call` sees.
    pub fn into_result(self) -> RpcResult<Vec<u8>> {
        match self {
            RpcReturn::Success(payload) => Ok(payload),
            RpcReturn::RemoteException { kind, payload } => Err(match kind {
                ExceptionKind::Rpc => RpcError::RemoteCall { payload },
                ExceptionKind::Service => RpcError::RemoteService { payload },
                ExceptionKind::Other(header) => RpcError::UnexpectedException { header, payload },
            }),
            RpcReturn::Shutdown(signal) => Err(RpcError::shutdown(signal)),
        }
    }
}
