//! Caller-visible errors.
//!
//! Exactly four kinds cross the RPC boundary. `Internal` carries only the
//! fixed per-operation message; the store error behind it is logged where it
//! is converted and never stored here.

use serde::Serialize;

use super::operation::Operation;

/// Machine-readable error kind, serialized in the callable error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Unauthenticated,
    InvalidArgument,
    NotFound,
    Internal,
}

/// An error returned by a gateway operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub message: String,
}

impl GatewayError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unauthenticated(op: Operation) -> Self {
        Self::new(ErrorKind::Unauthenticated, op.unauthenticated_message())
    }

    pub fn invalid_argument() -> Self {
        Self::new(ErrorKind::InvalidArgument, "Invalid request data.")
    }

    pub fn not_found() -> Self {
        Self::new(ErrorKind::NotFound, "Plan not found.")
    }

    pub fn internal(op: Operation) -> Self {
        Self::new(ErrorKind::Internal, op.internal_message())
    }
}
