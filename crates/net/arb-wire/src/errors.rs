//! Error types of the `arb` wire protocol.

use crate::message::ArbMessageId;

/// Errors when reading or writing `arb` messages.
///
/// Any of these terminates the message loop of the affected peer only.
#[derive(thiserror::Error, Debug)]
pub enum ArbWireError {
    /// The frame carried no message id.
    #[error("empty arb message")]
    EmptyMessage,
    /// Unknown message id.
    #[error("invalid arb message id: {0:#04x}")]
    InvalidMessageId(u8),
    /// The frame exceeds [`MAX_MESSAGE_SIZE`](crate::MAX_MESSAGE_SIZE).
    #[error("arb message size ({0}) exceeds max length (10MB)")]
    MessageTooBig(usize),
    /// The payload could not be decoded.
    #[error("failed to decode {id:?} payload: {err}")]
    InvalidPayload {
        /// Message the payload belongs to.
        id: ArbMessageId,
        /// The rlp error.
        err: alloy_rlp::Error,
    },
    /// The payload was followed by unexpected bytes.
    #[error("{id:?} payload has {remaining} trailing bytes")]
    TrailingBytes {
        /// Message the payload belongs to.
        id: ArbMessageId,
        /// Number of bytes left after decoding.
        remaining: usize,
    },
    /// The session to the remote is gone.
    #[error("arb session closed")]
    SessionClosed,
}

/// Error returned by an [`ArbBackend`](crate::ArbBackend) when it can't answer a request.
///
/// These are local failures: the request stays unanswered but the peer is kept.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct ArbBackendError(Box<dyn std::error::Error + Send + Sync>);

impl ArbBackendError {
    /// Wraps an arbitrary error.
    pub fn other<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self(err.into())
    }
}
