//! Error taxonomy for the wire codec and the transport session.

use std::net::SocketAddr;
use std::time::Duration;

use crate::session::Role;

/// Errors raised while encoding, decoding or framing a message.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The discriminant names a variant this build does not know.
    #[error("unknown message type tag {0}")]
    UnknownType(u8),

    /// The buffer ended before the fixed header was complete.
    #[error("truncated message: {len} bytes")]
    Truncated { len: usize },

    #[error("payload size {size} exceeds maximum {max}")]
    PayloadTooLarge { size: u32, max: u32 },

    /// The peer closed the stream between or inside a frame.
    #[error("connection closed")]
    ConnectionClosed,

    #[error("payload encoding failed: {0}")]
    Payload(#[from] bincode::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport-level failures. The session has already rolled back to
/// [`Role::Idle`] by the time one of these reaches the caller.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session is already active as {0:?}")]
    AlreadyActive(Role),

    #[error("operation requires the {expected:?} role, session is {actual:?}")]
    WrongRole { expected: Role, actual: Role },

    #[error("failed to bind {endpoint} port {port}: {source}")]
    Bind {
        endpoint: &'static str,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("connection to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: SocketAddr, timeout: Duration },
}
