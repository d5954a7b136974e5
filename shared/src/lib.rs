//! # Shared Networking Core
//!
//! Everything both sides of a match need to talk to each other: the typed
//! message protocol, its wire codec, the entity-id registry that gives game
//! objects a stable network identity, LAN discovery, and the transport
//! [`Session`] that owns the host/client role and its connections.
//!
//! Gameplay code never touches sockets directly. It builds a
//! [`NetworkMessage`], hands it to the session, and receives inbound traffic
//! through registered [`MessageListener`]s.

pub mod codec;
pub mod config;
pub mod discovery;
pub mod error;
pub mod messages;
pub mod registry;
pub mod session;

pub use config::{NetConfig, SyncRates};
pub use error::{CodecError, SessionError};
pub use messages::*;
pub use registry::{EntityHandle, EntityRegistry};
pub use session::{MessageListener, Role, Session};

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    (millis.min(u64::MAX as u128)) as u64
}

/// Normalizes a 2D vector, returning the zero vector unchanged.
pub fn normalize_vector(x: f32, y: f32) -> (f32, f32) {
    let magnitude = (x * x + y * y).sqrt();
    if magnitude > 0.0 {
        (x / magnitude, y / magnitude)
    } else {
        (0.0, 0.0)
    }
}
