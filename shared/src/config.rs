//! Transport endpoints, timeouts and sync periods.
//!
//! The protocol runs on fixed well-known ports; [`NetConfig::default`] carries
//! them. Tests and tools override ports to run several sessions on one
//! machine.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Reliable, ordered message stream.
pub const DEFAULT_TCP_PORT: u16 = 54555;
/// Best-effort datagrams carrying the same message encoding.
pub const DEFAULT_UDP_PORT: u16 = 54777;
/// Host discovery probes and replies only.
pub const DISCOVERY_PORT: u16 = 54778;

pub const CONNECTION_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_millis(5000);

pub const DEFAULT_MAX_CLIENTS: usize = 16;
pub const MAX_FRAME_SIZE: u32 = 1_048_576;
/// Frames queued per connection before the connection counts as stalled.
pub const SEND_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Interface the host binds its endpoints on.
    pub bind_ip: IpAddr,
    pub tcp_port: u16,
    pub udp_port: u16,
    pub discovery_port: u16,
    /// Where discovery probes are sent. Broadcast by default.
    pub discovery_target: IpAddr,
    pub connect_timeout: Duration,
    pub discovery_timeout: Duration,
    /// Remote players the host admits before answering "Server full".
    pub max_clients: usize,
    pub max_frame_size: u32,
    /// Outbound frames buffered per connection. A host closes a connection
    /// whose queue overflows; a client drops the frame.
    pub send_queue_capacity: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            tcp_port: DEFAULT_TCP_PORT,
            udp_port: DEFAULT_UDP_PORT,
            discovery_port: DISCOVERY_PORT,
            discovery_target: IpAddr::V4(Ipv4Addr::BROADCAST),
            connect_timeout: CONNECTION_TIMEOUT,
            discovery_timeout: DISCOVERY_TIMEOUT,
            max_clients: DEFAULT_MAX_CLIENTS,
            max_frame_size: MAX_FRAME_SIZE,
            send_queue_capacity: SEND_QUEUE_CAPACITY,
        }
    }
}

impl NetConfig {
    /// Loopback-only endpoints on OS-assigned ports with short timeouts.
    pub fn loopback() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            tcp_port: 0,
            udp_port: 0,
            discovery_port: 0,
            discovery_target: IpAddr::V4(Ipv4Addr::LOCALHOST),
            connect_timeout: Duration::from_millis(500),
            discovery_timeout: Duration::from_millis(300),
            ..Self::default()
        }
    }
}

/// Periods of the scheduled sync tasks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncRates {
    pub player: Duration,
    pub enemy: Duration,
    pub game_state: Duration,
    pub input: Duration,
}

impl Default for SyncRates {
    fn default() -> Self {
        Self {
            player: Duration::from_millis(100),
            enemy: Duration::from_millis(200),
            game_state: Duration::from_millis(1000),
            input: Duration::from_millis(50),
        }
    }
}
