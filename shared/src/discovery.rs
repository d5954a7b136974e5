//! LAN host discovery over UDP.
//!
//! A joiner sends [`DISCOVERY_PROBE`] to the discovery port (broadcast by
//! default) and collects every address that answers with [`DISCOVERY_REPLY`]
//! before the timeout runs out.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};

use crate::config::NetConfig;

pub const DISCOVERY_PROBE: &[u8] = b"SWARMNET/DISCOVER";
pub const DISCOVERY_REPLY: &[u8] = b"SWARMNET/HOSTING";

/// Answers discovery probes until the task is aborted.
pub(crate) async fn respond_to_probes(socket: Arc<UdpSocket>) {
    let mut buffer = [0u8; 64];

    loop {
        match socket.recv_from(&mut buffer).await {
            Ok((len, from)) => {
                if &buffer[..len] != DISCOVERY_PROBE {
                    debug!("Ignoring {} stray bytes on discovery port from {}", len, from);
                    continue;
                }
                if let Err(e) = socket.send_to(DISCOVERY_REPLY, from).await {
                    warn!("Failed to answer discovery probe from {}: {}", from, e);
                }
            }
            Err(e) => {
                error!("Error receiving discovery probe: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

/// Probes for hosts and returns the distinct addresses that answered.
///
/// Waits the full discovery timeout. Finding nothing, or failing to probe at
/// all, yields an empty list.
pub async fn discover_hosts(config: &NetConfig) -> Vec<IpAddr> {
    match probe(config).await {
        Ok(hosts) => {
            info!("Discovery found {} host(s)", hosts.len());
            hosts
        }
        Err(e) => {
            error!("Failed to discover hosts: {}", e);
            Vec::new()
        }
    }
}

async fn probe(config: &NetConfig) -> std::io::Result<Vec<IpAddr>> {
    let local: SocketAddr = match config.discovery_target {
        IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(local).await?;
    socket.set_broadcast(true)?;

    let target = SocketAddr::new(config.discovery_target, config.discovery_port);
    socket.send_to(DISCOVERY_PROBE, target).await?;

    let deadline = Instant::now() + config.discovery_timeout;
    let mut hosts = Vec::new();
    let mut buffer = [0u8; 64];

    loop {
        match timeout_at(deadline, socket.recv_from(&mut buffer)).await {
            Ok(Ok((len, from))) => {
                if &buffer[..len] == DISCOVERY_REPLY && !hosts.contains(&from.ip()) {
                    debug!("Host answered discovery from {}", from);
                    hosts.push(from.ip());
                }
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => break,
        }
    }

    Ok(hosts)
}
