//! Transport session: role, connections, send/broadcast and listener dispatch.
//!
//! A [`Session`] is in exactly one [`Role`] at a time:
//!
//! - **Idle**: no sockets. `start_host`, `connect_to_host` and `discover`
//!   are only accepted here.
//! - **Host**: owns a TCP listener, a UDP message socket and a discovery
//!   responder. Plays as client id `0`, assigns every accepted connection its
//!   transport id as client id, and keeps the roster of connected players.
//! - **Client**: owns one TCP connection to a host.
//!
//! ## Tasks
//!
//! Every connection is served by a reader task and a writer task. Outbound
//! frames are queued on a bounded channel (`send_queue_capacity`), so `send`,
//! `send_to` and `send_except` never block and never hold a lock across I/O.
//! A host connection whose queue overflows is treated as stalled and closed,
//! with the same cleanup as a dropped connection. Inbound
//! messages are decoded on the reader task and handed to every registered
//! [`MessageListener`] in registration order.
//!
//! ## Failures
//!
//! Bind and connect failures are logged, the session stays (or returns to)
//! Idle, and the caller gets a [`SessionError`]. Undecodable or unknown
//! messages and messages from connections that never completed the handshake
//! are logged and dropped; the session keeps running.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use log::{debug, error, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::timeout;

use crate::codec::{self, read_frame, write_frame};
use crate::config::NetConfig;
use crate::discovery;
use crate::error::{CodecError, SessionError};
use crate::messages::*;
use crate::registry::{EntityHandle, EntityRegistry};

pub const WELCOME_MESSAGE: &str = "Welcome to the game!";
pub const SERVER_FULL_MESSAGE: &str = "Server full";
pub const CLIENT_DISCONNECTED: &str = "Client disconnected";
pub const HOST_LOST: &str = "Disconnected from server";

/// Receives every inbound message the session accepts.
///
/// Called on the session's I/O tasks, so implementations must not block.
pub trait MessageListener: Send + Sync {
    fn on_message(&self, message: &NetworkMessage);
}

impl<F> MessageListener for F
where
    F: Fn(&NetworkMessage) + Send + Sync,
{
    fn on_message(&self, message: &NetworkMessage) {
        self(message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Idle,
    Host,
    Client,
}

/// Whether a host reader keeps serving its connection after a message.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// One accepted connection on the host.
struct Peer {
    addr: SocketAddr,
    outbound: mpsc::Sender<Vec<u8>>,
    reader: Option<AbortHandle>,
    writer: AbortHandle,
}

struct HostState {
    tasks: Vec<JoinHandle<()>>,
    tcp_addr: SocketAddr,
    udp_addr: SocketAddr,
    discovery_addr: SocketAddr,
}

struct ClientState {
    epoch: u64,
    host_addr: SocketAddr,
    host_udp: SocketAddr,
    outbound: mpsc::Sender<Vec<u8>>,
    reader: AbortHandle,
    datagrams: Option<UdpSocket>,
}

enum State {
    Idle,
    Host(HostState),
    Client(ClientState),
}

impl State {
    fn role(&self) -> Role {
        match self {
            State::Idle => Role::Idle,
            State::Host(_) => Role::Host,
            State::Client(_) => Role::Client,
        }
    }
}

struct Inner {
    config: NetConfig,
    state: Mutex<State>,
    client_id: Mutex<Option<ClientId>>,
    player_name: Mutex<String>,
    connected: AtomicBool,
    roster: DashMap<ClientId, String>,
    peers: DashMap<ClientId, Peer>,
    listeners: RwLock<Vec<Arc<dyn MessageListener>>>,
    registry: EntityRegistry,
    next_connection_id: AtomicU32,
    epoch: AtomicU64,
}

/// Handle to a transport session. Clones share the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Session {
    pub fn new(config: NetConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State::Idle),
                client_id: Mutex::new(None),
                player_name: Mutex::new("Player".to_string()),
                connected: AtomicBool::new(false),
                roster: DashMap::new(),
                peers: DashMap::new(),
                listeners: RwLock::new(Vec::new()),
                registry: EntityRegistry::new(),
                next_connection_id: AtomicU32::new(1),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &NetConfig {
        &self.inner.config
    }

    /// Binds the host endpoints and becomes client `0`.
    pub async fn start_host(&self, player_name: &str) -> Result<(), SessionError> {
        let role = self.role();
        if role != Role::Idle {
            return Err(SessionError::AlreadyActive(role));
        }

        let config = &self.inner.config;
        let (listener, datagrams, probes) = match bind_host_endpoints(config).await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                error!("Failed to start host: {}", e);
                return Err(e);
            }
        };

        let tcp_addr = listener.local_addr().unwrap_or_else(|_| unspecified(config.bind_ip));
        let udp_addr = datagrams.local_addr().unwrap_or_else(|_| unspecified(config.bind_ip));
        let discovery_addr = probes.local_addr().unwrap_or_else(|_| unspecified(config.bind_ip));

        {
            let mut state = lock(&self.inner.state);
            if !matches!(*state, State::Idle) {
                return Err(SessionError::AlreadyActive(state.role()));
            }

            *lock(&self.inner.client_id) = Some(HOST_CLIENT_ID);
            *lock(&self.inner.player_name) = player_name.to_string();
            self.inner.roster.insert(HOST_CLIENT_ID, player_name.to_string());

            let tasks = vec![
                tokio::spawn(accept_loop(Arc::clone(&self.inner), listener)),
                tokio::spawn(datagram_loop(Arc::clone(&self.inner), datagrams)),
                tokio::spawn(discovery::respond_to_probes(Arc::new(probes))),
            ];

            *state = State::Host(HostState {
                tasks,
                tcp_addr,
                udp_addr,
                discovery_addr,
            });
        }

        info!(
            "Hosting as '{}' on tcp {}, udp {}, discovery {}",
            player_name, tcp_addr, udp_addr, discovery_addr
        );
        Ok(())
    }

    /// Closes every host endpoint and connection and clears the roster.
    pub fn stop(&self) {
        let host = {
            let mut state = lock(&self.inner.state);
            match std::mem::replace(&mut *state, State::Idle) {
                State::Host(host) => host,
                other => {
                    *state = other;
                    return;
                }
            }
        };

        for task in host.tasks {
            task.abort();
        }

        let connection_ids: Vec<ClientId> = self.inner.peers.iter().map(|p| *p.key()).collect();
        for id in connection_ids {
            if let Some((_, peer)) = self.inner.peers.remove(&id) {
                peer.writer.abort();
                if let Some(reader) = peer.reader {
                    reader.abort();
                }
            }
        }

        self.inner.roster.clear();
        *lock(&self.inner.client_id) = None;
        info!("Host stopped");
    }

    /// Probes the LAN for hosts. Only meaningful while idle.
    pub async fn discover(&self) -> Vec<IpAddr> {
        if self.role() != Role::Idle {
            warn!("Discovery is only available while idle");
            return Vec::new();
        }
        discovery::discover_hosts(&self.inner.config).await
    }

    /// Connects to a host and announces `player_name` with a
    /// [`ConnectionMessage`]. The client id arrives later in the host's reply.
    pub async fn connect_to_host(
        &self,
        address: IpAddr,
        player_name: &str,
    ) -> Result<(), SessionError> {
        let role = self.role();
        if role != Role::Idle {
            return Err(SessionError::AlreadyActive(role));
        }

        let config = &self.inner.config;
        let addr = SocketAddr::new(address, config.tcp_port);
        let stream = match timeout(config.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                error!("Failed to connect to {}: {}", addr, source);
                return Err(SessionError::Connect { addr, source });
            }
            Err(_) => {
                error!("Connection to {} timed out", addr);
                return Err(SessionError::ConnectTimeout {
                    addr,
                    timeout: config.connect_timeout,
                });
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle on {}: {}", addr, e);
        }

        let datagrams = match UdpSocket::bind(unspecified(address)).await {
            Ok(socket) => Some(socket),
            Err(e) => {
                warn!("No datagram socket for unreliable sends: {}", e);
                None
            }
        };

        let (reader, writer) = stream.into_split();
        let (outbound, outbound_rx) = mpsc::channel(config.send_queue_capacity.max(1));
        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let mut state = lock(&self.inner.state);
            if !matches!(*state, State::Idle) {
                return Err(SessionError::AlreadyActive(state.role()));
            }

            *lock(&self.inner.client_id) = None;
            *lock(&self.inner.player_name) = player_name.to_string();
            // Set before the reader exists so a host that hangs up at once
            // always leaves the flag cleared.
            self.inner.connected.store(true, Ordering::SeqCst);

            tokio::spawn(write_loop(writer, outbound_rx, config.max_frame_size));
            let reader = tokio::spawn(client_read_loop(Arc::clone(&self.inner), epoch, reader));

            *state = State::Client(ClientState {
                epoch,
                host_addr: addr,
                host_udp: SocketAddr::new(address, config.udp_port),
                outbound,
                reader: reader.abort_handle(),
                datagrams,
            });
        }
        info!("Connected to host at {}", addr);

        let hello = NetworkMessage::new(ConnectionMessage {
            client_id: None,
            player_name: player_name.to_string(),
            is_host: false,
            accepted: false,
            server_message: String::new(),
        });
        self.send(&hello);
        self.inner.notify(&hello);

        Ok(())
    }

    /// Announces the departure to the host, closes the connection and returns
    /// to Idle.
    pub fn disconnect(&self) {
        self.inner.end_client(None, CLIENT_DISCONNECTED, true);
    }

    /// Tears down whichever role is active.
    pub fn shutdown(&self) {
        match self.role() {
            Role::Host => self.stop(),
            Role::Client => self.disconnect(),
            Role::Idle => {}
        }
    }

    /// Host: delivers to every connected player. Client: delivers to the host.
    pub fn send(&self, message: &NetworkMessage) {
        self.inner.send(message, None);
    }

    /// Host only: delivers to one connected player.
    pub fn send_to(&self, client_id: ClientId, message: &NetworkMessage) -> bool {
        if self.role() != Role::Host {
            warn!("send_to({}) ignored: not hosting", client_id);
            return false;
        }
        let Some(frame) = encode_or_log(message) else {
            return false;
        };
        self.inner.send_frame_to(client_id, frame)
    }

    /// Host only: delivers to every connected player except `excluded`.
    pub fn send_except(&self, excluded: ClientId, message: &NetworkMessage) {
        if self.role() != Role::Host {
            warn!("send_except({}) ignored: not hosting", excluded);
            return;
        }
        self.inner.send(message, Some(excluded));
    }

    /// Client only: sends one datagram to the host's UDP port. Best effort.
    pub fn send_unreliable(&self, message: &NetworkMessage) -> bool {
        let Some(bytes) = encode_or_log(message) else {
            return false;
        };

        let state = lock(&self.inner.state);
        let State::Client(client) = &*state else {
            warn!("Unreliable send ignored: not a client");
            return false;
        };
        let Some(socket) = &client.datagrams else {
            return false;
        };

        match socket.try_send_to(&bytes, client.host_udp) {
            Ok(_) => true,
            Err(e) => {
                debug!("Dropping datagram to {}: {}", client.host_udp, e);
                false
            }
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn MessageListener>) {
        self.inner
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(listener);
    }

    /// Removes a previously added listener, matched by identity.
    pub fn remove_listener(&self, listener: &Arc<dyn MessageListener>) -> bool {
        let mut listeners = self
            .inner
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn entity_id_of(&self, handle: EntityHandle) -> EntityId {
        self.inner.registry.id_for(handle)
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.inner.registry
    }

    pub fn role(&self) -> Role {
        lock(&self.inner.state).role()
    }

    pub fn is_host(&self) -> bool {
        self.role() == Role::Host
    }

    pub fn is_client(&self) -> bool {
        self.role() == Role::Client
    }

    /// Whether a client session holds a live link to its host.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    pub fn client_id(&self) -> Option<ClientId> {
        *lock(&self.inner.client_id)
    }

    pub fn player_name(&self) -> String {
        lock(&self.inner.player_name).clone()
    }

    /// Snapshot of connected players, host included. Empty unless hosting.
    pub fn roster(&self) -> Vec<(ClientId, String)> {
        let mut roster: Vec<(ClientId, String)> = self
            .inner
            .roster
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        roster.sort_by_key(|(id, _)| *id);
        roster
    }

    pub fn local_tcp_addr(&self) -> Option<SocketAddr> {
        match &*lock(&self.inner.state) {
            State::Host(host) => Some(host.tcp_addr),
            _ => None,
        }
    }

    pub fn local_udp_addr(&self) -> Option<SocketAddr> {
        match &*lock(&self.inner.state) {
            State::Host(host) => Some(host.udp_addr),
            _ => None,
        }
    }

    pub fn local_discovery_addr(&self) -> Option<SocketAddr> {
        match &*lock(&self.inner.state) {
            State::Host(host) => Some(host.discovery_addr),
            _ => None,
        }
    }

    /// The host endpoint a client session is connected to.
    pub fn host_addr(&self) -> Option<SocketAddr> {
        match &*lock(&self.inner.state) {
            State::Client(client) => Some(client.host_addr),
            _ => None,
        }
    }
}

impl Inner {
    /// Delivers `message` to every listener in registration order. A panicking
    /// listener is logged and skipped.
    fn notify(&self, message: &NetworkMessage) {
        let listeners: Vec<Arc<dyn MessageListener>> = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        for listener in listeners {
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| listener.on_message(message)));
            if delivered.is_err() {
                error!(
                    "Listener panicked while handling {:?} message",
                    message.message_type()
                );
            }
        }
    }

    fn send(&self, message: &NetworkMessage, excluded: Option<ClientId>) {
        let Some(frame) = encode_or_log(message) else {
            return;
        };

        let client_outbound = {
            let state = lock(&self.state);
            match &*state {
                State::Host(_) => None,
                State::Client(client) => Some(client.outbound.clone()),
                State::Idle => {
                    debug!("Dropping {:?} message: session idle", message.message_type());
                    return;
                }
            }
        };

        match client_outbound {
            Some(outbound) => match outbound.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(
                        "Dropping {:?} message: send queue to host is full",
                        message.message_type()
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Dropping message: host connection closed");
                }
            },
            None => {
                let mut stalled = Vec::new();
                for peer in self.peers.iter() {
                    let id = *peer.key();
                    if Some(id) == excluded || !self.roster.contains_key(&id) {
                        continue;
                    }
                    match peer.outbound.try_send(frame.clone()) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => stalled.push(id),
                        Err(TrySendError::Closed(_)) => {
                            debug!("Dropping message to client {}: connection closed", id);
                        }
                    }
                }
                for id in stalled {
                    self.drop_stalled(id);
                }
            }
        }
    }

    fn send_frame_to(&self, client_id: ClientId, frame: Vec<u8>) -> bool {
        let queued = match self.peers.get(&client_id) {
            Some(peer) => peer.outbound.try_send(frame),
            None => {
                warn!("No connection for client {}", client_id);
                return false;
            }
        };

        match queued {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.drop_stalled(client_id);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Closes a connection whose send queue overflowed. Frames still queued
    /// for it are discarded.
    fn drop_stalled(&self, connection_id: ClientId) {
        let Some((_, peer)) = self.peers.remove(&connection_id) else {
            return;
        };
        warn!(
            "Client {} at {} is not reading; closing its connection",
            connection_id, peer.addr
        );
        peer.writer.abort();
        if let Some(reader) = peer.reader {
            reader.abort();
        }
        self.connection_closed(connection_id);
    }

    fn register_peer(self: &Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle for {}: {}", addr, e);
        }

        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let (reader, writer) = stream.into_split();
        let (outbound, outbound_rx) = mpsc::channel(self.config.send_queue_capacity.max(1));

        let writer = tokio::spawn(write_loop(writer, outbound_rx, self.config.max_frame_size));
        self.peers.insert(
            id,
            Peer {
                addr,
                outbound,
                reader: None,
                writer: writer.abort_handle(),
            },
        );

        let reader = tokio::spawn(host_read_loop(Arc::clone(self), id, reader));
        if let Some(mut peer) = self.peers.get_mut(&id) {
            peer.reader = Some(reader.abort_handle());
        }

        info!("Accepted connection {} from {}", id, addr);
    }

    fn handle_host_inbound(&self, connection_id: ClientId, mut message: NetworkMessage) -> Flow {
        let handshaken = self.roster.contains_key(&connection_id);

        match &mut message.body {
            MessageBody::Connection(hello) => {
                return self.handshake(connection_id, hello, message.timestamp);
            }
            MessageBody::Disconnection(bye) => {
                bye.client_id = Some(connection_id);
                if self.roster.remove(&connection_id).is_some() {
                    info!("Client {} left: {}", connection_id, bye.reason);
                    self.notify(&message);
                }
                return Flow::Continue;
            }
            _ if !handshaken => {
                warn!(
                    "Ignoring {:?} message from connection {} before handshake",
                    message.message_type(),
                    connection_id
                );
                return Flow::Continue;
            }
            MessageBody::PlayerState(state) => state.client_id = connection_id,
            MessageBody::Input(input) => input.client_id = connection_id,
            MessageBody::Experience(experience) => experience.client_id = connection_id,
            MessageBody::Chat(chat) => chat.client_id = connection_id,
            MessageBody::Damage(damage) => damage.source_id = connection_id,
            _ => {}
        }

        self.notify(&message);
        Flow::Continue
    }

    fn handshake(&self, connection_id: ClientId, hello: &ConnectionMessage, timestamp: u64) -> Flow {
        let remote_players = self
            .roster
            .iter()
            .filter(|entry| *entry.key() != HOST_CLIENT_ID)
            .count();
        let rejoining = self.roster.contains_key(&connection_id);

        if !rejoining && remote_players >= self.config.max_clients {
            warn!(
                "Rejecting '{}' on connection {}: server full",
                hello.player_name, connection_id
            );
            let verdict = NetworkMessage::new(ConnectionMessage {
                client_id: None,
                player_name: hello.player_name.clone(),
                is_host: false,
                accepted: false,
                server_message: SERVER_FULL_MESSAGE.to_string(),
            });
            if let Some(frame) = encode_or_log(&verdict) {
                self.send_frame_to(connection_id, frame);
            }
            return Flow::Close;
        }

        let verdict = NetworkMessage::new(ConnectionMessage {
            client_id: Some(connection_id),
            player_name: hello.player_name.clone(),
            is_host: false,
            accepted: true,
            server_message: WELCOME_MESSAGE.to_string(),
        });
        if let Some(frame) = encode_or_log(&verdict) {
            self.send_frame_to(connection_id, frame);
        }
        self.roster.insert(connection_id, hello.player_name.clone());
        info!("Player '{}' joined as client {}", hello.player_name, connection_id);

        let mut joined = hello.clone();
        joined.client_id = Some(connection_id);
        self.notify(&NetworkMessage::with_timestamp(timestamp, joined));

        Flow::Continue
    }

    fn close_peer(&self, connection_id: ClientId) {
        // Dropping the sender lets the writer flush what is queued, then close.
        self.peers.remove(&connection_id);
    }

    fn connection_closed(&self, connection_id: ClientId) {
        self.peers.remove(&connection_id);
        if self.roster.remove(&connection_id).is_some() {
            info!("Client {} disconnected", connection_id);
            self.notify(&NetworkMessage::new(DisconnectionMessage {
                client_id: Some(connection_id),
                reason: CLIENT_DISCONNECTED.to_string(),
            }));
        } else {
            debug!("Connection {} closed", connection_id);
        }
    }

    fn handle_datagram(&self, message: NetworkMessage, from: SocketAddr) {
        let sender = match &message.body {
            MessageBody::Input(input) => input.client_id,
            MessageBody::PlayerState(state) => state.client_id,
            _ => {
                warn!(
                    "Ignoring {:?} datagram from {}: not carried unreliably",
                    message.message_type(),
                    from
                );
                return;
            }
        };

        let known = self
            .peers
            .get(&sender)
            .map(|peer| peer.addr.ip() == from.ip())
            .unwrap_or(false);
        if sender == HOST_CLIENT_ID || !known || !self.roster.contains_key(&sender) {
            warn!("Ignoring datagram from {} claiming client {}", from, sender);
            return;
        }

        self.notify(&message);
    }

    fn handle_client_inbound(&self, epoch: u64, message: NetworkMessage) {
        if let MessageBody::Connection(verdict) = &message.body {
            if verdict.accepted {
                *lock(&self.client_id) = verdict.client_id;
                info!(
                    "Connection accepted, assigned ID: {:?} ({})",
                    verdict.client_id, verdict.server_message
                );
                self.notify(&message);
            } else {
                warn!("Connection rejected: {}", verdict.server_message);
                self.notify(&message);
                self.end_client(Some(epoch), CLIENT_DISCONNECTED, true);
            }
            return;
        }

        self.notify(&message);
    }

    /// Leaves the client role. `epoch` restricts teardown to the connection it
    /// names, so a stale reader cannot tear down a newer connection.
    fn end_client(&self, epoch: Option<u64>, reason: &str, announce: bool) {
        let client = {
            let mut state = lock(&self.state);
            let current = match &*state {
                State::Client(client) => client.epoch,
                _ => return,
            };
            if epoch.is_some_and(|e| e != current) {
                return;
            }
            match std::mem::replace(&mut *state, State::Idle) {
                State::Client(client) => client,
                _ => return,
            }
        };

        let client_id = lock(&self.client_id).take();
        let bye = NetworkMessage::new(DisconnectionMessage {
            client_id,
            reason: reason.to_string(),
        });

        if announce {
            if let Some(frame) = encode_or_log(&bye) {
                let _ = client.outbound.try_send(frame);
            }
        }
        client.reader.abort();
        drop(client);

        self.connected.store(false, Ordering::SeqCst);
        info!("Left host: {}", reason);
        self.notify(&bye);
    }
}

fn unspecified(like: IpAddr) -> SocketAddr {
    match like {
        IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    }
}

fn encode_or_log(message: &NetworkMessage) -> Option<Vec<u8>> {
    match codec::encode(message) {
        Ok(frame) => Some(frame),
        Err(e) => {
            error!("Failed to encode {:?} message: {}", message.message_type(), e);
            None
        }
    }
}

async fn bind_host_endpoints(
    config: &NetConfig,
) -> Result<(TcpListener, UdpSocket, UdpSocket), SessionError> {
    let listener = TcpListener::bind((config.bind_ip, config.tcp_port))
        .await
        .map_err(|source| SessionError::Bind {
            endpoint: "tcp",
            port: config.tcp_port,
            source,
        })?;
    let datagrams = UdpSocket::bind((config.bind_ip, config.udp_port))
        .await
        .map_err(|source| SessionError::Bind {
            endpoint: "udp",
            port: config.udp_port,
            source,
        })?;
    let discovery = UdpSocket::bind((config.bind_ip, config.discovery_port))
        .await
        .map_err(|source| SessionError::Bind {
            endpoint: "discovery",
            port: config.discovery_port,
            source,
        })?;

    Ok((listener, datagrams, discovery))
}

async fn accept_loop(inner: Arc<Inner>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => inner.register_peer(stream, addr),
            Err(e) => {
                error!("Error accepting connection: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

async fn datagram_loop(inner: Arc<Inner>, socket: UdpSocket) {
    let mut buffer = [0u8; 2048];

    loop {
        match socket.recv_from(&mut buffer).await {
            Ok((len, from)) => match codec::decode(&buffer[..len]) {
                Ok(message) => inner.handle_datagram(message, from),
                Err(e) => warn!("Dropping datagram from {}: {}", from, e),
            },
            Err(e) => {
                error!("Error receiving datagram: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<Vec<u8>>,
    max_frame_size: u32,
) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = write_frame(&mut writer, &frame, max_frame_size).await {
            warn!("Failed to write frame: {}", e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn host_read_loop(inner: Arc<Inner>, connection_id: ClientId, mut reader: OwnedReadHalf) {
    let max_frame_size = inner.config.max_frame_size;

    loop {
        let frame = match read_frame(&mut reader, max_frame_size).await {
            Ok(frame) => frame,
            Err(CodecError::ConnectionClosed) => break,
            Err(e) => {
                warn!("Closing connection {}: {}", connection_id, e);
                break;
            }
        };

        match codec::decode(&frame) {
            Ok(message) => {
                if inner.handle_host_inbound(connection_id, message) == Flow::Close {
                    inner.close_peer(connection_id);
                    return;
                }
            }
            Err(e) => warn!("Dropping message from connection {}: {}", connection_id, e),
        }
    }

    inner.connection_closed(connection_id);
}

async fn client_read_loop(inner: Arc<Inner>, epoch: u64, mut reader: OwnedReadHalf) {
    let max_frame_size = inner.config.max_frame_size;

    loop {
        let frame = match read_frame(&mut reader, max_frame_size).await {
            Ok(frame) => frame,
            Err(CodecError::ConnectionClosed) => break,
            Err(e) => {
                warn!("Host link failed: {}", e);
                break;
            }
        };

        match codec::decode(&frame) {
            Ok(message) => inner.handle_client_inbound(epoch, message),
            Err(e) => warn!("Dropping message from host: {}", e),
        }
    }

    inner.end_client(Some(epoch), HOST_LOST, false);
}
