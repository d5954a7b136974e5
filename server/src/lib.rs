//! # Host Sync Library
//!
//! Runs on the process that hosts a match. While the shared [`Session`] is in
//! the host role, [`GameServer`] publishes the authoritative simulation to
//! every connected client and relays what clients send to each other.
//!
//! ## Scheduled Sync
//!
//! One scheduler task drives three independent rates:
//!
//! - **Player sync** (~100 ms): the host's own player state.
//! - **Enemy sync** (~200 ms): every live enemy, keyed by its registry id.
//!   An enemy that leaves the world is announced once with `is_alive = false`
//!   and its id is never reused.
//! - **Game-state sync** (~1000 ms): the global run snapshot.
//!
//! ## Inbound Relay
//!
//! - A new player gets a private catch-up snapshot (run state, tracked
//!   enemies, known players) right after the handshake.
//! - Player state, input and chat from a client are forwarded to every other
//!   client without validation.
//! - A departure is forwarded so other clients drop their mirror.
//!
//! ## Module Organization
//!
//! - `client_manager`: tracked players and their latest reported state
//! - `game`: the [`HostWorld`] seam and enemy lifecycle tracking
//! - `network`: the [`GameServer`] scheduler and relay
//! - `simulation`: a self-contained demo world for the headless binary
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::GameServer;
//! use server::simulation::DemoWorld;
//! use shared::{NetConfig, Session, SyncRates};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::new(NetConfig::default());
//!     session.start_host("Host").await?;
//!
//!     let world = Arc::new(DemoWorld::new(20));
//!     let mut server = GameServer::new(session.clone(), world, SyncRates::default());
//!     server.start()?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await;
//!     session.stop();
//!     Ok(())
//! }
//! ```
//!
//! [`Session`]: shared::Session
//! [`GameServer`]: network::GameServer
//! [`HostWorld`]: game::HostWorld

pub mod client_manager;
pub mod game;
pub mod network;
pub mod simulation;
