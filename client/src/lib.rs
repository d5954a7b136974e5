//! # Client Sync Library
//!
//! Runs on a process that joined a match. While the shared [`Session`] is in
//! the client role, [`GameClient`] pushes the local player's input to the host
//! at a fixed rate and folds everything the host publishes into local mirrors.
//!
//! ## Inbound Handling
//!
//! - **Player state**: creates or updates the mirror of that remote player.
//!   State about this client's own player is never mirrored.
//! - **Enemy state**: updates the matching local enemy, or removes it when
//!   the host reports it gone. Enemies the game has not created are logged.
//! - **Game state**: overwrites the local copy of the run state.
//! - **Damage**: applied to the local player when it is the target, otherwise
//!   to the matching enemy.
//! - **Spawn**: handed to the game, which owns object creation.
//!
//! ## Module Organization
//!
//! - `game`: the [`ClientWorld`] seam, remote player mirrors and run copy
//! - `input`: input sampling with normalized movement and toggle detection
//! - `network`: the [`GameClient`] input task and message handling
//! - `console`: a headless world for the `client` binary
//!
//! [`Session`]: shared::Session
//! [`GameClient`]: network::GameClient
//! [`ClientWorld`]: game::ClientWorld

pub mod console;
pub mod game;
pub mod input;
pub mod network;
