//! Client-side mirrors of the host's simulation.
//!
//! Remote players are mirrored here directly. Enemies, the local player and
//! everything spawned belong to gameplay code, reached through [`ClientWorld`].

use dashmap::DashMap;
use log::debug;
use shared::{ClientId, EntityId, GameStateMessage, PlayerStateMessage, SpawnMessage};
use std::sync::{Mutex, MutexGuard};

use crate::input::InputSnapshot;

/// What the client sync loop needs from the local game.
pub trait ClientWorld: Send + Sync + 'static {
    /// Overwrites the enemy mirrored under `enemy_id`. Returns false when no
    /// local enemy carries that id.
    fn update_enemy(&self, enemy_id: EntityId, position: (f32, f32), health: i32) -> bool;

    /// Marks the enemy mirrored under `enemy_id` for removal. Returns false
    /// when no local enemy carries that id.
    fn remove_enemy(&self, enemy_id: EntityId) -> bool;

    fn damage_local_player(&self, damage: i32, is_critical: bool);

    /// Returns false when no local enemy carries `enemy_id`.
    fn damage_enemy(&self, enemy_id: EntityId, damage: i32, is_critical: bool) -> bool;

    /// Creation of new objects announced by the host.
    fn on_spawn(&self, spawn: &SpawnMessage) {
        debug!(
            "Ignoring {} spawn {}",
            spawn.entity_type.as_str(),
            spawn.entity_id
        );
    }

    /// Current movement direction and action flags of the local player.
    fn local_input(&self) -> InputSnapshot;
}

/// A mirrored remote player.
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePlayer {
    pub client_id: ClientId,
    pub position: (f32, f32),
    pub direction: (f32, f32),
    pub health: i32,
    pub speed: f32,
    pub last_update: u64,
}

impl RemotePlayer {
    fn from_state(state: &PlayerStateMessage, timestamp: u64) -> Self {
        Self {
            client_id: state.client_id,
            position: (state.position_x, state.position_y),
            direction: (state.direction_x, state.direction_y),
            health: state.health,
            speed: state.speed,
            last_update: timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorUpdate {
    /// The state described this client's own player.
    Ignored,
    Created,
    Updated,
}

/// Mirrors of every remote player, keyed by client id.
pub struct PlayerMirrors {
    players: DashMap<ClientId, RemotePlayer>,
}

impl PlayerMirrors {
    pub fn new() -> Self {
        Self {
            players: DashMap::new(),
        }
    }

    /// Folds one player state into the mirrors. State about `own_id` is never
    /// mirrored.
    pub fn apply(
        &self,
        own_id: Option<ClientId>,
        state: &PlayerStateMessage,
        timestamp: u64,
    ) -> MirrorUpdate {
        if own_id == Some(state.client_id) {
            return MirrorUpdate::Ignored;
        }

        let mut created = false;
        self.players
            .entry(state.client_id)
            .and_modify(|player| {
                player.position = (state.position_x, state.position_y);
                player.direction = (state.direction_x, state.direction_y);
                player.health = state.health;
                player.speed = state.speed;
                player.last_update = timestamp;
            })
            .or_insert_with(|| {
                created = true;
                RemotePlayer::from_state(state, timestamp)
            });

        if created {
            MirrorUpdate::Created
        } else {
            MirrorUpdate::Updated
        }
    }

    pub fn remove(&self, client_id: ClientId) -> Option<RemotePlayer> {
        self.players.remove(&client_id).map(|(_, player)| player)
    }

    pub fn get(&self, client_id: ClientId) -> Option<RemotePlayer> {
        self.players.get(&client_id).map(|player| player.clone())
    }

    /// Every mirror, ordered by client id.
    pub fn all(&self) -> Vec<RemotePlayer> {
        let mut players: Vec<RemotePlayer> =
            self.players.iter().map(|entry| entry.value().clone()).collect();
        players.sort_by_key(|player| player.client_id);
        players
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn clear(&self) {
        self.players.clear();
    }
}

impl Default for PlayerMirrors {
    fn default() -> Self {
        Self::new()
    }
}

/// Local copy of the host's global run state.
#[derive(Default)]
pub struct RunMirror {
    latest: Mutex<Option<GameStateMessage>>,
}

impl RunMirror {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<GameStateMessage>> {
        self.latest.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn apply(&self, state: &GameStateMessage) {
        *self.lock() = Some(state.clone());
    }

    /// `None` until the first game-state message arrives.
    pub fn get(&self) -> Option<GameStateMessage> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }
}
