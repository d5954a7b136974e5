//! Players the host knows about and their latest reported state.
//!
//! The transport session owns the connection roster; the client manager keeps
//! what the sync loop needs on top of it: each player's name and the last
//! `PlayerStateMessage` seen for them, which is replayed to late joiners.

use dashmap::DashMap;
use log::info;
use shared::{ClientId, PlayerStateMessage};

#[derive(Debug, Clone)]
pub struct TrackedPlayer {
    pub name: String,
    /// `None` until the player has reported its first state.
    pub last_state: Option<PlayerStateMessage>,
}

impl TrackedPlayer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            last_state: None,
        }
    }
}

/// Concurrent table of tracked players, written from the session's I/O tasks
/// and read from the sync scheduler.
pub struct ClientManager {
    players: DashMap<ClientId, TrackedPlayer>,
}

impl ClientManager {
    pub fn new() -> Self {
        Self {
            players: DashMap::new(),
        }
    }

    /// Starts tracking a player. A repeated join keeps the known state and
    /// only refreshes the name.
    pub fn add_player(&self, client_id: ClientId, name: &str) {
        self.players
            .entry(client_id)
            .and_modify(|player| player.name = name.to_string())
            .or_insert_with(|| TrackedPlayer::new(name));
        info!("Tracking player {} ('{}')", client_id, name);
    }

    pub fn remove_player(&self, client_id: ClientId) -> bool {
        match self.players.remove(&client_id) {
            Some((_, player)) => {
                info!("Stopped tracking player {} ('{}')", client_id, player.name);
                true
            }
            None => false,
        }
    }

    /// Records the latest state for a tracked player. Returns false for an id
    /// that is not tracked; the state is dropped.
    pub fn update_state(&self, state: &PlayerStateMessage) -> bool {
        match self.players.get_mut(&state.client_id) {
            Some(mut player) => {
                player.last_state = Some(state.clone());
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, client_id: ClientId) -> bool {
        self.players.contains_key(&client_id)
    }

    pub fn name_of(&self, client_id: ClientId) -> Option<String> {
        self.players.get(&client_id).map(|player| player.name.clone())
    }

    /// Latest known state of every player that has reported one, by id.
    pub fn snapshot(&self) -> Vec<PlayerStateMessage> {
        let mut states: Vec<PlayerStateMessage> = self
            .players
            .iter()
            .filter_map(|entry| entry.value().last_state.clone())
            .collect();
        states.sort_by_key(|state| state.client_id);
        states
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

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}
