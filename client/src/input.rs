//! Turns the local player's controls into input messages for the host

use shared::{normalize_vector, ClientId, InputMessage};

/// Controls of the local player at one instant, as gameplay code sees them
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputSnapshot {
    pub move_x: f32,
    pub move_y: f32,
    pub is_firing: bool,
    pub is_charging: bool,
    pub is_dashing: bool,
    /// Held state of the weapon-switch control
    pub switch_weapon: bool,
    /// Held state of the auto-target control
    pub toggle_auto_target: bool,
}

/// Builds input messages from snapshots.
///
/// Movement is normalized so diagonal input is not faster. The switch-weapon
/// and auto-target controls are toggles, so they are sent only on the sample
/// where they go from released to held.
pub struct InputManager {
    prev_switch_weapon: bool,
    prev_toggle_auto_target: bool,
    samples: u64,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            prev_switch_weapon: false,
            prev_toggle_auto_target: false,
            samples: 0,
        }
    }

    pub fn sample(&mut self, client_id: ClientId, snapshot: &InputSnapshot) -> InputMessage {
        let (move_x, move_y) = normalize_vector(snapshot.move_x, snapshot.move_y);

        // Detect press events (current && !previous)
        let switch_weapon = snapshot.switch_weapon && !self.prev_switch_weapon;
        let toggle_auto_target = snapshot.toggle_auto_target && !self.prev_toggle_auto_target;

        self.prev_switch_weapon = snapshot.switch_weapon;
        self.prev_toggle_auto_target = snapshot.toggle_auto_target;
        self.samples += 1;

        InputMessage {
            client_id,
            move_x,
            move_y,
            is_firing: snapshot.is_firing,
            is_charging: snapshot.is_charging,
            is_dashing: snapshot.is_dashing,
            switch_weapon,
            toggle_auto_target,
        }
    }

    /// Number of input messages built so far
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Forgets held toggles, e.g. after reconnecting
    pub fn reset(&mut self) {
        self.prev_switch_weapon = false;
        self.prev_toggle_auto_target = false;
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}
