//! Headless stand-in for the game, used by the `client` binary.
//!
//! Materializes an enemy mirror the first time the host reports it, tracks the
//! local player's health, and steers the local player in a slow circle so the
//! host has input to relay.

use crate::game::ClientWorld;
use crate::input::InputSnapshot;
use dashmap::DashMap;
use log::info;
use shared::{EntityId, SpawnKind, SpawnMessage};
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct MirroredEnemy {
    pub position: (f32, f32),
    pub health: i32,
}

pub struct ConsoleWorld {
    enemies: DashMap<EntityId, MirroredEnemy>,
    health: AtomicI32,
    started: Instant,
}

impl ConsoleWorld {
    pub fn new() -> Self {
        Self {
            enemies: DashMap::new(),
            health: AtomicI32::new(100),
            started: Instant::now(),
        }
    }

    pub fn enemy_count(&self) -> usize {
        self.enemies.len()
    }

    pub fn enemy(&self, enemy_id: EntityId) -> Option<MirroredEnemy> {
        self.enemies.get(&enemy_id).map(|enemy| enemy.clone())
    }

    pub fn health(&self) -> i32 {
        self.health.load(Ordering::Relaxed)
    }
}

impl Default for ConsoleWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientWorld for ConsoleWorld {
    fn update_enemy(&self, enemy_id: EntityId, position: (f32, f32), health: i32) -> bool {
        self.enemies
            .insert(enemy_id, MirroredEnemy { position, health });
        true
    }

    fn remove_enemy(&self, enemy_id: EntityId) -> bool {
        self.enemies.remove(&enemy_id).is_some()
    }

    fn damage_local_player(&self, damage: i32, is_critical: bool) {
        let previous = self
            .health
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |health| {
                Some(health.saturating_sub(damage))
            })
            .unwrap_or_else(|health| health);
        let health = previous.saturating_sub(damage);
        info!(
            "Took {} damage{}, health now {}",
            damage,
            if is_critical { " (critical)" } else { "" },
            health
        );
    }

    fn damage_enemy(&self, enemy_id: EntityId, damage: i32, _is_critical: bool) -> bool {
        match self.enemies.get_mut(&enemy_id) {
            Some(mut enemy) => {
                enemy.health = enemy.health.saturating_sub(damage);
                true
            }
            None => false,
        }
    }

    fn on_spawn(&self, spawn: &SpawnMessage) {
        if spawn.entity_type == SpawnKind::Enemy {
            self.enemies.insert(
                spawn.entity_id,
                MirroredEnemy {
                    position: (spawn.position_x, spawn.position_y),
                    health: 1,
                },
            );
        }
        info!(
            "New {} spawned: ID={}",
            spawn.entity_type.as_str(),
            spawn.entity_id
        );
    }

    fn local_input(&self) -> InputSnapshot {
        let angle = self.started.elapsed().as_secs_f32() * 0.5;
        InputSnapshot {
            move_x: angle.cos(),
            move_y: angle.sin(),
            is_firing: true,
            ..InputSnapshot::default()
        }
    }
}
