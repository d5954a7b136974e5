//! A small stand-in simulation for running a host without the game.
//!
//! The host player walks in a circle while a horde of enemies drifts toward
//! it. Enemies take random hits and die; the horde is topped back up to its
//! target size, so the sync loop sees a steady stream of arrivals and
//! departures.

use rand::Rng;
use shared::{
    DifficultyLevel, EnemySnapshot, EntityHandle, MapType, PlayerSnapshot, RunSnapshot,
    WeaponType,
};
use std::sync::{Mutex, MutexGuard};

use crate::game::HostWorld;

const ENEMY_KINDS: [(&str, i32, f32); 3] = [
    ("BasicEnemy", 30, 60.0),
    ("FastEnemy", 20, 110.0),
    ("TankEnemy", 120, 35.0),
];
const ORBIT_RADIUS: f32 = 150.0;
const SPAWN_RADIUS: f32 = 600.0;
const BOSS_TIME: f32 = 300.0;
const RUN_LENGTH: f32 = 600.0;

#[derive(Debug, Clone)]
struct DemoEnemy {
    handle: EntityHandle,
    kind: usize,
    position: (f32, f32),
    health: i32,
}

struct DemoState {
    game_time: f32,
    player: PlayerSnapshot,
    enemies: Vec<DemoEnemy>,
    next_handle: u64,
    boss_spawned: bool,
}

/// Simulated world driven by [`DemoWorld::step`].
pub struct DemoWorld {
    target_enemies: usize,
    state: Mutex<DemoState>,
}

impl DemoWorld {
    pub fn new(target_enemies: usize) -> Self {
        let world = Self {
            target_enemies,
            state: Mutex::new(DemoState {
                game_time: 0.0,
                player: PlayerSnapshot {
                    position: (ORBIT_RADIUS, 0.0),
                    weapon_type: WeaponType::Simple,
                    ..PlayerSnapshot::default()
                },
                enemies: Vec::with_capacity(target_enemies),
                next_handle: 1,
                boss_spawned: false,
            }),
        };
        world.refill(&mut world.lock());
        world
    }

    fn lock(&self) -> MutexGuard<'_, DemoState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn refill(&self, state: &mut DemoState) {
        let mut rng = rand::thread_rng();
        while state.enemies.len() < self.target_enemies {
            let angle = rng.gen_range(0.0..std::f32::consts::TAU);
            let kind = rng.gen_range(0..ENEMY_KINDS.len());
            state.enemies.push(DemoEnemy {
                handle: EntityHandle(state.next_handle),
                kind,
                position: (SPAWN_RADIUS * angle.cos(), SPAWN_RADIUS * angle.sin()),
                health: ENEMY_KINDS[kind].1,
            });
            state.next_handle += 1;
        }
    }

    /// Advances the simulation by `dt` seconds.
    pub fn step(&self, dt: f32) {
        let mut state = self.lock();
        let mut rng = rand::thread_rng();

        state.game_time += dt;
        let t = state.game_time * 0.5;
        let previous = state.player.position;
        state.player.position = (ORBIT_RADIUS * t.cos(), ORBIT_RADIUS * t.sin());
        state.player.direction = shared::normalize_vector(
            state.player.position.0 - previous.0,
            state.player.position.1 - previous.1,
        );

        let target = state.player.position;
        for enemy in state.enemies.iter_mut() {
            let (dx, dy) = shared::normalize_vector(
                target.0 - enemy.position.0,
                target.1 - enemy.position.1,
            );
            let speed = ENEMY_KINDS[enemy.kind].2;
            enemy.position.0 += dx * speed * dt;
            enemy.position.1 += dy * speed * dt;

            if rng.gen_bool((dt as f64 * 0.5).min(1.0)) {
                enemy.health -= rng.gen_range(5..=25);
            }
        }

        let before = state.enemies.len();
        state.enemies.retain(|enemy| enemy.health > 0);
        let killed = (before - state.enemies.len()) as i32;
        state.player.experience_points += killed * 10;
        state.player.level = 1 + state.player.experience_points / 100;

        if state.game_time >= BOSS_TIME {
            state.boss_spawned = true;
        }
        self.refill(&mut state);
    }

    pub fn enemy_count(&self) -> usize {
        self.lock().enemies.len()
    }

    pub fn game_time(&self) -> f32 {
        self.lock().game_time
    }
}

impl HostWorld for DemoWorld {
    fn local_player(&self) -> PlayerSnapshot {
        self.lock().player.clone()
    }

    fn live_enemies(&self) -> Vec<EnemySnapshot> {
        self.lock()
            .enemies
            .iter()
            .map(|enemy| EnemySnapshot {
                handle: enemy.handle,
                enemy_type: ENEMY_KINDS[enemy.kind].0.to_string(),
                position: enemy.position,
                health: enemy.health,
                alive: enemy.health > 0,
            })
            .collect()
    }

    fn run_state(&self) -> RunSnapshot {
        let state = self.lock();
        RunSnapshot {
            game_time: state.game_time,
            difficulty_level: 1 + (state.game_time / 60.0) as i32,
            map_type: MapType::Forest,
            difficulty: DifficultyLevel::Normal,
            boss_spawned: state.boss_spawned,
            boss_announced: state.boss_spawned,
            game_over: state.game_time >= RUN_LENGTH,
            game_won: state.game_time >= RUN_LENGTH && state.player.health > 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::collections::HashSet;

    #[test]
    fn test_world_starts_full() {
        let world = DemoWorld::new(12);
        assert_eq!(world.enemy_count(), 12);
        assert_eq!(world.live_enemies().len(), 12);
        assert!(world.live_enemies().iter().all(|e| e.alive));
    }

    #[test]
    fn test_step_advances_clock_and_player() {
        let world = DemoWorld::new(0);
        let before = world.local_player().position;

        world.step(0.5);

        assert_approx_eq!(world.game_time(), 0.5);
        let after = world.local_player().position;
        assert!(before != after);

        let (dx, dy) = world.local_player().direction;
        assert_approx_eq!((dx * dx + dy * dy).sqrt(), 1.0, 1e-4);
    }

    #[test]
    fn test_horde_is_replenished_with_fresh_handles() {
        let world = DemoWorld::new(8);
        let first: HashSet<EntityHandle> =
            world.live_enemies().iter().map(|e| e.handle).collect();

        for _ in 0..200 {
            world.step(0.1);
        }

        assert_eq!(world.enemy_count(), 8);
        let now: HashSet<EntityHandle> = world.live_enemies().iter().map(|e| e.handle).collect();
        // Over 20 simulated seconds some enemies have died and been replaced
        assert!(now.difference(&first).count() > 0);
        assert!(world.local_player().experience_points > 0);
    }

    #[test]
    fn test_run_state_flags() {
        let world = DemoWorld::new(0);
        assert!(!world.run_state().boss_spawned);

        world.step(BOSS_TIME);
        let run = world.run_state();
        assert!(run.boss_spawned);
        assert!(!run.game_over);
        assert_eq!(run.difficulty_level, 6);

        world.step(RUN_LENGTH);
        let run = world.run_state();
        assert!(run.game_over);
        assert!(run.game_won);
    }
}
