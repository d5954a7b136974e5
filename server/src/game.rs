//! Host-side view of the authoritative simulation.
//!
//! The simulation itself lives in gameplay code. The sync loop only reads it
//! through [`HostWorld`], and remembers which enemies it has announced so
//! departures can be broadcast exactly once.

use std::collections::HashSet;

use dashmap::{DashMap, DashSet};
use log::debug;
use shared::{
    EnemySnapshot, EnemyStateMessage, EntityHandle, EntityId, PlayerSnapshot, RunSnapshot,
};

/// Read access to the host's simulation, called from the sync scheduler.
pub trait HostWorld: Send + Sync + 'static {
    /// Current state of the host's own player.
    fn local_player(&self) -> PlayerSnapshot;

    /// Every enemy currently in the world.
    fn live_enemies(&self) -> Vec<EnemySnapshot>;

    /// Global run state: clock, difficulty, boss and end-of-run flags.
    fn run_state(&self) -> RunSnapshot;
}

/// Tracks the enemies that have been broadcast and retires the ones that left.
pub struct EnemyTracker {
    tracked: DashMap<EntityId, EnemyStateMessage>,
    retired: DashSet<EntityId>,
}

impl EnemyTracker {
    pub fn new() -> Self {
        Self {
            tracked: DashMap::new(),
            retired: DashSet::new(),
        }
    }

    /// Builds this cycle's enemy updates.
    ///
    /// Live enemies produce their current state. An enemy reported dead, or a
    /// previously broadcast id missing from `live`, produces one final update
    /// with `is_alive = false` and is retired: its id is never sent again.
    pub fn sync<F>(&self, live: &[EnemySnapshot], resolve: F) -> Vec<EnemyStateMessage>
    where
        F: Fn(EntityHandle) -> EntityId,
    {
        let mut updates = Vec::with_capacity(live.len());
        let mut present = HashSet::with_capacity(live.len());

        for enemy in live {
            let enemy_id = resolve(enemy.handle);
            if self.retired.contains(&enemy_id) {
                continue;
            }
            present.insert(enemy_id);

            let update = EnemyStateMessage::from_snapshot(enemy_id, enemy);
            if update.is_alive {
                self.tracked.insert(enemy_id, update.clone());
            } else {
                self.retire(enemy_id);
            }
            updates.push(update);
        }

        let departed: Vec<EntityId> = self
            .tracked
            .iter()
            .map(|entry| *entry.key())
            .filter(|id| !present.contains(id))
            .collect();

        for enemy_id in departed {
            if let Some((_, mut last)) = self.tracked.remove(&enemy_id) {
                debug!("Enemy {} left the world", enemy_id);
                last.is_alive = false;
                self.retired.insert(enemy_id);
                updates.push(last);
            }
        }

        updates
    }

    fn retire(&self, enemy_id: EntityId) {
        self.tracked.remove(&enemy_id);
        self.retired.insert(enemy_id);
    }

    /// Latest state of every tracked enemy, for a late joiner.
    pub fn snapshot(&self) -> Vec<EnemyStateMessage> {
        let mut enemies: Vec<EnemyStateMessage> =
            self.tracked.iter().map(|entry| entry.value().clone()).collect();
        enemies.sort_by_key(|enemy| enemy.enemy_id);
        enemies
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    pub fn is_retired(&self, enemy_id: EntityId) -> bool {
        self.retired.contains(&enemy_id)
    }
}

impl Default for EnemyTracker {
    fn default() -> Self {
        Self::new()
    }
}
