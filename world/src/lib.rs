#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Session state shared between the pacing engine and its adapters.
//!
//! [`InstanceManager`] is the live-entity registry that scenarios spawn into
//! and the presentation sync loop reads from. [`Scoreboard`] accumulates the
//! difficulty scores reported for every launched scenario.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
};

use star_siege_core::{Enemy, EntityHandle, EntityId, EntityKind, EntityRegistry, ScoreSink};

const SHIP_ID: EntityId = EntityId::new(0);
const FIRST_ENEMY_ID: u64 = 1;

/// Thread-safe registry of the entities alive in a session.
///
/// The player ship is created with the registry and is never removed.
/// Enemies receive monotonically increasing identifiers in spawn order.
#[derive(Debug)]
pub struct InstanceManager {
    roster: Mutex<Roster>,
}

#[derive(Debug)]
struct Roster {
    next_id: u64,
    enemies: BTreeMap<EntityId, Enemy>,
}

impl InstanceManager {
    /// Creates an empty registry holding only the player ship.
    #[must_use]
    pub fn new() -> Self {
        Self {
            roster: Mutex::new(Roster {
                next_id: FIRST_ENEMY_ID,
                enemies: BTreeMap::new(),
            }),
        }
    }

    fn roster(&self) -> MutexGuard<'_, Roster> {
        self.roster.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of enemies currently alive.
    #[must_use]
    pub fn enemy_count(&self) -> usize {
        self.roster().enemies.len()
    }

    /// Returns a copy of the enemy registered under the identifier.
    #[must_use]
    pub fn enemy(&self, id: EntityId) -> Option<Enemy> {
        self.roster().enemies.get(&id).cloned()
    }

    /// Removes every enemy, keeping the ship.
    pub fn clear(&self) {
        let mut roster = self.roster();
        let removed = roster.enemies.len();
        roster.enemies.clear();
        tracing::debug!(removed, "registry cleared");
    }
}

impl Default for InstanceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRegistry for InstanceManager {
    fn spawn(&self, enemy: Enemy) -> EntityHandle {
        let mut roster = self.roster();
        let id = EntityId::new(roster.next_id);
        roster.next_id = roster.next_id.saturating_add(1);
        let handle = EntityHandle::new(id, EntityKind::Enemy(enemy.kind()));
        let _ = roster.enemies.insert(id, enemy);
        handle
    }

    fn despawn(&self, id: EntityId) -> Option<Enemy> {
        self.roster().enemies.remove(&id)
    }

    fn snapshot(&self) -> Vec<EntityHandle> {
        let roster = self.roster();
        let mut handles = Vec::with_capacity(roster.enemies.len() + 1);
        handles.push(self.ship());
        handles.extend(
            roster
                .enemies
                .iter()
                .map(|(id, enemy)| EntityHandle::new(*id, EntityKind::Enemy(enemy.kind()))),
        );
        handles
    }

    fn ship(&self) -> EntityHandle {
        EntityHandle::new(SHIP_ID, EntityKind::Ship)
    }
}

/// Session score accumulated from launched scenarios.
#[derive(Debug, Default)]
pub struct Scoreboard {
    points: AtomicU64,
    scenarios: AtomicU32,
}

impl Scoreboard {
    /// Creates an empty scoreboard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total points accumulated so far.
    #[must_use]
    pub fn points(&self) -> u64 {
        self.points.load(Ordering::Acquire)
    }

    /// Number of scenarios that reported a score.
    #[must_use]
    pub fn scenarios(&self) -> u32 {
        self.scenarios.load(Ordering::Acquire)
    }
}

impl ScoreSink for Scoreboard {
    fn record(&self, score: u32) {
        let _ = self.points.fetch_add(u64::from(score), Ordering::AcqRel);
        let _ = self.scenarios.fetch_add(1, Ordering::AcqRel);
    }
}
