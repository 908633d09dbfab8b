#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Star Siege pacing engine.
//!
//! This crate defines the data and collaborator surface that connects the
//! scheduling systems, the session world, and the presentation adapters.
//! Scenario catalogues are described by [`ScenarioConfig`] values, the
//! scenario systems materialise them into [`Enemy`] values, hand those to an
//! [`EntityRegistry`], report scores to a [`ScoreSink`], and announce every
//! pacing decision to a [`PacingObserver`] as a [`PacingEvent`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Unique identifier assigned to an entity by the live-entity registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates a new entity identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

/// Enemy variants known to the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EnemyKind {
    /// Light and fast baseline enemy. Also used for unrecognised type keys.
    Scout,
    /// Slower, heavily armoured enemy with a stronger weapon.
    Striker,
}

impl EnemyKind {
    /// Type key used by scenario catalogues to request this variant.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::Scout => "enemy1",
            Self::Striker => "enemy2",
        }
    }

    /// Stats assigned to the variant before any overrides or power-ups.
    #[must_use]
    pub const fn base_stats(&self) -> EnemyStats {
        match self {
            Self::Scout => EnemyStats::new(4.0, 10.0, 1.0),
            Self::Striker => EnemyStats::new(2.5, 30.0, 3.0),
        }
    }
}

/// Combat stats carried by a materialised enemy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnemyStats {
    /// Travel speed in world units per second.
    pub speed: f32,
    /// Hit points the enemy starts with.
    pub health: f32,
    /// Damage dealt per hit.
    pub damage: f32,
}

impl EnemyStats {
    /// Creates a new stat block.
    #[must_use]
    pub const fn new(speed: f32, health: f32, damage: f32) -> Self {
        Self {
            speed,
            health,
            damage,
        }
    }
}

/// Multiplier triple applied to enemies at construction time.
///
/// Values are immutable; changing the active power-up means replacing the
/// whole rate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PowerUpRate {
    speed: f32,
    health: f32,
    damage: f32,
}

impl PowerUpRate {
    /// Rate that leaves stats untouched.
    pub const NEUTRAL: Self = Self::new(1.0, 1.0, 1.0);

    /// Creates a new rate from the speed, health and damage multipliers.
    #[must_use]
    pub const fn new(speed: f32, health: f32, damage: f32) -> Self {
        Self {
            speed,
            health,
            damage,
        }
    }

    /// Speed multiplier.
    #[must_use]
    pub const fn speed(&self) -> f32 {
        self.speed
    }

    /// Health multiplier.
    #[must_use]
    pub const fn health(&self) -> f32 {
        self.health
    }

    /// Damage multiplier.
    #[must_use]
    pub const fn damage(&self) -> f32 {
        self.damage
    }

    /// Returns the provided stats scaled by this rate.
    #[must_use]
    pub fn apply(&self, stats: EnemyStats) -> EnemyStats {
        EnemyStats::new(
            stats.speed * self.speed,
            stats.health * self.health,
            stats.damage * self.damage,
        )
    }
}

impl Default for PowerUpRate {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Two dimensional spawn position expressed in world units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f32,
    /// Vertical coordinate.
    pub y: f32,
}

impl Position {
    /// Creates a new position.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Optional per-enemy overrides read from a scenario catalogue.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnemyParameters {
    /// Replaces the variant's base speed when present.
    pub speed: Option<f32>,
    /// Replaces the variant's base health when present.
    pub health: Option<f32>,
    /// Replaces the variant's base damage when present.
    pub damage: Option<f32>,
    /// Spawn position of the enemy.
    pub position: Position,
}

impl EnemyParameters {
    /// Resolves the final stats for a variant by applying the overrides.
    #[must_use]
    pub fn resolve(&self, base: EnemyStats) -> EnemyStats {
        EnemyStats::new(
            self.speed.unwrap_or(base.speed),
            self.health.unwrap_or(base.health),
            self.damage.unwrap_or(base.damage),
        )
    }
}

/// Declarative description of a single enemy inside a scenario.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnemyConfig {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    parameters: EnemyParameters,
}

impl EnemyConfig {
    /// Creates a new enemy description from its type key and parameters.
    #[must_use]
    pub fn new(kind: impl Into<String>, parameters: EnemyParameters) -> Self {
        Self {
            kind: kind.into(),
            parameters,
        }
    }

    /// Type key naming the variant to construct.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Overrides applied to the variant.
    #[must_use]
    pub fn parameters(&self) -> &EnemyParameters {
        &self.parameters
    }
}

/// Timing knobs attached to a scenario.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingParams {
    /// Delay between the activation of consecutive enemies, in milliseconds.
    pub spawn_spacing_ms: u64,
}

impl TimingParams {
    /// Delay between the activation of consecutive enemies.
    #[must_use]
    pub const fn spawn_spacing(&self) -> Duration {
        Duration::from_millis(self.spawn_spacing_ms)
    }
}

/// Declarative description of a scenario loaded from a catalogue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    difficulty: u32,
    #[serde(rename = "enemy", default)]
    enemies: Vec<EnemyConfig>,
    #[serde(default)]
    timing: TimingParams,
}

impl ScenarioConfig {
    /// Creates a new scenario description.
    #[must_use]
    pub fn new(difficulty: u32, enemies: Vec<EnemyConfig>, timing: TimingParams) -> Self {
        Self {
            difficulty,
            enemies,
            timing,
        }
    }

    /// Difficulty tag gating when the scenario becomes eligible.
    #[must_use]
    pub const fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Enemies composing the scenario, in spawn order.
    #[must_use]
    pub fn enemies(&self) -> &[EnemyConfig] {
        &self.enemies
    }

    /// Timing knobs of the scenario.
    #[must_use]
    pub const fn timing(&self) -> TimingParams {
        self.timing
    }
}

/// Concrete enemy produced by the instantiator.
#[derive(Clone, Debug, PartialEq)]
pub struct Enemy {
    kind: EnemyKind,
    stats: EnemyStats,
    position: Position,
    activation_delay: Duration,
}

impl Enemy {
    /// Creates a new enemy with final stats.
    #[must_use]
    pub const fn new(kind: EnemyKind, stats: EnemyStats, position: Position) -> Self {
        Self {
            kind,
            stats,
            position,
            activation_delay: Duration::ZERO,
        }
    }

    /// Returns the enemy delayed by the provided activation offset.
    #[must_use]
    pub const fn with_activation_delay(mut self, delay: Duration) -> Self {
        self.activation_delay = delay;
        self
    }

    /// Variant of the enemy.
    #[must_use]
    pub const fn kind(&self) -> EnemyKind {
        self.kind
    }

    /// Final stats of the enemy.
    #[must_use]
    pub const fn stats(&self) -> EnemyStats {
        self.stats
    }

    /// Spawn position of the enemy.
    #[must_use]
    pub const fn position(&self) -> Position {
        self.position
    }

    /// Offset from the scenario start after which the enemy becomes active.
    #[must_use]
    pub const fn activation_delay(&self) -> Duration {
        self.activation_delay
    }
}

/// Category of a displayable entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Backdrop that always occupies the first slot of the rendering root.
    Background,
    /// Player ship.
    Ship,
    /// Spawned enemy of the provided variant.
    Enemy(EnemyKind),
}

/// Lightweight reference to an entity that adapters can display.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntityHandle {
    id: EntityId,
    kind: EntityKind,
}

impl EntityHandle {
    /// Creates a new handle.
    #[must_use]
    pub const fn new(id: EntityId, kind: EntityKind) -> Self {
        Self { id, kind }
    }

    /// Identifier of the referenced entity.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Category of the referenced entity.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }
}

/// Live-entity registry owned by the session.
///
/// Implementations are shared between the scheduler thread, which spawns
/// scenario enemies, and the presentation sync loop, which reads snapshots.
pub trait EntityRegistry: Send + Sync {
    /// Inserts an enemy and returns the handle assigned to it.
    fn spawn(&self, enemy: Enemy) -> EntityHandle;

    /// Removes an enemy, returning it when it was present.
    fn despawn(&self, id: EntityId) -> Option<Enemy>;

    /// Captures the handles of every live entity, the ship included.
    fn snapshot(&self) -> Vec<EntityHandle>;

    /// Handle of the player ship.
    fn ship(&self) -> EntityHandle;
}

/// Scoring collaborator notified whenever a scenario launches.
pub trait ScoreSink: Send + Sync {
    /// Records the difficulty score of a launched scenario.
    fn record(&self, score: u32);
}

/// Structured notifications emitted by the scenario manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PacingEvent {
    /// The manager armed its timer.
    Started,
    /// The manager paused its timer.
    Paused,
    /// The manager resumed its timer.
    Resumed,
    /// The manager shut its scheduler down.
    Reset,
    /// The firing window narrowed from the warm-up range.
    IntervalsTightened {
        /// New minimum delay between firings.
        min: Duration,
        /// Maximum delay between firings.
        max: Duration,
    },
    /// The difficulty tier increased.
    DifficultyRaised {
        /// Tier before the increase.
        from: u32,
        /// Tier after the increase.
        to: u32,
        /// Number of configs eligible after the pool was recomputed.
        eligible: usize,
    },
    /// A scenario was materialised and started.
    ScenarioLaunched {
        /// Iteration that produced the scenario.
        iteration: u32,
        /// Difficulty tag of the selected config.
        difficulty: u32,
        /// Difficulty score reported to the scoring sink.
        score: u32,
        /// Number of enemies spawned.
        enemies: usize,
    },
    /// No eligible scenario existed; the timer stops itself.
    PoolExhausted {
        /// Iteration that found the pool empty.
        iteration: u32,
    },
}

/// Observability hook injected into the scenario manager.
pub trait PacingObserver: Send + Sync {
    /// Receives a pacing event.
    fn on_event(&self, event: &PacingEvent);
}

/// Observer that forwards pacing events to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl PacingObserver for TracingObserver {
    fn on_event(&self, event: &PacingEvent) {
        match event {
            PacingEvent::PoolExhausted { iteration } => {
                tracing::warn!(iteration, "no eligible scenario; pacing stopped");
            }
            PacingEvent::ScenarioLaunched {
                iteration,
                difficulty,
                score,
                enemies,
            } => {
                tracing::debug!(iteration, difficulty, score, enemies, "scenario launched");
            }
            PacingEvent::DifficultyRaised { from, to, eligible } => {
                tracing::info!(from, to, eligible, "difficulty raised");
            }
            PacingEvent::IntervalsTightened { min, max } => {
                tracing::info!(?min, ?max, "firing window tightened");
            }
            other => tracing::info!(event = ?other, "pacing state changed"),
        }
    }
}
