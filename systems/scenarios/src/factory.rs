use std::sync::Arc;

use star_siege_core::{
    Enemy, EnemyConfig, EnemyKind, EntityHandle, EntityRegistry, PowerUpRate, ScenarioConfig,
};

type Constructor = fn(&EnemyConfig) -> Enemy;

const DEFAULT_CONSTRUCTOR: (EnemyKind, Constructor) = (EnemyKind::Scout, scout);

/// Variant constructed for type keys the instantiator does not recognise.
pub const DEFAULT_ENEMY_KIND: EnemyKind = DEFAULT_CONSTRUCTOR.0;

const CONSTRUCTORS: [(&str, Constructor); 2] = [
    (EnemyKind::Scout.key(), scout),
    (EnemyKind::Striker.key(), striker),
];

fn scout(config: &EnemyConfig) -> Enemy {
    build(EnemyKind::Scout, config)
}

fn striker(config: &EnemyConfig) -> Enemy {
    build(EnemyKind::Striker, config)
}

fn build(kind: EnemyKind, config: &EnemyConfig) -> Enemy {
    let parameters = config.parameters();
    Enemy::new(
        kind,
        parameters.resolve(kind.base_stats()),
        parameters.position,
    )
}

/// Maps enemy configs to concrete enemies.
#[derive(Clone, Copy, Debug, Default)]
pub struct Instantiator;

impl Instantiator {
    /// Builds the enemy described by `config` without any power-up.
    #[must_use]
    pub fn create_enemy(config: &EnemyConfig) -> Enemy {
        Self::constructor(config.kind())(config)
    }

    /// Builds the enemy described by `config` with `power` applied to its
    /// stats.
    #[must_use]
    pub fn create_enemy_with(config: &EnemyConfig, power: PowerUpRate) -> Enemy {
        let enemy = Self::create_enemy(config);
        Enemy::new(enemy.kind(), power.apply(enemy.stats()), enemy.position())
    }

    fn constructor(key: &str) -> Constructor {
        CONSTRUCTORS
            .iter()
            .find(|(candidate, _)| *candidate == key)
            .map(|(_, constructor)| *constructor)
            .unwrap_or_else(|| {
                tracing::debug!(key, fallback = DEFAULT_ENEMY_KIND.key(), "unknown enemy type");
                DEFAULT_CONSTRUCTOR.1
            })
    }
}

/// One-shot burst of enemies materialised from a scenario config.
///
/// Starting a scenario consumes it.
#[derive(Debug)]
pub struct Scenario {
    config: Arc<ScenarioConfig>,
    enemies: Vec<Enemy>,
    difficulty: u32,
}

impl Scenario {
    /// Difficulty score reported to the scoring sink.
    #[must_use]
    pub const fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Config the scenario was built from.
    #[must_use]
    pub fn config(&self) -> &Arc<ScenarioConfig> {
        &self.config
    }

    /// Enemies that the scenario will spawn, in spawn order.
    #[must_use]
    pub fn enemies(&self) -> &[Enemy] {
        &self.enemies
    }

    /// Places every enemy into the registry and returns their handles.
    pub fn start(self, registry: &dyn EntityRegistry) -> Vec<EntityHandle> {
        self.enemies
            .into_iter()
            .map(|enemy| registry.spawn(enemy))
            .collect()
    }
}

/// Builds runnable scenarios from catalogue entries.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScenarioFactory;

impl ScenarioFactory {
    /// Materialises `config` with `power` applied to every enemy.
    ///
    /// Enemies are staggered by the config's spawn spacing. The difficulty
    /// score is `(tag + 1) * enemy count`.
    #[must_use]
    pub fn create_one_scenario(config: &Arc<ScenarioConfig>, power: PowerUpRate) -> Scenario {
        let spacing = config.timing().spawn_spacing();
        let enemies: Vec<Enemy> = config
            .enemies()
            .iter()
            .zip(0u32..)
            .map(|(enemy, index)| {
                Instantiator::create_enemy_with(enemy, power)
                    .with_activation_delay(spacing.saturating_mul(index))
            })
            .collect();
        let count = u32::try_from(enemies.len()).unwrap_or(u32::MAX);
        let difficulty = config.difficulty().saturating_add(1).saturating_mul(count);

        Scenario {
            config: Arc::clone(config),
            enemies,
            difficulty,
        }
    }
}
