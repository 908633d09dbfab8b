use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};
use star_siege_core::{
    EntityRegistry, PacingEvent, PacingObserver, PowerUpRate, ScenarioConfig, ScoreSink,
    TracingObserver,
};
use star_siege_system_scheduling::{
    DelaySource, Scheduler, TaskControl, TaskState, TimedTask, UniformDelay,
};

use crate::{
    difficulty::{eligible_pool, DifficultyCurve, ScenarioDifficultyManager},
    factory::{Scenario, ScenarioFactory},
    PacingConfig, PacingError,
};

/// Session collaborators the scenario manager reports to.
#[derive(Clone)]
pub struct Collaborators {
    registry: Arc<dyn EntityRegistry>,
    scores: Arc<dyn ScoreSink>,
    observer: Arc<dyn PacingObserver>,
}

impl Collaborators {
    /// Bundles the live-entity registry and scoring sink. Pacing events are
    /// forwarded to `tracing` until [`Collaborators::with_observer`] replaces
    /// the hook.
    #[must_use]
    pub fn new(registry: Arc<dyn EntityRegistry>, scores: Arc<dyn ScoreSink>) -> Self {
        Self {
            registry,
            scores,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replaces the observability hook.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn PacingObserver>) -> Self {
        self.observer = observer;
        self
    }
}

/// Orchestrates timed scenario launches for one session.
///
/// The instance is single use: after [`ScenarioManager::reset`] it never
/// fires again.
pub struct ScenarioManager {
    engine: Arc<Engine>,
    task: TimedTask,
    scheduler: Scheduler,
}

struct Engine {
    catalogue: Vec<Arc<ScenarioConfig>>,
    difficulty_manager: ScenarioDifficultyManager,
    entry_difficulty: u32,
    steady_min: Duration,
    collaborators: Collaborators,
    state: Mutex<PacingState>,
}

struct PacingState {
    difficulty: u32,
    iteration: u32,
    min_interval: Duration,
    max_interval: Duration,
    pool: Vec<Arc<ScenarioConfig>>,
    powerup: PowerUpRate,
    rng: SmallRng,
}

/// Outcome of advancing the pacing state by one firing.
struct Advance {
    iteration: u32,
    tightened: Option<(Duration, Duration)>,
    raised: Option<(u32, u32, usize)>,
    selected: Option<Arc<ScenarioConfig>>,
    powerup: PowerUpRate,
}

impl ScenarioManager {
    /// Creates a manager drawing firing delays uniformly.
    pub fn new(
        catalogue: Vec<ScenarioConfig>,
        collaborators: Collaborators,
        config: PacingConfig,
    ) -> Result<Self, PacingError> {
        Self::with_delay_source(catalogue, collaborators, config, UniformDelay::new())
    }

    /// Creates a manager drawing firing delays from a custom source.
    pub fn with_delay_source<D>(
        catalogue: Vec<ScenarioConfig>,
        collaborators: Collaborators,
        config: PacingConfig,
        delays: D,
    ) -> Result<Self, PacingError>
    where
        D: DelaySource + 'static,
    {
        config.validate()?;

        let catalogue: Vec<Arc<ScenarioConfig>> = catalogue.into_iter().map(Arc::new).collect();
        let pool = eligible_pool(&catalogue, 0, config.entry_difficulty);
        if pool.is_empty() {
            return Err(PacingError::EmptyPool {
                entry_difficulty: config.entry_difficulty,
                catalogue: catalogue.len(),
            });
        }
        tracing::debug!(
            catalogue = catalogue.len(),
            eligible = pool.len(),
            "scenario manager ready"
        );

        let engine = Arc::new(Engine {
            difficulty_manager: ScenarioDifficultyManager::new(DifficultyCurve::new(
                config.difficulty_thresholds.clone(),
            )),
            entry_difficulty: config.entry_difficulty,
            steady_min: config.steady_min(),
            collaborators,
            catalogue,
            state: Mutex::new(PacingState {
                difficulty: 0,
                iteration: 0,
                min_interval: config.warmup_min(),
                max_interval: config.max(),
                pool,
                powerup: PowerUpRate::NEUTRAL,
                rng: SmallRng::from_entropy(),
            }),
        });

        let scheduler = Scheduler::new("scenario");
        let firing_engine = Arc::clone(&engine);
        let task = TimedTask::with_delay_source(
            move |control: &TaskControl| firing_engine.scheduled_task(control),
            config.warmup_min(),
            config.max(),
            &scheduler,
            delays,
        )?;

        Ok(Self {
            engine,
            task,
            scheduler,
        })
    }

    /// Resets the iteration counter and arms the timer.
    ///
    /// Starting a running manager re-arms it and discards the iteration count.
    /// After [`ScenarioManager::reset`] this does nothing.
    pub fn start(&self) {
        if self.task.state() == TaskState::Cancelled {
            tracing::debug!("start ignored after reset");
            return;
        }
        self.engine.lock().iteration = 0;
        if self.task.start() {
            self.engine.emit(PacingEvent::Started);
        }
    }

    /// Suspends scenario launches. Ignored unless the timer is armed.
    pub fn pause(&self) {
        if self.task.pause() {
            self.engine.emit(PacingEvent::Paused);
        }
    }

    /// Resumes scenario launches after a pause. Ignored otherwise.
    pub fn resume(&self) {
        if self.task.resume() {
            self.engine.emit(PacingEvent::Resumed);
        }
    }

    /// Shuts the scheduler down. No launch happens after this returns.
    ///
    /// Only the first call reports [`PacingEvent::Reset`].
    pub fn reset(&self) {
        if self.scheduler.is_shutdown() {
            return;
        }
        self.scheduler.shutdown_now();
        self.engine.emit(PacingEvent::Reset);
    }

    /// Replaces the power-up applied to future scenarios.
    pub fn set_powerup(&self, powerup: PowerUpRate) {
        self.engine.lock().powerup = powerup;
    }

    /// Power-up applied to future scenarios.
    #[must_use]
    pub fn powerup(&self) -> PowerUpRate {
        self.engine.lock().powerup
    }

    /// Current difficulty tier.
    #[must_use]
    pub fn difficulty(&self) -> u32 {
        self.engine.lock().difficulty
    }

    /// Number of firings since the last start.
    #[must_use]
    pub fn iteration(&self) -> u32 {
        self.engine.lock().iteration
    }

    /// Number of configs currently eligible for selection.
    #[must_use]
    pub fn eligible_count(&self) -> usize {
        self.engine.lock().pool.len()
    }

    /// Current firing window.
    #[must_use]
    pub fn intervals(&self) -> (Duration, Duration) {
        let state = self.engine.lock();
        (state.min_interval, state.max_interval)
    }

    /// Lifecycle state of the underlying timer.
    #[must_use]
    pub fn timer_state(&self) -> TaskState {
        self.task.state()
    }
}

impl Engine {
    fn lock(&self) -> MutexGuard<'_, PacingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: PacingEvent) {
        self.collaborators.observer.on_event(&event);
    }

    fn advance(&self, state: &mut PacingState) -> Advance {
        let mut tightened = None;
        if state.iteration == 1 && state.min_interval != self.steady_min {
            state.min_interval = self.steady_min;
            tightened = Some((state.min_interval, state.max_interval));
        }

        state.iteration = state.iteration.saturating_add(1);

        let mut raised = None;
        if let Some(next) = self
            .difficulty_manager
            .increase_difficulty(state.iteration, state.difficulty)
        {
            let previous = state.difficulty;
            state.difficulty = next;
            state.pool = eligible_pool(&self.catalogue, next, self.entry_difficulty);
            raised = Some((previous, next, state.pool.len()));
        }

        let PacingState { pool, rng, .. } = &mut *state;
        let selected = pool.choose(rng).cloned();

        Advance {
            iteration: state.iteration,
            tightened,
            raised,
            selected,
            powerup: state.powerup,
        }
    }

    fn next_scenario(&self, control: &TaskControl) -> (u32, Option<Scenario>) {
        let advance = {
            let mut state = self.lock();
            self.advance(&mut state)
        };

        if let Some((min, max)) = advance.tightened {
            control.update_intervals(min, max);
            self.emit(PacingEvent::IntervalsTightened { min, max });
        }
        if let Some((from, to, eligible)) = advance.raised {
            self.emit(PacingEvent::DifficultyRaised { from, to, eligible });
        }

        let scenario = advance
            .selected
            .map(|config| ScenarioFactory::create_one_scenario(&config, advance.powerup));
        (advance.iteration, scenario)
    }

    fn scheduled_task(&self, control: &TaskControl) -> bool {
        let (iteration, scenario) = self.next_scenario(control);
        let Some(scenario) = scenario else {
            self.emit(PacingEvent::PoolExhausted { iteration });
            return false;
        };

        let score = scenario.difficulty();
        let difficulty = scenario.config().difficulty();
        self.collaborators.scores.record(score);
        let spawned = scenario.start(self.collaborators.registry.as_ref());
        self.emit(PacingEvent::ScenarioLaunched {
            iteration,
            difficulty,
            score,
            enemies: spawned.len(),
        });
        true
    }
}
