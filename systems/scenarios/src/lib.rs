#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Scenario pacing system that escalates and launches enemy bursts.
//!
//! [`ScenarioManager`] drives a [`TimedTask`](star_siege_system_scheduling::TimedTask)
//! whose firings advance the iteration counter, consult the
//! [`ScenarioDifficultyManager`], pick an eligible [`ScenarioConfig`]
//! uniformly at random and materialise it through the [`ScenarioFactory`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use star_siege_system_scheduling::SchedulingError;

mod difficulty;
mod factory;
mod manager;

pub use difficulty::{eligible_pool, DifficultyCurve, ScenarioDifficultyManager};
pub use factory::{Instantiator, Scenario, ScenarioFactory, DEFAULT_ENEMY_KIND};
pub use manager::{Collaborators, ScenarioManager};

#[doc(no_inline)]
pub use star_siege_core::ScenarioConfig;

/// Tuning knobs of the scenario manager.
///
/// Durations are expressed in milliseconds so catalogues can carry them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Lower bound of the warm-up window used before the window tightens.
    pub warmup_min_ms: u64,
    /// Lower bound of the steady-state window.
    pub steady_min_ms: u64,
    /// Upper bound shared by both windows (exclusive).
    pub max_ms: u64,
    /// Configs tagged below this difficulty are eligible from the start.
    pub entry_difficulty: u32,
    /// Iteration counts at which the difficulty tier increases.
    pub difficulty_thresholds: Vec<u32>,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            warmup_min_ms: 1_000,
            steady_min_ms: 500,
            max_ms: 1_500,
            entry_difficulty: 1,
            difficulty_thresholds: vec![10, 25, 45, 70, 100],
        }
    }
}

impl PacingConfig {
    /// Returns the configuration with a different warm-up lower bound.
    #[must_use]
    pub fn with_warmup_min(mut self, value: Duration) -> Self {
        self.warmup_min_ms = millis(value);
        self
    }

    /// Returns the configuration with a different steady-state lower bound.
    #[must_use]
    pub fn with_steady_min(mut self, value: Duration) -> Self {
        self.steady_min_ms = millis(value);
        self
    }

    /// Returns the configuration with a different upper bound.
    #[must_use]
    pub fn with_max(mut self, value: Duration) -> Self {
        self.max_ms = millis(value);
        self
    }

    /// Returns the configuration with different difficulty thresholds.
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: Vec<u32>) -> Self {
        self.difficulty_thresholds = thresholds;
        self
    }

    /// Lower bound of the warm-up window.
    #[must_use]
    pub const fn warmup_min(&self) -> Duration {
        Duration::from_millis(self.warmup_min_ms)
    }

    /// Lower bound of the steady-state window.
    #[must_use]
    pub const fn steady_min(&self) -> Duration {
        Duration::from_millis(self.steady_min_ms)
    }

    /// Shared upper bound of both windows.
    #[must_use]
    pub const fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    /// Checks that the steady window is no wider than the warm-up window and
    /// that both are non-empty.
    pub fn validate(&self) -> Result<(), PacingError> {
        if self.steady_min_ms > self.warmup_min_ms || self.warmup_min_ms >= self.max_ms {
            return Err(PacingError::InvalidIntervals {
                warmup_min: self.warmup_min(),
                steady_min: self.steady_min(),
                max: self.max(),
            });
        }
        Ok(())
    }
}

fn millis(value: Duration) -> u64 {
    u64::try_from(value.as_millis()).unwrap_or(u64::MAX)
}

/// Errors raised while assembling a scenario manager.
#[derive(Debug, thiserror::Error)]
pub enum PacingError {
    /// No catalogue entry is eligible at the entry difficulty.
    #[error(
        "none of the {catalogue} scenario configs is tagged below difficulty {entry_difficulty}"
    )]
    EmptyPool {
        /// Entry threshold used for filtering.
        entry_difficulty: u32,
        /// Number of configs in the catalogue.
        catalogue: usize,
    },
    /// Interval bounds are inconsistent.
    #[error(
        "invalid firing window: steady min {steady_min:?}, warm-up min {warmup_min:?}, max {max:?}"
    )]
    InvalidIntervals {
        /// Warm-up lower bound.
        warmup_min: Duration,
        /// Steady-state lower bound.
        steady_min: Duration,
        /// Shared upper bound.
        max: Duration,
    },
    /// The timer could not be created.
    #[error(transparent)]
    Scheduling(#[from] SchedulingError),
}
