use std::sync::Arc;

use star_siege_core::ScenarioConfig;

/// Iteration thresholds at which the difficulty tier increases.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DifficultyCurve {
    thresholds: Vec<u32>,
}

impl DifficultyCurve {
    /// Creates a curve from iteration thresholds. Order and duplicates do not
    /// matter.
    #[must_use]
    pub fn new(mut thresholds: Vec<u32>) -> Self {
        thresholds.sort_unstable();
        Self { thresholds }
    }

    /// Tier reached once `iteration` firings have happened.
    #[must_use]
    pub fn tier_at(&self, iteration: u32) -> u32 {
        let crossed = self.thresholds.partition_point(|threshold| *threshold <= iteration);
        u32::try_from(crossed).unwrap_or(u32::MAX)
    }
}

/// Policy deciding when the scenario manager raises its difficulty.
#[derive(Clone, Debug)]
pub struct ScenarioDifficultyManager {
    curve: DifficultyCurve,
}

impl ScenarioDifficultyManager {
    /// Creates a policy following the provided curve.
    #[must_use]
    pub fn new(curve: DifficultyCurve) -> Self {
        Self { curve }
    }

    /// Returns the new tier when `iteration` crossed a threshold above
    /// `current`, or `None` when the difficulty stays put.
    #[must_use]
    pub fn increase_difficulty(&self, iteration: u32, current: u32) -> Option<u32> {
        let target = self.curve.tier_at(iteration);
        (target > current).then_some(target)
    }
}

/// Collects the catalogue entries eligible at `difficulty`.
///
/// An entry qualifies when its tag is at most `difficulty` or below the entry
/// threshold, so raising the difficulty never removes an entry.
#[must_use]
pub fn eligible_pool(
    catalogue: &[Arc<ScenarioConfig>],
    difficulty: u32,
    entry_difficulty: u32,
) -> Vec<Arc<ScenarioConfig>> {
    catalogue
        .iter()
        .filter(|config| {
            config.difficulty() <= difficulty || config.difficulty() < entry_difficulty
        })
        .cloned()
        .collect()
}
