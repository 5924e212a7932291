//! Experience → level thresholding.
//!
//! A member at level `L` levels up once their accumulated experience reaches
//! `L * threshold`. The gate always uses the level *before* the increment and a
//! single processed delta awards at most one level, even when it overshoots
//! several thresholds. Levels never go down.

use serde::{Deserialize, Serialize};

pub const DEFAULT_LEVEL_THRESHOLD: i64 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelingRule {
    pub threshold_per_level: i64,
    pub clamp_negative_exp: bool,
}

impl Default for LevelingRule {
    fn default() -> Self {
        Self { threshold_per_level: DEFAULT_LEVEL_THRESHOLD, clamp_negative_exp: false }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelOutcome {
    pub exp: i64,
    pub level: i64,
    pub leveled_up: bool,
}

impl LevelingRule {
    pub fn threshold_for(&self, level: i64) -> i64 {
        level.saturating_mul(self.threshold_per_level)
    }

    pub fn apply(&self, exp: i64, level: i64, delta: i64) -> LevelOutcome {
        let mut next_exp = exp.saturating_add(delta);
        if self.clamp_negative_exp && next_exp < 0 {
            next_exp = 0;
        }

        let leveled_up = next_exp >= self.threshold_for(level);
        let next_level = if leveled_up { level.saturating_add(1) } else { level };

        LevelOutcome { exp: next_exp, level: next_level, leveled_up }
    }

    /// Replays a delta history from a fresh account.
    pub fn replay<I>(&self, start_level: i64, deltas: I) -> LevelOutcome
    where
        I: IntoIterator<Item = i64>,
    {
        deltas.into_iter().fold(
            LevelOutcome { exp: 0, level: start_level, leveled_up: false },
            |state, delta| self.apply(state.exp, state.level, delta),
        )
    }
}
