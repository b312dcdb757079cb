//! Debounce counters.
//!
//! A streak counts consecutive ticks on which a condition held. Rules act
//! once their streak reaches a threshold and reset it to zero the first tick
//! the condition fails.

use serde::Serialize;

/// Consecutive-tick counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Streak(u32);

impl Streak {
    /// Count one more confirming tick and return the new length.
    pub fn bump(&mut self) -> u32 {
        self.0 = self.0.saturating_add(1);
        self.0
    }

    pub fn reset(&mut self) {
        self.0 = 0;
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    /// Whether the streak has been confirmed `threshold` times.
    pub fn reached(&self, threshold: u32) -> bool {
        self.0 >= threshold
    }
}

/// The two opposing counters owned by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Streaks {
    pub upshift: Streak,
    pub downshift: Streak,
}

impl Streaks {
    /// Reset both counters, as every action does.
    pub fn reset_all(&mut self) {
        self.upshift.reset();
        self.downshift.reset();
    }
}
