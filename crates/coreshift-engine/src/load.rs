//! Load source: the runnable-task sensor sampled every tick.

use std::sync::atomic::{AtomicU32, Ordering};

/// Reports how many tasks are currently runnable.
///
/// Sampling cannot fail from the engine's point of view; implementations
/// that read from the host report their last good reading on error.
pub trait LoadSource: Send + Sync {
    fn runnable_count(&self) -> u32;
}

/// A load level set from outside, for simulation and tests.
#[derive(Debug, Default)]
pub struct SharedLoad(AtomicU32);

impl SharedLoad {
    pub fn new(runnable: u32) -> Self {
        Self(AtomicU32::new(runnable))
    }

    pub fn set(&self, runnable: u32) {
        self.0.store(runnable, Ordering::Relaxed);
    }
}

impl LoadSource for SharedLoad {
    fn runnable_count(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}
