//! Timer service: delayed callbacks that re-enter the engine.
//!
//! Two implementations:
//! - [`TokioTimer`]: one spawned task per callback, sleeping on
//!   `tokio::time::sleep`, cancelled by aborting its `JoinHandle`.
//! - [`ManualTimer`]: a fake clock advanced explicitly; callbacks run in
//!   deadline order from inside [`ManualTimer::advance`].
//!
//! Callbacks never run synchronously inside `schedule`.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

/// Work to run when a timer fires.
pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// Identifies a scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Schedules and cancels delayed callbacks.
pub trait TimerService: Send + Sync {
    /// Run `task` once after `delay`.
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle;

    /// Cancel a callback that has not fired yet. Idempotent.
    fn cancel(&self, handle: TimerHandle);

    /// Cancel `previous` (if any) and schedule `task`.
    fn rearm(&self, previous: Option<TimerHandle>, delay: Duration, task: TimerTask) -> TimerHandle {
        if let Some(handle) = previous {
            self.cancel(handle);
        }
        self.schedule(delay, task)
    }
}

// ── Tokio ─────────────────────────────────────────────────────────

/// Timer service backed by the tokio runtime.
pub struct TokioTimer {
    runtime: Handle,
    next_id: AtomicU64,
    /// Live callbacks: handle id → task.
    tasks: Arc<Mutex<HashMap<u64, JoinHandle<()>>>>,
}

impl TokioTimer {
    /// Create a timer on the current runtime.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn new() -> Self {
        Self::with_handle(Handle::current())
    }

    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            runtime,
            next_id: AtomicU64::new(1),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of callbacks that have neither fired nor been cancelled.
    pub fn pending(&self) -> usize {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl TimerService for TokioTimer {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let tasks = self.tasks.clone();

        // Hold the map lock across spawn + insert so a zero-delay task
        // cannot remove its entry before it exists.
        let mut live = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let join = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let still_live = tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id)
                .is_some();
            if still_live {
                task();
            }
        });
        live.insert(id, join);
        trace!(id, delay_ms = delay.as_millis() as u64, "timer scheduled");

        TimerHandle(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        let removed = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.0);
        if let Some(join) = removed {
            join.abort();
            trace!(id = handle.0, "timer cancelled");
        }
    }
}

// ── Manual clock ──────────────────────────────────────────────────

struct ManualState {
    now: Duration,
    next_id: u64,
    /// (deadline, id) → task; ids break deadline ties in schedule order.
    queue: BTreeMap<(Duration, u64), TimerTask>,
    deadlines: HashMap<u64, Duration>,
}

/// Deterministic timer driven by an explicit clock.
pub struct ManualTimer {
    state: Mutex<ManualState>,
}

impl Default for ManualTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualTimer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ManualState {
                now: Duration::ZERO,
                next_id: 1,
                queue: BTreeMap::new(),
                deadlines: HashMap::new(),
            }),
        }
    }

    /// Time elapsed on the fake clock.
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Number of callbacks waiting to fire.
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Deadline of the earliest pending callback.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.lock().queue.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Advance the clock by `by`, firing every callback that falls due.
    ///
    /// Callbacks scheduled while advancing fire too if their deadline is
    /// inside the window. Returns how many callbacks ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        let mut fired = 0;
        loop {
            let task = {
                let mut state = self.lock();
                let due = state
                    .queue
                    .keys()
                    .next()
                    .copied()
                    .filter(|(deadline, _)| *deadline <= target);
                match due {
                    Some(key) => {
                        state.now = state.now.max(key.0);
                        state.deadlines.remove(&key.1);
                        state.queue.remove(&key)
                    }
                    None => {
                        state.now = target;
                        None
                    }
                }
            };
            match task {
                Some(task) => {
                    task();
                    fired += 1;
                }
                None => return fired,
            }
        }
    }

    /// Fire the earliest pending callback, moving the clock to its deadline.
    pub fn fire_next(&self) -> bool {
        match self.next_deadline() {
            Some(deadline) => {
                let by = deadline.saturating_sub(self.now());
                // Fires every callback sharing this deadline.
                self.advance(by) > 0
            }
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TimerService for ManualTimer {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        let deadline = state.now + delay;
        state.queue.insert((deadline, id), task);
        state.deadlines.insert(id, deadline);
        TimerHandle(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        let mut state = self.lock();
        if let Some(deadline) = state.deadlines.remove(&handle.0) {
            state.queue.remove(&(deadline, handle.0));
        }
    }
}
