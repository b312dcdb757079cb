//! Hotplug engine: the control loop that owns history, streaks and timers.
//!
//! Every entry point (periodic tick, input boost, timer callbacks, tunable
//! writes, enable/disable) takes the single state lock, so history writes
//! and streak updates are never interleaved.
//!
//! Each armed timer carries a sequence number. A callback whose sequence no
//! longer matches the pending slot for its kind was cancelled or replaced
//! and is ignored, so a timer racing a cancel never acts.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use coreshift_core::{EngineSettings, TunableResult, Tunables};

use crate::decision::{self, Decision, TickInput};
use crate::error::LifecycleResult;
use crate::history::LoadHistory;
use crate::lifecycle::{self, CoreLifecycle};
use crate::load::LoadSource;
use crate::streak::Streaks;
use crate::timer::{TimerHandle, TimerService, TimerTask};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Tick,
    Unpause,
    DeferredDeactivate,
    BoostRevert,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    handle: TimerHandle,
    seq: u64,
}

#[derive(Debug, Default)]
struct PendingTimers {
    tick: Option<Pending>,
    unpause: Option<Pending>,
    deferred: Option<Pending>,
    boost: Option<Pending>,
}

impl PendingTimers {
    fn slot(&mut self, kind: TimerKind) -> &mut Option<Pending> {
        match kind {
            TimerKind::Tick => &mut self.tick,
            TimerKind::Unpause => &mut self.unpause,
            TimerKind::DeferredDeactivate => &mut self.deferred,
            TimerKind::BoostRevert => &mut self.boost,
        }
    }

    fn drain(&mut self) -> impl Iterator<Item = Pending> {
        [
            self.tick.take(),
            self.unpause.take(),
            self.deferred.take(),
            self.boost.take(),
        ]
        .into_iter()
        .flatten()
    }
}

struct EngineState {
    tunables: Tunables,
    history: LoadHistory,
    streaks: Streaks,
    enabled: bool,
    ticks: u64,
    last_average: u32,
    last_decision: Decision,
    timers: PendingTimers,
    next_seq: u64,
}

impl EngineState {
    /// A pause window is open while its closing timer is pending.
    fn paused(&self) -> bool {
        self.timers.unpause.is_some()
    }

    fn base_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.tunables.sample_time_ms()))
    }

    fn boost_duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.tunables.boost_duration_ms()))
    }
}

/// Point-in-time view of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub enabled: bool,
    pub paused: bool,
    pub active_cores: u32,
    pub ticks: u64,
    pub last_average: u32,
    pub last_decision: Decision,
    pub streaks: Streaks,
    pub deactivation_pending: bool,
    pub boost_pending: bool,
}

/// The hotplug decision engine.
///
/// Constructed disabled; call [`HotplugEngine::start`] to begin ticking.
pub struct HotplugEngine {
    cores: Arc<dyn CoreLifecycle>,
    load: Arc<dyn LoadSource>,
    timer: Arc<dyn TimerService>,
    settings: EngineSettings,
    state: Mutex<EngineState>,
    this: Weak<HotplugEngine>,
}

impl HotplugEngine {
    /// Create an engine. The load history is sized from `sampling_periods`
    /// and keeps that capacity for the engine's lifetime.
    pub fn new(
        tunables: Tunables,
        settings: EngineSettings,
        cores: Arc<dyn CoreLifecycle>,
        load: Arc<dyn LoadSource>,
        timer: Arc<dyn TimerService>,
    ) -> Arc<Self> {
        let history = LoadHistory::new(tunables.sampling_periods() as usize);
        Arc::new_cyclic(|this| Self {
            cores,
            load,
            timer,
            settings,
            state: Mutex::new(EngineState {
                tunables,
                history,
                streaks: Streaks::default(),
                enabled: false,
                ticks: 0,
                last_average: 0,
                last_decision: Decision::Hold,
                timers: PendingTimers::default(),
                next_seq: 0,
            }),
            this: this.clone(),
        })
    }

    /// Enable with the boot grace period: the first tick waits
    /// `startup_delay` and no action is taken before `startup_grace`.
    pub fn start(&self) {
        self.enable_with(self.settings.startup_delay(), self.settings.startup_grace());
    }

    /// Re-enable after [`disable`](Self::disable). Sampling resumes at once
    /// behind a fresh pause window.
    pub fn enable(&self) {
        self.enable_with(Duration::ZERO, self.settings.pause());
    }

    /// Stop sampling and cancel every pending callback before returning.
    pub fn disable(&self) {
        let mut state = self.lock();
        if !state.enabled {
            return;
        }
        state.enabled = false;
        state.streaks.reset_all();
        for pending in state.timers.drain() {
            self.timer.cancel(pending.handle);
        }
        info!("hotplug engine disabled");
    }

    pub fn set_enabled(&self, enabled: bool) {
        if enabled {
            self.enable();
        } else {
            self.disable();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused()
    }

    /// Run one sampling tick. Normally invoked by the timer service.
    pub fn on_tick(&self) {
        let mut state = self.lock();
        self.tick(&mut state);
    }

    /// Input-event hint: bring a second core online immediately.
    pub fn on_input_event(&self) {
        let mut state = self.lock();
        if !state.enabled || !state.tunables.touch_boost_enabled() {
            return;
        }
        if state.paused() {
            debug!("touch boost skipped: pause window open");
            return;
        }

        let active = self.cores.active_count();
        let ceiling = state.tunables.max_cores().min(self.cores.max_possible());
        if active != 1 || ceiling < 2 {
            trace!(active, "touch boost not needed");
            return;
        }

        match lifecycle::activate_next(&*self.cores) {
            Ok(Some(core)) => {
                info!(core, "touch boost: core online");
                state.streaks.reset_all();
                self.disarm(&mut state, TimerKind::DeferredDeactivate);
                let grace = state.boost_duration();
                self.arm(&mut state, TimerKind::BoostRevert, grace);
            }
            Ok(None) => debug!("touch boost: no offline core"),
            Err(e) => warn!(error = %e, "touch boost failed"),
        }
    }

    /// Read a tunable.
    pub fn tunable(&self, key: &str) -> TunableResult<String> {
        self.lock().tunables.get(key)
    }

    /// Write a tunable. A rejected write leaves the prior value in place.
    pub fn set_tunable(&self, key: &str, value: &str) -> TunableResult<()> {
        let mut state = self.lock();
        state.tunables.set(key, value)?;
        info!(key, value = value.trim(), "tunable updated");
        Ok(())
    }

    /// Snapshot of the live tunables.
    pub fn tunables(&self) -> Tunables {
        self.lock().tunables.clone()
    }

    pub fn status(&self) -> EngineStatus {
        let state = self.lock();
        EngineStatus {
            enabled: state.enabled,
            paused: state.paused(),
            active_cores: self.cores.active_count(),
            ticks: state.ticks,
            last_average: state.last_average,
            last_decision: state.last_decision,
            streaks: state.streaks,
            deactivation_pending: state.timers.deferred.is_some(),
            boost_pending: state.timers.boost.is_some(),
        }
    }

    // ── internals ────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enable_with(&self, first_tick: Duration, grace: Duration) {
        let mut state = self.lock();
        if state.enabled {
            return;
        }
        state.enabled = true;
        state.streaks.reset_all();
        if !grace.is_zero() {
            self.arm(&mut state, TimerKind::Unpause, grace);
        }
        self.arm(&mut state, TimerKind::Tick, first_tick);
        info!(
            first_tick_ms = first_tick.as_millis() as u64,
            pause_ms = grace.as_millis() as u64,
            "hotplug engine enabled"
        );
    }

    fn arm(&self, state: &mut EngineState, kind: TimerKind, delay: Duration) {
        state.next_seq += 1;
        let seq = state.next_seq;
        let engine = self.this.clone();
        let task: TimerTask = Box::new(move || {
            if let Some(engine) = engine.upgrade() {
                engine.fire(kind, seq);
            }
        });

        let previous = state.timers.slot(kind).take().map(|p| p.handle);
        let handle = self.timer.rearm(previous, delay, task);
        *state.timers.slot(kind) = Some(Pending { handle, seq });
    }

    fn disarm(&self, state: &mut EngineState, kind: TimerKind) {
        if let Some(pending) = state.timers.slot(kind).take() {
            self.timer.cancel(pending.handle);
        }
    }

    fn fire(&self, kind: TimerKind, seq: u64) {
        let mut state = self.lock();
        let current = state.timers.slot(kind).as_ref().map(|p| p.seq);
        if current != Some(seq) {
            trace!(?kind, seq, "stale timer ignored");
            return;
        }
        state.timers.slot(kind).take();

        match kind {
            TimerKind::Tick => self.tick(&mut state),
            TimerKind::Unpause => info!("pause window closed"),
            TimerKind::DeferredDeactivate => self.deferred_deactivate(&mut state),
            TimerKind::BoostRevert => self.boost_revert(&mut state),
        }
    }

    fn tick(&self, state: &mut EngineState) {
        if !state.enabled {
            debug!("tick ignored: engine disabled");
            return;
        }

        let runnable = self.load.runnable_count();
        let average = state.history.record_and_average(runnable);
        let active = self.cores.active_count();
        state.last_average = average;
        state.ticks += 1;

        if state.tunables.debug() {
            info!(index = state.history.write_index(), runnable, average, active, "sample");
        } else {
            trace!(index = state.history.write_index(), runnable, average, active, "sample");
        }

        let base = state.base_interval();
        if state.paused() {
            state.last_decision = Decision::Paused;
            self.arm(state, TimerKind::Tick, base);
            return;
        }

        let input = TickInput {
            average,
            active,
            max_possible: self.cores.max_possible(),
        };
        let before = state.streaks;
        let decision = decision::evaluate(&input, &state.tunables, &mut state.streaks);
        state.last_decision = decision;

        let outcome = match decision {
            Decision::Hold | Decision::Paused => Ok(()),
            Decision::ActivateAll { target } => self.activate_all(state, target, average),
            Decision::ActivateOne => self.activate_one(state, average),
            Decision::DeactivateOne => self.deactivate_one(state, average),
            Decision::DeferDeactivate => {
                self.defer_deactivate(state);
                Ok(())
            }
        };
        if let Err(e) = outcome {
            warn!(?decision, error = %e, "core transition failed; re-evaluating next tick");
            state.streaks = before;
        }

        let next = match decision {
            Decision::ActivateAll { .. } => base,
            _ => base * active.max(1),
        };
        self.arm(state, TimerKind::Tick, next);
    }

    fn activate_all(&self, state: &mut EngineState, target: u32, average: u32) -> LifecycleResult<()> {
        self.disarm(state, TimerKind::DeferredDeactivate);
        self.disarm(state, TimerKind::BoostRevert);

        let onlined = lifecycle::activate_up_to(&*self.cores, target)?;
        info!(average, target, ?onlined, "activating all cores");

        let pause = self.settings.pause();
        if !pause.is_zero() {
            self.arm(state, TimerKind::Unpause, pause);
        }
        Ok(())
    }

    fn activate_one(&self, state: &mut EngineState, average: u32) -> LifecycleResult<()> {
        let active = self.cores.active_count();
        let ceiling = state.tunables.max_cores().min(self.cores.max_possible());
        if active >= ceiling {
            debug!(active, ceiling, "at core ceiling");
            return Ok(());
        }

        match lifecycle::activate_next(&*self.cores)? {
            Some(core) => {
                info!(core, average, active = active + 1, "core activated");
                self.disarm(state, TimerKind::DeferredDeactivate);
            }
            None => debug!("no offline core to activate"),
        }
        Ok(())
    }

    fn deactivate_one(&self, state: &EngineState, average: u32) -> LifecycleResult<()> {
        let active = self.cores.active_count();
        if active <= state.tunables.min_cores() {
            debug!(active, min = state.tunables.min_cores(), "at core floor");
            return Ok(());
        }

        match lifecycle::deactivate_last(&*self.cores)? {
            Some(core) => info!(core, average, active = active - 1, "core deactivated"),
            None => debug!("no secondary core online"),
        }
        Ok(())
    }

    fn defer_deactivate(&self, state: &mut EngineState) {
        if state.timers.deferred.is_some() {
            debug!("deactivation already pending");
            return;
        }
        let delay = state.boost_duration();
        self.arm(state, TimerKind::DeferredDeactivate, delay);
        debug!(delay_ms = delay.as_millis() as u64, "deactivation deferred");
    }

    fn deferred_deactivate(&self, state: &mut EngineState) {
        if !state.enabled || state.paused() {
            return;
        }
        let active = self.cores.active_count();
        if active != 2 {
            debug!(active, "deferred deactivation dropped");
            return;
        }
        let average = state.last_average;
        if let Err(e) = self.deactivate_one(state, average) {
            warn!(error = %e, "deferred deactivation failed");
        }
    }

    fn boost_revert(&self, state: &mut EngineState) {
        if !state.enabled || state.paused() {
            return;
        }
        let active = self.cores.active_count();
        if active != 2 {
            return;
        }
        let average = state.last_average;
        if average >= state.tunables.shift_cpu1() {
            debug!(average, "touch boost confirmed by load");
            return;
        }
        if let Err(e) = self.deactivate_one(state, average) {
            warn!(error = %e, "touch boost revert failed");
        }
    }
}
