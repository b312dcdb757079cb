//! coreshift-engine: load-driven core hotplugging.
//!
//! Samples runnable-task load into a circular history, smooths it into a
//! moving average, and decides once per tick whether to bring cores online
//! or take them offline. Debounce streaks, a pause window after bursts and
//! deferred deactivation keep the machine from flapping.
//!
//! # Architecture
//!
//! ```text
//! TimerService ──fires──► HotplugEngine::on_tick()
//!                           ├── LoadSource::runnable_count()
//!                           ├── LoadHistory::record_and_average()
//!                           ├── decision::evaluate() ─► Decision
//!                           ├── CoreLifecycle::activate / deactivate
//!                           └── TimerService::rearm(sample_time × active)
//!
//! input event ──► HotplugEngine::on_input_event()
//!                   ├── activate core 1
//!                   └── arm boost revert (boost_duration)
//! ```
//!
//! Collaborators are injected as trait objects, so the same engine runs on
//! tokio timers against sysfs or on a [`ManualTimer`] against
//! [`InMemoryCores`].

pub mod decision;
pub mod engine;
pub mod error;
pub mod history;
pub mod lifecycle;
pub mod load;
pub mod streak;
pub mod timer;

pub use decision::{Decision, TickInput};
pub use engine::{EngineStatus, HotplugEngine};
pub use error::{LifecycleError, LifecycleResult};
pub use history::{LOAD_SCALE, LoadHistory};
pub use lifecycle::{CoreLifecycle, InMemoryCores, Transition};
pub use load::{LoadSource, SharedLoad};
pub use streak::{Streak, Streaks};
pub use timer::{ManualTimer, TimerHandle, TimerService, TimerTask, TokioTimer};
