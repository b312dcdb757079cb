//! coreshift-core: parameters shared by the hotplug engine and its hosts.
//!
//! Holds the runtime [`Tunables`] surface (flat key/value, validated per key)
//! and the `coreshift.toml` parser that seeds it at startup.

pub mod config;
pub mod error;
pub mod tunables;

pub use config::{CoreshiftConfig, EngineSettings};
pub use error::{ConfigError, TunableError, TunableResult};
pub use tunables::{TUNABLES, TunableKind, TunableOverrides, TunableSpec, TunableValue, Tunables};

/// Index of a processing unit. Core 0 is the primary and is never released.
pub type CoreId = u32;
