//! Error types for tunables and configuration.

use thiserror::Error;

/// Result type alias for tunable reads and writes.
pub type TunableResult<T> = Result<T, TunableError>;

/// Errors raised when a tunable write is rejected.
///
/// A rejected write never mutates the tunable set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TunableError {
    #[error("unknown tunable: {0}")]
    UnknownKey(String),

    #[error("tunable {0} cannot be changed at runtime")]
    ReadOnly(String),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("{key} = {value} is outside {min}..={max}")]
    OutOfRange {
        key: String,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("min_cores ({min}) exceeds max_cores ({max})")]
    MinAboveMax { min: u32, max: u32 },
}

/// Errors that can occur while loading or writing a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid tunable in config: {0}")]
    Tunable(#[from] TunableError),
}
