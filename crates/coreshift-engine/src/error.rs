//! Engine error types.

use thiserror::Error;

use coreshift_core::CoreId;

/// Errors reported by a core lifecycle implementation.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("core {0} does not exist")]
    NoSuchCore(CoreId),

    #[error("core {0} cannot be taken offline")]
    Primary(CoreId),

    #[error("core {core} transition failed: {reason}")]
    Transition { core: CoreId, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
