//! Core lifecycle: the service that actually brings cores online.
//!
//! The engine only issues requests through [`CoreLifecycle`]; the
//! implementation is the authority on which cores are online. Redundant
//! requests (activating an online core, deactivating an offline one) must
//! be accepted as no-ops.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::debug;

use coreshift_core::CoreId;

use crate::error::{LifecycleError, LifecycleResult};

/// Online/offline control over the machine's cores.
pub trait CoreLifecycle: Send + Sync {
    fn activate(&self, core: CoreId) -> LifecycleResult<()>;

    fn deactivate(&self, core: CoreId) -> LifecycleResult<()>;

    fn is_active(&self, core: CoreId) -> bool;

    /// Number of cores currently online.
    fn active_count(&self) -> u32;

    /// Number of cores the platform could bring online.
    fn max_possible(&self) -> u32;
}

/// Activate the lowest-numbered offline core, if any.
pub fn activate_next(cores: &dyn CoreLifecycle) -> LifecycleResult<Option<CoreId>> {
    let Some(core) = (1..cores.max_possible()).find(|&c| !cores.is_active(c)) else {
        return Ok(None);
    };
    cores.activate(core)?;
    Ok(Some(core))
}

/// Deactivate the highest-numbered online core other than core 0, if any.
pub fn deactivate_last(cores: &dyn CoreLifecycle) -> LifecycleResult<Option<CoreId>> {
    let Some(core) = (1..cores.max_possible()).rev().find(|&c| cores.is_active(c)) else {
        return Ok(None);
    };
    cores.deactivate(core)?;
    Ok(Some(core))
}

/// Activate cores in ascending order until `target` are online.
///
/// Stops at the first failure. Bounded by the platform's core count so a
/// lifecycle that reports success without changing state cannot spin.
pub fn activate_up_to(cores: &dyn CoreLifecycle, target: u32) -> LifecycleResult<Vec<CoreId>> {
    let mut onlined = Vec::new();
    for _ in 0..cores.max_possible() {
        if cores.active_count() >= target {
            break;
        }
        match activate_next(cores)? {
            Some(core) => onlined.push(core),
            None => break,
        }
    }
    Ok(onlined)
}

/// A recorded core transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "transition", content = "core", rename_all = "snake_case")]
pub enum Transition {
    Online(CoreId),
    Offline(CoreId),
}

struct CoreTable {
    online: Vec<bool>,
    transitions: Vec<Transition>,
}

/// In-process core table, used for simulation and tests.
///
/// Records every effective transition so callers can audit what the engine
/// asked for.
pub struct InMemoryCores {
    table: Mutex<CoreTable>,
}

impl InMemoryCores {
    /// A platform of `total` cores with the first `active` online.
    ///
    /// Core 0 is always online.
    pub fn new(total: u32, active: u32) -> Self {
        let total = total.max(1);
        let online = (0..total).map(|c| c == 0 || c < active).collect();
        Self {
            table: Mutex::new(CoreTable {
                online,
                transitions: Vec::new(),
            }),
        }
    }

    /// Every effective transition so far, oldest first.
    pub fn transitions(&self) -> Vec<Transition> {
        self.lock().transitions.clone()
    }

    /// Ids of the cores currently online.
    pub fn online_cores(&self) -> Vec<CoreId> {
        self.lock()
            .online
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .map(|(c, _)| c as CoreId)
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CoreTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CoreLifecycle for InMemoryCores {
    fn activate(&self, core: CoreId) -> LifecycleResult<()> {
        let mut table = self.lock();
        let slot = table
            .online
            .get_mut(core as usize)
            .ok_or(LifecycleError::NoSuchCore(core))?;
        if !*slot {
            *slot = true;
            table.transitions.push(Transition::Online(core));
            debug!(core, "core online");
        }
        Ok(())
    }

    fn deactivate(&self, core: CoreId) -> LifecycleResult<()> {
        if core == 0 {
            return Err(LifecycleError::Primary(core));
        }
        let mut table = self.lock();
        let slot = table
            .online
            .get_mut(core as usize)
            .ok_or(LifecycleError::NoSuchCore(core))?;
        if *slot {
            *slot = false;
            table.transitions.push(Transition::Offline(core));
            debug!(core, "core offline");
        }
        Ok(())
    }

    fn is_active(&self, core: CoreId) -> bool {
        self.lock().online.get(core as usize).copied().unwrap_or(false)
    }

    fn active_count(&self) -> u32 {
        self.lock().online.iter().filter(|on| **on).count() as u32
    }

    fn max_possible(&self) -> u32 {
        self.lock().online.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_marks_leading_cores_online() {
        let cores = InMemoryCores::new(4, 2);
        assert_eq!(cores.online_cores(), vec![0, 1]);
        assert_eq!(cores.active_count(), 2);
        assert_eq!(cores.max_possible(), 4);
    }

    #[test]
    fn primary_is_always_online() {
        let cores = InMemoryCores::new(4, 0);
        assert_eq!(cores.online_cores(), vec![0]);
        assert!(matches!(cores.deactivate(0), Err(LifecycleError::Primary(0))));
    }

    #[test]
    fn redundant_requests_are_no_ops() {
        let cores = InMemoryCores::new(4, 2);
        cores.activate(1).unwrap();
        cores.deactivate(3).unwrap();
        assert!(cores.transitions().is_empty());
    }

    #[test]
    fn unknown_core_is_rejected() {
        let cores = InMemoryCores::new(2, 1);
        assert!(matches!(cores.activate(5), Err(LifecycleError::NoSuchCore(5))));
    }

    #[test]
    fn activate_next_picks_lowest_offline() {
        let cores = InMemoryCores::new(4, 1);
        cores.activate(2).unwrap();
        assert_eq!(activate_next(&cores).unwrap(), Some(1));
        assert_eq!(activate_next(&cores).unwrap(), Some(3));
        assert_eq!(activate_next(&cores).unwrap(), None);
    }

    #[test]
    fn deactivate_last_picks_highest_non_primary() {
        let cores = InMemoryCores::new(4, 3);
        assert_eq!(deactivate_last(&cores).unwrap(), Some(2));
        assert_eq!(deactivate_last(&cores).unwrap(), Some(1));
        assert_eq!(deactivate_last(&cores).unwrap(), None);
        assert_eq!(cores.online_cores(), vec![0]);
    }

    #[test]
    fn activate_up_to_stops_at_target() {
        let cores = InMemoryCores::new(4, 1);
        assert_eq!(activate_up_to(&cores, 3).unwrap(), vec![1, 2]);
        assert_eq!(cores.active_count(), 3);
        assert!(activate_up_to(&cores, 3).unwrap().is_empty());
    }

    #[test]
    fn activate_up_to_stops_at_platform_limit() {
        let cores = InMemoryCores::new(2, 1);
        assert_eq!(activate_up_to(&cores, 4).unwrap(), vec![1]);
    }

    #[test]
    fn transitions_are_recorded_in_order() {
        let cores = InMemoryCores::new(4, 1);
        cores.activate(1).unwrap();
        cores.deactivate(1).unwrap();
        assert_eq!(
            cores.transitions(),
            vec![Transition::Online(1), Transition::Offline(1)]
        );
    }
}
