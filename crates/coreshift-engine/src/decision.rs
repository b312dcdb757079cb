//! Hotplug decision rules.
//!
//! Converts a moving average and the current active-core count into one
//! action, updating the debounce streaks as a side effect. Pure with respect
//! to everything but the streaks, so it can be driven without collaborators.
//!
//! # Rule order
//!
//! ```text
//! active < min_cores                        → ActivateOne (no debounce)
//! active > ceiling                          → DeactivateOne (no debounce)
//! avg >= shift_all  && active < ceiling     → ActivateAll (optionally debounced)
//! avg >= shift_cpu1 && active == 1          → ActivateOne after debounce,
//!                                             held while touch boost owns 1→2
//! avg >= shift_cpu2 && active == 2          → ActivateOne after debounce
//! avg <  down_shift * active                → DeactivateOne / DeferDeactivate
//!                                             after the downshift debounce
//! otherwise                                 → Hold
//! ```
//!
//! Upward and downward rules are exclusive: a tick that satisfies an upward
//! condition resets the downward streak.

use serde::Serialize;
use tracing::debug;

use coreshift_core::Tunables;

use crate::streak::Streaks;

/// The outcome of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    /// No change this tick.
    Hold,
    /// A pause window suppressed every rule this tick.
    Paused,
    /// Bring cores online until `target` are active, then pause.
    ActivateAll { target: u32 },
    /// Bring the lowest-numbered offline core online.
    ActivateOne,
    /// Take the highest-numbered online core offline now.
    DeactivateOne,
    /// Take a core offline after the touch-boost grace period.
    DeferDeactivate,
}

impl Decision {
    pub fn is_action(&self) -> bool {
        !matches!(self, Decision::Hold | Decision::Paused)
    }
}

/// Readings taken at the start of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickInput {
    /// Scaled moving average from the load history.
    pub average: u32,
    /// Active cores as reported by the lifecycle service.
    pub active: u32,
    /// Cores the platform can bring online at all.
    pub max_possible: u32,
}

impl TickInput {
    /// Highest active count the engine may steer toward.
    pub fn ceiling(&self, tunables: &Tunables) -> u32 {
        tunables.max_cores().min(self.max_possible).max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Upward {
    Burst,
    Single { deferred_to_boost: bool },
}

/// Evaluate the rules for one tick.
pub fn evaluate(input: &TickInput, tunables: &Tunables, streaks: &mut Streaks) -> Decision {
    let TickInput { average, active, .. } = *input;
    let ceiling = input.ceiling(tunables);

    if active < tunables.min_cores() && active < ceiling {
        streaks.reset_all();
        debug!(active, min = tunables.min_cores(), "below core floor");
        return Decision::ActivateOne;
    }

    if active > ceiling {
        streaks.reset_all();
        debug!(active, ceiling, "above core ceiling");
        return Decision::DeactivateOne;
    }

    if let Some(rule) = upward_rule(input, tunables, ceiling) {
        streaks.downshift.reset();
        return match rule {
            Upward::Burst if !tunables.debounce_burst() => {
                streaks.reset_all();
                Decision::ActivateAll { target: ceiling }
            }
            Upward::Burst => {
                if streaks.upshift.bump() >= tunables.debounce_threshold() {
                    streaks.reset_all();
                    Decision::ActivateAll { target: ceiling }
                } else {
                    Decision::Hold
                }
            }
            Upward::Single {
                deferred_to_boost: true,
            } => {
                // No upward rule is confirming this tick.
                streaks.upshift.reset();
                debug!(average, "1 -> 2 upgrade left to touch boost");
                Decision::Hold
            }
            Upward::Single { .. } => {
                let n = streaks.upshift.bump();
                debug!(average, active, streak = n, "upshift confirmed");
                if n >= tunables.debounce_threshold() {
                    streaks.reset_all();
                    Decision::ActivateOne
                } else {
                    Decision::Hold
                }
            }
        };
    }
    streaks.upshift.reset();

    let disable_threshold = tunables.down_shift().saturating_mul(active);
    if average >= disable_threshold {
        streaks.downshift.reset();
        return Decision::Hold;
    }

    let n = streaks.downshift.bump();
    debug!(average, disable_threshold, streak = n, "downshift confirmed");
    if n < tunables.effective_downshift_threshold() {
        return Decision::Hold;
    }

    streaks.reset_all();
    if active == 2 && tunables.touch_boost_enabled() {
        Decision::DeferDeactivate
    } else {
        Decision::DeactivateOne
    }
}

fn upward_rule(input: &TickInput, t: &Tunables, ceiling: u32) -> Option<Upward> {
    let TickInput { average, active, .. } = *input;
    if active >= ceiling {
        return None;
    }
    if average >= t.shift_all() {
        Some(Upward::Burst)
    } else if average >= t.shift_cpu1() && active == 1 {
        Some(Upward::Single {
            deferred_to_boost: t.touch_boost_enabled(),
        })
    } else if average >= t.shift_cpu2() && active == 2 {
        Some(Upward::Single {
            deferred_to_boost: false,
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tunables(pairs: &[(&str, &str)]) -> Tunables {
        let mut t = Tunables::default();
        for (k, v) in pairs {
            t.set_initial(k, v).unwrap();
        }
        t
    }

    fn input(average: u32, active: u32) -> TickInput {
        TickInput {
            average,
            active,
            max_possible: 4,
        }
    }

    #[test]
    fn burst_fires_immediately_without_debounce() {
        let t = tunables(&[]);
        let mut s = Streaks::default();
        s.downshift.bump();
        assert_eq!(
            evaluate(&input(500, 1), &t, &mut s),
            Decision::ActivateAll { target: 4 }
        );
        assert_eq!(s, Streaks::default());
    }

    #[test]
    fn burst_waits_for_streak_when_debounced() {
        let t = tunables(&[("debounce_burst", "true"), ("debounce_threshold", "3")]);
        let mut s = Streaks::default();
        assert_eq!(evaluate(&input(600, 2), &t, &mut s), Decision::Hold);
        assert_eq!(evaluate(&input(600, 2), &t, &mut s), Decision::Hold);
        assert_eq!(s.upshift.get(), 2);
        assert_eq!(
            evaluate(&input(600, 2), &t, &mut s),
            Decision::ActivateAll { target: 4 }
        );
        assert_eq!(s, Streaks::default());
    }

    #[test]
    fn burst_target_respects_max_cores_and_platform() {
        let t = tunables(&[("max_cores", "3")]);
        let mut s = Streaks::default();
        assert_eq!(
            evaluate(&input(600, 1), &t, &mut s),
            Decision::ActivateAll { target: 3 }
        );

        let t = tunables(&[]);
        let two_core_platform = TickInput {
            average: 600,
            active: 1,
            max_possible: 2,
        };
        assert_eq!(
            evaluate(&two_core_platform, &t, &mut s),
            Decision::ActivateAll { target: 2 }
        );
    }

    #[test]
    fn no_upward_action_at_ceiling() {
        let t = tunables(&[]);
        let mut s = Streaks::default();
        assert_eq!(evaluate(&input(600, 4), &t, &mut s), Decision::Hold);
        assert_eq!(s.upshift.get(), 0);
    }

    #[test]
    fn single_upgrade_after_debounce() {
        let t = tunables(&[("touch_boost_enabled", "false"), ("debounce_threshold", "3")]);
        let mut s = Streaks::default();
        assert_eq!(evaluate(&input(300, 1), &t, &mut s), Decision::Hold);
        assert_eq!(evaluate(&input(300, 1), &t, &mut s), Decision::Hold);
        assert_eq!(evaluate(&input(300, 1), &t, &mut s), Decision::ActivateOne);
        assert_eq!(s, Streaks::default());
    }

    #[test]
    fn upshift_streak_resets_when_condition_fails() {
        let t = tunables(&[("touch_boost_enabled", "false"), ("debounce_threshold", "3")]);
        let mut s = Streaks::default();
        evaluate(&input(300, 1), &t, &mut s);
        evaluate(&input(300, 1), &t, &mut s);
        assert_eq!(s.upshift.get(), 2);
        // 270 is below shift_cpu1 (280) but above down_shift * 1.
        assert_eq!(evaluate(&input(270, 1), &t, &mut s), Decision::Hold);
        assert_eq!(s.upshift.get(), 0);
        assert_eq!(evaluate(&input(300, 1), &t, &mut s), Decision::Hold);
        assert_eq!(s.upshift.get(), 1);
    }

    #[test]
    fn single_upgrade_held_under_touch_boost() {
        let t = tunables(&[("debounce_threshold", "1")]);
        let mut s = Streaks::default();
        for _ in 0..5 {
            assert_eq!(evaluate(&input(300, 1), &t, &mut s), Decision::Hold);
        }
        assert_eq!(s.upshift.get(), 0);
    }

    #[test]
    fn second_upgrade_ignores_touch_boost() {
        let t = tunables(&[("debounce_threshold", "2")]);
        let mut s = Streaks::default();
        assert_eq!(evaluate(&input(460, 2), &t, &mut s), Decision::Hold);
        assert_eq!(evaluate(&input(460, 2), &t, &mut s), Decision::ActivateOne);
    }

    #[test]
    fn shift_cpu2_only_applies_at_two_cores() {
        let t = tunables(&[("debounce_threshold", "1")]);
        let mut s = Streaks::default();
        assert_eq!(evaluate(&input(460, 3), &t, &mut s), Decision::Hold);
    }

    #[test]
    fn deactivates_after_downshift_debounce() {
        let t = tunables(&[("touch_boost_enabled", "false"), ("debounce_threshold", "3")]);
        let mut s = Streaks::default();
        assert_eq!(evaluate(&input(0, 3), &t, &mut s), Decision::Hold);
        assert_eq!(evaluate(&input(0, 3), &t, &mut s), Decision::Hold);
        assert_eq!(evaluate(&input(0, 3), &t, &mut s), Decision::DeactivateOne);
        assert_eq!(s, Streaks::default());
    }

    #[test]
    fn downshift_threshold_overrides_debounce() {
        let t = tunables(&[
            ("touch_boost_enabled", "false"),
            ("debounce_threshold", "1"),
            ("downshift_threshold", "2"),
        ]);
        let mut s = Streaks::default();
        assert_eq!(evaluate(&input(0, 3), &t, &mut s), Decision::Hold);
        assert_eq!(evaluate(&input(0, 3), &t, &mut s), Decision::DeactivateOne);
    }

    #[test]
    fn downshift_streak_resets_at_disable_threshold() {
        let t = tunables(&[("touch_boost_enabled", "false"), ("debounce_threshold", "3")]);
        let mut s = Streaks::default();
        evaluate(&input(100, 3), &t, &mut s);
        evaluate(&input(100, 3), &t, &mut s);
        assert_eq!(s.downshift.get(), 2);
        // disable threshold is 100 * 3 = 300; equal is not below.
        assert_eq!(evaluate(&input(300, 3), &t, &mut s), Decision::Hold);
        assert_eq!(s.downshift.get(), 0);
    }

    #[test]
    fn two_cores_with_touch_boost_defers() {
        let t = tunables(&[("debounce_threshold", "1")]);
        let mut s = Streaks::default();
        assert_eq!(evaluate(&input(0, 2), &t, &mut s), Decision::DeferDeactivate);
    }

    #[test]
    fn upward_condition_resets_downshift() {
        let t = tunables(&[("touch_boost_enabled", "false"), ("debounce_threshold", "5")]);
        let mut s = Streaks::default();
        evaluate(&input(0, 2), &t, &mut s);
        assert_eq!(s.downshift.get(), 1);
        evaluate(&input(460, 2), &t, &mut s);
        assert_eq!(s.downshift.get(), 0);
        assert_eq!(s.upshift.get(), 1);
    }

    #[test]
    fn floor_is_restored_without_debounce() {
        let t = tunables(&[("min_cores", "2"), ("debounce_threshold", "10")]);
        let mut s = Streaks::default();
        assert_eq!(evaluate(&input(0, 1), &t, &mut s), Decision::ActivateOne);
    }

    #[test]
    fn nothing_happens_in_the_middle_band() {
        let t = tunables(&[("touch_boost_enabled", "false"), ("debounce_threshold", "1")]);
        let mut s = Streaks::default();
        // 2 cores: disable below 200, upgrade at 450.
        for avg in [200, 300, 449] {
            assert_eq!(evaluate(&input(avg, 2), &t, &mut s), Decision::Hold);
        }
    }

    #[test]
    fn touch_boost_hold_breaks_burst_streak() {
        let t = tunables(&[("debounce_burst", "true"), ("debounce_threshold", "3")]);
        let mut s = Streaks::default();
        assert_eq!(evaluate(&input(600, 1), &t, &mut s), Decision::Hold);
        assert_eq!(evaluate(&input(600, 1), &t, &mut s), Decision::Hold);
        for _ in 0..50 {
            assert_eq!(evaluate(&input(300, 1), &t, &mut s), Decision::Hold);
        }
        assert_eq!(s.upshift.get(), 0);
        assert_eq!(evaluate(&input(600, 1), &t, &mut s), Decision::Hold);
        assert_eq!(s.upshift.get(), 1);
    }

    #[test]
    fn sheds_cores_above_lowered_ceiling() {
        let t = tunables(&[("max_cores", "2"), ("debounce_threshold", "10")]);
        let mut s = Streaks::default();
        s.upshift.bump();
        // Load high enough to hold every core still sheds above max_cores.
        assert_eq!(evaluate(&input(600, 4), &t, &mut s), Decision::DeactivateOne);
        assert_eq!(s, Streaks::default());
        assert_eq!(evaluate(&input(600, 3), &t, &mut s), Decision::DeactivateOne);
        assert_eq!(evaluate(&input(600, 2), &t, &mut s), Decision::Hold);
    }

    #[test]
    fn decision_action_classification() {
        assert!(!Decision::Hold.is_action());
        assert!(!Decision::Paused.is_action());
        assert!(Decision::DeferDeactivate.is_action());
        assert!(Decision::ActivateAll { target: 4 }.is_action());
    }
}
