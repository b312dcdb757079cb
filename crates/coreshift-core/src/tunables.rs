//! Runtime tunables: the flat key/value parameter surface.
//!
//! Every key is independently readable and writable. Writes are parsed,
//! range-checked, and cross-checked (`min_cores <= max_cores`) against a
//! candidate copy; only a fully valid candidate replaces the live set, so a
//! rejected write leaves every prior value intact.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{TunableError, TunableResult};

/// Shape of a tunable's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunableKind {
    /// Unsigned integer constrained to `min..=max`.
    Range { min: u32, max: u32 },
    /// Boolean toggle.
    Flag,
}

/// Static description of one tunable key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunableSpec {
    pub key: &'static str,
    pub kind: TunableKind,
    /// Whether the key may be written after the engine is constructed.
    pub runtime_writable: bool,
    pub description: &'static str,
}

/// Every tunable key, in display order.
pub const TUNABLES: &[TunableSpec] = &[
    TunableSpec {
        key: "shift_all",
        kind: TunableKind::Range { min: 0, max: 600 },
        runtime_writable: true,
        description: "average load that activates every core",
    },
    TunableSpec {
        key: "shift_cpu1",
        kind: TunableKind::Range { min: 0, max: 500 },
        runtime_writable: true,
        description: "average load that upgrades 1 -> 2 cores",
    },
    TunableSpec {
        key: "shift_cpu2",
        kind: TunableKind::Range { min: 0, max: 500 },
        runtime_writable: true,
        description: "average load that upgrades 2 -> 3 cores",
    },
    TunableSpec {
        key: "down_shift",
        kind: TunableKind::Range { min: 0, max: 200 },
        runtime_writable: true,
        description: "per-core average below which a core is released",
    },
    TunableSpec {
        key: "min_cores",
        kind: TunableKind::Range { min: 1, max: 4 },
        runtime_writable: true,
        description: "floor on active cores",
    },
    TunableSpec {
        key: "max_cores",
        kind: TunableKind::Range { min: 1, max: 4 },
        runtime_writable: true,
        description: "ceiling on active cores",
    },
    TunableSpec {
        key: "sample_time",
        kind: TunableKind::Range { min: 1, max: 500 },
        runtime_writable: true,
        description: "tick period in ms at one active core",
    },
    TunableSpec {
        key: "debounce_threshold",
        kind: TunableKind::Range { min: 1, max: 500 },
        runtime_writable: true,
        description: "consecutive samples confirming an upward action",
    },
    TunableSpec {
        key: "downshift_threshold",
        kind: TunableKind::Range { min: 0, max: 500 },
        runtime_writable: true,
        description: "consecutive samples confirming a downward action (0 = debounce_threshold)",
    },
    TunableSpec {
        key: "sampling_periods",
        kind: TunableKind::Range { min: 1, max: 500 },
        runtime_writable: false,
        description: "load history length in samples",
    },
    TunableSpec {
        key: "boost_duration",
        kind: TunableKind::Range { min: 0, max: 30_000 },
        runtime_writable: true,
        description: "touch-boost grace period in ms",
    },
    TunableSpec {
        key: "touch_boost_enabled",
        kind: TunableKind::Flag,
        runtime_writable: true,
        description: "boost to two cores on input events",
    },
    TunableSpec {
        key: "debounce_burst",
        kind: TunableKind::Flag,
        runtime_writable: true,
        description: "require debounce_threshold samples before activating every core",
    },
    TunableSpec {
        key: "debug",
        kind: TunableKind::Flag,
        runtime_writable: true,
        description: "log every sample at info level",
    },
];

/// Look up the spec for a key.
pub fn spec_for(key: &str) -> Option<&'static TunableSpec> {
    TUNABLES.iter().find(|s| s.key == key)
}

/// A parsed tunable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunableValue {
    Number(u32),
    Flag(bool),
}

impl fmt::Display for TunableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunableValue::Number(n) => write!(f, "{n}"),
            TunableValue::Flag(b) => write!(f, "{b}"),
        }
    }
}

/// The live parameter set read by the decision engine on every tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tunables {
    shift_all: u32,
    shift_cpu1: u32,
    shift_cpu2: u32,
    down_shift: u32,
    min_cores: u32,
    max_cores: u32,
    sample_time: u32,
    debounce_threshold: u32,
    downshift_threshold: u32,
    sampling_periods: u32,
    boost_duration: u32,
    touch_boost_enabled: bool,
    debounce_burst: bool,
    debug: bool,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            shift_all: 500,
            shift_cpu1: 280,
            shift_cpu2: 450,
            down_shift: 100,
            min_cores: 1,
            max_cores: 4,
            sample_time: 20,
            debounce_threshold: 5,
            downshift_threshold: 0,
            sampling_periods: 18,
            boost_duration: 5000,
            touch_boost_enabled: true,
            debounce_burst: false,
            debug: false,
        }
    }
}

impl Tunables {
    pub fn shift_all(&self) -> u32 {
        self.shift_all
    }

    pub fn shift_cpu1(&self) -> u32 {
        self.shift_cpu1
    }

    pub fn shift_cpu2(&self) -> u32 {
        self.shift_cpu2
    }

    pub fn down_shift(&self) -> u32 {
        self.down_shift
    }

    pub fn min_cores(&self) -> u32 {
        self.min_cores
    }

    pub fn max_cores(&self) -> u32 {
        self.max_cores
    }

    /// Tick period in milliseconds at one active core.
    pub fn sample_time_ms(&self) -> u32 {
        self.sample_time
    }

    pub fn debounce_threshold(&self) -> u32 {
        self.debounce_threshold
    }

    /// Confirmations required before a downward action.
    ///
    /// Falls back to `debounce_threshold` when `downshift_threshold` is 0.
    pub fn effective_downshift_threshold(&self) -> u32 {
        if self.downshift_threshold == 0 {
            self.debounce_threshold
        } else {
            self.downshift_threshold
        }
    }

    pub fn sampling_periods(&self) -> u32 {
        self.sampling_periods
    }

    /// Touch-boost grace period in milliseconds.
    pub fn boost_duration_ms(&self) -> u32 {
        self.boost_duration
    }

    pub fn touch_boost_enabled(&self) -> bool {
        self.touch_boost_enabled
    }

    pub fn debounce_burst(&self) -> bool {
        self.debounce_burst
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Keys in display order.
    pub fn keys() -> impl Iterator<Item = &'static str> {
        TUNABLES.iter().map(|s| s.key)
    }

    /// Read a key as its string form.
    pub fn get(&self, key: &str) -> TunableResult<String> {
        self.value(key).map(|v| v.to_string())
    }

    /// Read a key as a typed value.
    pub fn value(&self, key: &str) -> TunableResult<TunableValue> {
        use TunableValue::{Flag, Number};

        let v = match key {
            "shift_all" => Number(self.shift_all),
            "shift_cpu1" => Number(self.shift_cpu1),
            "shift_cpu2" => Number(self.shift_cpu2),
            "down_shift" => Number(self.down_shift),
            "min_cores" => Number(self.min_cores),
            "max_cores" => Number(self.max_cores),
            "sample_time" => Number(self.sample_time),
            "debounce_threshold" => Number(self.debounce_threshold),
            "downshift_threshold" => Number(self.downshift_threshold),
            "sampling_periods" => Number(self.sampling_periods),
            "boost_duration" => Number(self.boost_duration),
            "touch_boost_enabled" => Flag(self.touch_boost_enabled),
            "debounce_burst" => Flag(self.debounce_burst),
            "debug" => Flag(self.debug),
            _ => return Err(TunableError::UnknownKey(key.to_string())),
        };
        Ok(v)
    }

    /// Write a key at runtime. Keys that are not runtime-writable are rejected.
    pub fn set(&mut self, key: &str, raw: &str) -> TunableResult<()> {
        let spec = spec_for(key).ok_or_else(|| TunableError::UnknownKey(key.to_string()))?;
        if !spec.runtime_writable {
            return Err(TunableError::ReadOnly(key.to_string()));
        }
        let value = parse_value(spec, raw)?;
        self.commit(key, value)
    }

    /// Write a key before the engine is built. Accepts read-only keys too.
    pub fn set_initial(&mut self, key: &str, raw: &str) -> TunableResult<()> {
        let spec = spec_for(key).ok_or_else(|| TunableError::UnknownKey(key.to_string()))?;
        let value = parse_value(spec, raw)?;
        self.commit(key, value)
    }

    /// Write an already-typed value. Accepts read-only keys.
    pub fn set_value(&mut self, key: &str, value: TunableValue) -> TunableResult<()> {
        let spec = spec_for(key).ok_or_else(|| TunableError::UnknownKey(key.to_string()))?;
        match (spec.kind, value) {
            (TunableKind::Range { .. }, TunableValue::Number(_))
            | (TunableKind::Flag, TunableValue::Flag(_)) => self.commit(key, value),
            _ => Err(TunableError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Check every range and the `min_cores <= max_cores` relation.
    pub fn validate(&self) -> TunableResult<()> {
        for spec in TUNABLES {
            if let (TunableKind::Range { min, max }, TunableValue::Number(n)) =
                (spec.kind, self.value(spec.key)?)
                && !(min..=max).contains(&n)
            {
                return Err(TunableError::OutOfRange {
                    key: spec.key.to_string(),
                    value: n,
                    min,
                    max,
                });
            }
        }
        if self.min_cores > self.max_cores {
            return Err(TunableError::MinAboveMax {
                min: self.min_cores,
                max: self.max_cores,
            });
        }
        Ok(())
    }

    fn commit(&mut self, key: &str, value: TunableValue) -> TunableResult<()> {
        let mut candidate = self.clone();
        candidate.assign(key, value)?;
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    fn assign(&mut self, key: &str, value: TunableValue) -> TunableResult<()> {
        use TunableValue::{Flag, Number};

        match (key, value) {
            ("shift_all", Number(n)) => self.shift_all = n,
            ("shift_cpu1", Number(n)) => self.shift_cpu1 = n,
            ("shift_cpu2", Number(n)) => self.shift_cpu2 = n,
            ("down_shift", Number(n)) => self.down_shift = n,
            ("min_cores", Number(n)) => self.min_cores = n,
            ("max_cores", Number(n)) => self.max_cores = n,
            ("sample_time", Number(n)) => self.sample_time = n,
            ("debounce_threshold", Number(n)) => self.debounce_threshold = n,
            ("downshift_threshold", Number(n)) => self.downshift_threshold = n,
            ("sampling_periods", Number(n)) => self.sampling_periods = n,
            ("boost_duration", Number(n)) => self.boost_duration = n,
            ("touch_boost_enabled", Flag(b)) => self.touch_boost_enabled = b,
            ("debounce_burst", Flag(b)) => self.debounce_burst = b,
            ("debug", Flag(b)) => self.debug = b,
            _ => {
                return Err(TunableError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Parse a raw string against a key's spec, range-checking numbers.
fn parse_value(spec: &TunableSpec, raw: &str) -> TunableResult<TunableValue> {
    let trimmed = raw.trim();
    let invalid = || TunableError::InvalidValue {
        key: spec.key.to_string(),
        value: raw.to_string(),
    };

    match spec.kind {
        TunableKind::Range { min, max } => {
            let n: u32 = trimmed.parse().map_err(|_| invalid())?;
            if !(min..=max).contains(&n) {
                return Err(TunableError::OutOfRange {
                    key: spec.key.to_string(),
                    value: n,
                    min,
                    max,
                });
            }
            Ok(TunableValue::Number(n))
        }
        TunableKind::Flag => match trimmed.to_ascii_lowercase().as_str() {
            "1" | "y" | "yes" | "on" | "true" => Ok(TunableValue::Flag(true)),
            "0" | "n" | "no" | "off" | "false" => Ok(TunableValue::Flag(false)),
            _ => Err(invalid()),
        },
    }
}

/// Optional per-key overrides, as read from the `[tunables]` config table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TunableOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shift_all: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shift_cpu1: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shift_cpu2: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub down_shift: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_cores: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cores: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_time: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_threshold: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downshift_threshold: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling_periods: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boost_duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub touch_boost_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_burst: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,
}

impl TunableOverrides {
    /// Overlay the present keys onto `base`, validating the result as a whole.
    ///
    /// Keys are applied together so that, for example, lowering `max_cores`
    /// and `min_cores` in one file is not rejected half-way through.
    pub fn apply(&self, base: &Tunables) -> TunableResult<Tunables> {
        let mut next = base.clone();
        for (key, value) in self.entries() {
            let spec = spec_for(key).ok_or_else(|| TunableError::UnknownKey(key.to_string()))?;
            if let (TunableKind::Range { min, max }, TunableValue::Number(n)) = (spec.kind, value)
                && !(min..=max).contains(&n)
            {
                return Err(TunableError::OutOfRange {
                    key: key.to_string(),
                    value: n,
                    min,
                    max,
                });
            }
            next.assign(key, value)?;
        }
        next.validate()?;
        Ok(next)
    }

    /// Capture every key of a tunable set as an override.
    pub fn from_tunables(t: &Tunables) -> Self {
        Self {
            shift_all: Some(t.shift_all),
            shift_cpu1: Some(t.shift_cpu1),
            shift_cpu2: Some(t.shift_cpu2),
            down_shift: Some(t.down_shift),
            min_cores: Some(t.min_cores),
            max_cores: Some(t.max_cores),
            sample_time: Some(t.sample_time),
            debounce_threshold: Some(t.debounce_threshold),
            downshift_threshold: Some(t.downshift_threshold),
            sampling_periods: Some(t.sampling_periods),
            boost_duration: Some(t.boost_duration),
            touch_boost_enabled: Some(t.touch_boost_enabled),
            debounce_burst: Some(t.debounce_burst),
            debug: Some(t.debug),
        }
    }

    fn entries(&self) -> Vec<(&'static str, TunableValue)> {
        use TunableValue::{Flag, Number};

        let numbers = [
            ("shift_all", self.shift_all),
            ("shift_cpu1", self.shift_cpu1),
            ("shift_cpu2", self.shift_cpu2),
            ("down_shift", self.down_shift),
            ("min_cores", self.min_cores),
            ("max_cores", self.max_cores),
            ("sample_time", self.sample_time),
            ("debounce_threshold", self.debounce_threshold),
            ("downshift_threshold", self.downshift_threshold),
            ("sampling_periods", self.sampling_periods),
            ("boost_duration", self.boost_duration),
        ];
        let flags = [
            ("touch_boost_enabled", self.touch_boost_enabled),
            ("debounce_burst", self.debounce_burst),
            ("debug", self.debug),
        ];

        numbers
            .into_iter()
            .filter_map(|(k, v)| v.map(|n| (k, Number(n))))
            .chain(flags.into_iter().filter_map(|(k, v)| v.map(|b| (k, Flag(b)))))
            .collect()
    }
}
