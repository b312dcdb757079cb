//! coreshift.toml configuration parser.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::tunables::{TunableOverrides, Tunables};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoreshiftConfig {
    #[serde(default)]
    pub tunables: TunableOverrides,
    #[serde(default)]
    pub engine: EngineSettings,
}

/// Timings owned by the engine rather than the tunable surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
    /// Length of the pause window opened by a burst activation or a re-enable.
    pub pause_ms: u64,
    /// Delay before the first tick after `start()`.
    pub startup_delay_ms: u64,
    /// Pause window opened by `start()`, letting the host settle.
    pub startup_grace_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            pause_ms: 1000,
            startup_delay_ms: 10_000,
            startup_grace_ms: 20_000,
        }
    }
}

impl EngineSettings {
    /// Settings with no boot delay and no boot grace.
    pub fn immediate() -> Self {
        Self {
            startup_delay_ms: 0,
            startup_grace_ms: 0,
            ..Self::default()
        }
    }

    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }
}

impl CoreshiftConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Resolve the configured overrides on top of the defaults.
    pub fn tunables(&self) -> Result<Tunables, ConfigError> {
        Ok(self.tunables.apply(&Tunables::default())?)
    }

    /// Scaffold a config listing every tunable at its default.
    pub fn scaffold() -> Self {
        CoreshiftConfig {
            tunables: TunableOverrides::from_tunables(&Tunables::default()),
            engine: EngineSettings::default(),
        }
    }
}

impl std::str::FromStr for CoreshiftConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: CoreshiftConfig = toml::from_str(s)?;
        config.tunables.apply(&Tunables::default())?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaffold() {
        let config = CoreshiftConfig::scaffold();
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("shift_all = 500"));
        assert!(toml_str.contains("pause_ms = 1000"));
    }

    #[test]
    fn test_parse_empty() {
        let config: CoreshiftConfig = "".parse().unwrap();
        assert_eq!(config, CoreshiftConfig::default());
        assert_eq!(config.tunables().unwrap(), Tunables::default());
    }

    #[test]
    fn test_parse_overrides() {
        let toml_str = r#"
[tunables]
shift_all = 560
down_shift = 90
sampling_periods = 20
touch_boost_enabled = false

[engine]
pause_ms = 500
"#;
        let config: CoreshiftConfig = toml_str.parse().unwrap();
        let t = config.tunables().unwrap();
        assert_eq!(t.shift_all(), 560);
        assert_eq!(t.down_shift(), 90);
        assert_eq!(t.sampling_periods(), 20);
        assert!(!t.touch_boost_enabled());
        assert_eq!(config.engine.pause(), Duration::from_millis(500));
        assert_eq!(config.engine.startup_grace_ms, 20_000);
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        let toml_str = "[tunables]\nmax_cores = 9\n";
        let err = toml_str.parse::<CoreshiftConfig>().unwrap_err();
        assert!(matches!(err, ConfigError::Tunable(_)));
    }

    #[test]
    fn test_parse_rejects_unknown_key() {
        let toml_str = "[tunables]\nturbo = 1\n";
        let err = toml_str.parse::<CoreshiftConfig>().unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coreshift.toml");
        std::fs::write(&path, CoreshiftConfig::scaffold().to_toml_string().unwrap()).unwrap();

        let config = CoreshiftConfig::from_file(&path).unwrap();
        assert_eq!(config, CoreshiftConfig::scaffold());
    }

    #[test]
    fn test_immediate_settings() {
        let s = EngineSettings::immediate();
        assert_eq!(s.startup_delay(), Duration::ZERO);
        assert_eq!(s.startup_grace(), Duration::ZERO);
        assert_eq!(s.pause(), Duration::from_secs(1));
    }
}
