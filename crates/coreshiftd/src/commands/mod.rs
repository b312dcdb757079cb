pub mod config;
pub mod run;
pub mod simulate;

use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use coreshift_core::{CoreshiftConfig, EngineSettings, Tunables};

/// Configuration after the file and every `--set` override are applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolved {
    pub tunables: Tunables,
    pub engine: EngineSettings,
}

/// Load `path` (or the defaults) and apply `key=value` overrides in order.
///
/// Overrides may touch read-only keys: they are applied before the engine
/// exists.
pub fn resolve(path: Option<&Path>, overrides: &[String]) -> anyhow::Result<Resolved> {
    let config = match path {
        Some(path) => CoreshiftConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => CoreshiftConfig::default(),
    };
    let mut tunables = config.tunables()?;
    for entry in overrides {
        let (key, value) = parse_assignment(entry)?;
        tunables
            .set_initial(key, value)
            .with_context(|| format!("invalid --set {entry}"))?;
    }
    Ok(Resolved {
        tunables,
        engine: config.engine,
    })
}

fn parse_assignment(entry: &str) -> anyhow::Result<(&str, &str)> {
    match entry.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value.trim())),
        _ => anyhow::bail!("expected KEY=VALUE, got {entry:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_defaults() {
        let resolved = resolve(None, &[]).unwrap();
        assert_eq!(resolved.tunables, Tunables::default());
        assert_eq!(resolved.engine, EngineSettings::default());
    }

    #[test]
    fn resolve_file_then_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coreshift.toml");
        std::fs::write(
            &path,
            "[tunables]\nshift_all = 550\nsampling_periods = 10\n\n[engine]\npause_ms = 250\n",
        )
        .unwrap();

        let resolved = resolve(
            Some(&path),
            &["shift_all=450".to_string(), "sampling_periods = 12".to_string()],
        )
        .unwrap();
        assert_eq!(resolved.tunables.shift_all(), 450);
        assert_eq!(resolved.tunables.sampling_periods(), 12);
        assert_eq!(resolved.engine.pause_ms, 250);
    }

    #[test]
    fn resolve_rejects_bad_overrides() {
        assert!(resolve(None, &["shift_all".to_string()]).is_err());
        assert!(resolve(None, &["=5".to_string()]).is_err());
        assert!(resolve(None, &["shift_all=9000".to_string()]).is_err());
        assert!(resolve(None, &["nope=1".to_string()]).is_err());
    }

    #[test]
    fn resolve_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve(Some(&dir.path().join("absent.toml")), &[]).unwrap_err();
        assert!(err.to_string().contains("failed to load"));
    }
}
