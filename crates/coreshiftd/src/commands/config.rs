use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use coreshift_core::{CoreshiftConfig, TUNABLES, TunableKind, TunableOverrides, Tunables};

use super::Resolved;

/// Write a scaffold coreshift.toml to `path`.
pub fn init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let content = CoreshiftConfig::scaffold().to_toml_string()?;
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    println!("Generated {}", path.display());
    Ok(())
}

/// Print the resolved configuration.
pub fn show(resolved: &Resolved, format: &str) -> anyhow::Result<()> {
    print!("{}", render(resolved, format)?);
    Ok(())
}

fn render(resolved: &Resolved, format: &str) -> anyhow::Result<String> {
    let out = match format {
        "json" => format!("{}\n", serde_json::to_string_pretty(resolved)?),
        "toml" => {
            let config = CoreshiftConfig {
                tunables: TunableOverrides::from_tunables(&resolved.tunables),
                engine: resolved.engine,
            };
            config.to_toml_string()?
        }
        _ => {
            let mut out = String::new();
            for key in Tunables::keys() {
                out.push_str(&format!("{key:<22} {}\n", resolved.tunables.get(key)?));
            }
            let engine = &resolved.engine;
            out.push_str(&format!("{:<22} {}\n", "pause_ms", engine.pause_ms));
            out.push_str(&format!("{:<22} {}\n", "startup_delay_ms", engine.startup_delay_ms));
            out.push_str(&format!("{:<22} {}\n", "startup_grace_ms", engine.startup_grace_ms));
            out
        }
    };
    Ok(out)
}

#[derive(Serialize)]
struct KeyInfo {
    key: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    min: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max: Option<u32>,
    default: String,
    writable: bool,
    description: &'static str,
}

fn key_table() -> anyhow::Result<Vec<KeyInfo>> {
    let defaults = Tunables::default();
    TUNABLES
        .iter()
        .map(|spec| -> anyhow::Result<KeyInfo> {
            let (min, max) = match spec.kind {
                TunableKind::Range { min, max } => (Some(min), Some(max)),
                TunableKind::Flag => (None, None),
            };
            Ok(KeyInfo {
                key: spec.key,
                min,
                max,
                default: defaults.get(spec.key)?,
                writable: spec.runtime_writable,
                description: spec.description,
            })
        })
        .collect()
}

/// List every tunable key.
pub fn keys(format: &str) -> anyhow::Result<()> {
    let table = key_table()?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&table)?),
        _ => {
            for info in &table {
                let range = match (info.min, info.max) {
                    (Some(min), Some(max)) => format!("{min}..={max}"),
                    _ => "flag".to_string(),
                };
                let access = if info.writable { "rw" } else { "ro" };
                println!(
                    "{:<22} {:<10} {:<6} {access}  {}",
                    info.key, range, info.default, info.description
                );
            }
        }
    }
    Ok(())
}
