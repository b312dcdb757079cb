use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;

use coreshift_core::EngineSettings;
use coreshift_engine::{EngineStatus, HotplugEngine, InMemoryCores, ManualTimer, SharedLoad};

use super::Resolved;

pub struct SimulateOptions {
    /// Runnable count for each tick, in order.
    pub load: Vec<u32>,
    pub cores: u32,
    pub active: u32,
    /// 1-based ticks preceded by an input event.
    pub touch: Vec<u64>,
    pub immediate: bool,
}

/// One simulated tick.
#[derive(Debug, Serialize)]
pub struct Step {
    pub tick: u64,
    pub time_ms: u64,
    pub runnable: u32,
    #[serde(flatten)]
    pub status: EngineStatus,
}

/// Parse `value[xcount],...`, e.g. `6x12,0x40,3`.
pub fn parse_load_script(script: &str) -> anyhow::Result<Vec<u32>> {
    let mut load = Vec::new();
    for part in script.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (value, count) = match part.split_once('x') {
            Some((value, count)) => (value.trim(), count.trim()),
            None => (part, "1"),
        };
        let value: u32 = value
            .parse()
            .with_context(|| format!("bad runnable count in {part:?}"))?;
        let count: usize = count
            .parse()
            .with_context(|| format!("bad repeat count in {part:?}"))?;
        load.extend(std::iter::repeat_n(value, count));
    }
    if load.is_empty() {
        anyhow::bail!("load script is empty");
    }
    Ok(load)
}

/// Replay the load script and collect one [`Step`] per tick.
pub fn run_script(resolved: Resolved, opts: &SimulateOptions) -> anyhow::Result<Vec<Step>> {
    let settings = if opts.immediate {
        EngineSettings {
            startup_delay_ms: 0,
            startup_grace_ms: 0,
            ..resolved.engine
        }
    } else {
        resolved.engine
    };

    let load = Arc::new(SharedLoad::new(0));
    let timer = Arc::new(ManualTimer::new());
    let engine = HotplugEngine::new(
        resolved.tunables,
        settings,
        Arc::new(InMemoryCores::new(opts.cores, opts.active)),
        load.clone(),
        timer.clone(),
    );
    engine.start();

    let mut steps = Vec::with_capacity(opts.load.len());
    for (tick, &runnable) in (1u64..).zip(&opts.load) {
        if opts.touch.contains(&tick) {
            engine.on_input_event();
        }
        load.set(runnable);

        let before = engine.status().ticks;
        while engine.status().ticks == before {
            if !timer.fire_next() {
                anyhow::bail!("engine stopped scheduling ticks before tick {tick}");
            }
        }

        steps.push(Step {
            tick,
            time_ms: timer.now().as_millis() as u64,
            runnable,
            status: engine.status(),
        });
    }
    Ok(steps)
}

pub fn simulate(resolved: Resolved, opts: &SimulateOptions, format: &str) -> anyhow::Result<()> {
    let steps = run_script(resolved, opts)?;
    match format {
        "json" => {
            for step in &steps {
                println!("{}", serde_json::to_string(step)?);
            }
        }
        _ => {
            for step in &steps {
                let s = &step.status;
                println!(
                    "{:>5} {:>8}ms  run={:<3} avg={:<4} cores={}  up={} down={}  {:?}",
                    step.tick,
                    step.time_ms,
                    step.runnable,
                    s.last_average,
                    s.active_cores,
                    s.streaks.upshift.get(),
                    s.streaks.downshift.get(),
                    s.last_decision,
                );
            }
        }
    }
    Ok(())
}
