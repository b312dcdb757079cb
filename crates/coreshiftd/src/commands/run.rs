use std::path::PathBuf;
use std::sync::Arc;

use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info, warn};

use coreshift_core::{TunableError, Tunables};
use coreshift_engine::{CoreLifecycle, HotplugEngine, InMemoryCores, LoadSource, TokioTimer};

use crate::host::{ProcStatLoad, SysfsCpus};

pub struct RunOptions {
    pub config: Option<PathBuf>,
    pub set: Vec<String>,
    pub simulate: Option<u32>,
    pub sysfs_root: PathBuf,
    pub proc_root: PathBuf,
}

pub async fn run(opts: RunOptions) -> anyhow::Result<()> {
    let resolved = super::resolve(opts.config.as_deref(), &opts.set)?;

    let cores: Arc<dyn CoreLifecycle> = match opts.simulate {
        Some(total) => {
            info!(total, "dry run: driving in-memory cores");
            Arc::new(InMemoryCores::new(total, 1))
        }
        None => Arc::new(SysfsCpus::open(&opts.sysfs_root)?),
    };
    let load: Arc<dyn LoadSource> = Arc::new(ProcStatLoad::new(&opts.proc_root));
    info!(
        possible = cores.max_possible(),
        online = cores.active_count(),
        "core control ready"
    );

    let timer = Arc::new(TokioTimer::new());
    let engine = HotplugEngine::new(resolved.tunables, resolved.engine, cores, load, timer);
    engine.start();
    info!(
        startup_delay_ms = resolved.engine.startup_delay_ms,
        startup_grace_ms = resolved.engine.startup_grace_ms,
        "coreshiftd started"
    );

    let mut input = signal(SignalKind::user_defined1())?;
    let mut toggle = signal(SignalKind::user_defined2())?;
    let mut hangup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            _ = input.recv() => engine.on_input_event(),
            _ = toggle.recv() => {
                let enable = !engine.is_enabled();
                engine.set_enabled(enable);
                info!(enabled = enable, "toggled by SIGUSR2");
            }
            _ = hangup.recv() => match &opts.config {
                Some(path) => match super::resolve(Some(path), &opts.set) {
                    Ok(reloaded) => {
                        let changed = apply_tunables(&engine, &reloaded.tunables);
                        info!(path = %path.display(), changed, "config reloaded");
                    }
                    Err(e) => warn!(error = %e, "config reload failed"),
                },
                None => info!("SIGHUP ignored: no config file"),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    engine.disable();
    let status = engine.status();
    info!(active_cores = status.active_cores, ticks = status.ticks, "coreshiftd stopped");
    Ok(())
}

/// Push every changed runtime-writable tunable into the engine.
///
/// Writes are retried once so that a `min_cores`/`max_cores` pair moving
/// in the same direction lands regardless of key order. Returns how many
/// keys changed.
fn apply_tunables(engine: &HotplugEngine, desired: &Tunables) -> usize {
    let live = engine.tunables();
    let mut todo: Vec<(&'static str, String)> = Vec::new();
    for key in Tunables::keys() {
        match (live.get(key), desired.get(key)) {
            (Ok(current), Ok(wanted)) if current != wanted => todo.push((key, wanted)),
            _ => {}
        }
    }

    let mut changed = 0;
    for pass in 0..2 {
        let mut retry = Vec::new();
        for (key, value) in todo {
            match engine.set_tunable(key, &value) {
                Ok(()) => changed += 1,
                Err(TunableError::ReadOnly(_)) => {
                    warn!(key, "read-only tunable changed in config; restart to apply");
                }
                Err(e) if pass == 0 => {
                    retry.push((key, value));
                    debug!(key, error = %e, "tunable write deferred");
                }
                Err(e) => warn!(key, error = %e, "tunable write rejected"),
            }
        }
        todo = retry;
    }
    changed
}
