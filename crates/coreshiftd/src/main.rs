//! coreshiftd: load-driven CPU core hotplug daemon.
//!
//! # Usage
//!
//! ```text
//! coreshiftd run --config /etc/coreshift.toml
//! coreshiftd simulate --load 6x12,0x40 --immediate --format json
//! coreshiftd config show --set shift_all=450 --format toml
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod host;

#[derive(Parser)]
#[command(
    name = "coreshiftd",
    about = "Load-driven CPU core hotplug daemon",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Drive the host's cores from its runnable-task count.
    ///
    /// Signals: SIGUSR1 reports an input event (touch boost), SIGUSR2
    /// toggles the engine, SIGHUP reloads the config file, Ctrl-C exits.
    Run {
        /// Config file (coreshift.toml).
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override a tunable: key=value. Repeatable.
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
        /// Dry run: drive N in-memory cores instead of sysfs.
        #[arg(long, value_name = "CORES")]
        simulate: Option<u32>,
        /// sysfs CPU directory.
        #[arg(long, default_value = host::SYSFS_CPU_ROOT)]
        sysfs_root: PathBuf,
        /// procfs mount point.
        #[arg(long, default_value = host::PROC_ROOT)]
        proc_root: PathBuf,
    },
    /// Replay a scripted load against in-memory cores on a fake clock.
    Simulate {
        /// Runnable counts per tick: value[xcount], comma separated.
        #[arg(short, long)]
        load: String,
        /// Total cores.
        #[arg(long, default_value = "4")]
        cores: u32,
        /// Cores online at start.
        #[arg(long, default_value = "1")]
        active: u32,
        /// Deliver an input event before this tick (1-based). Repeatable.
        #[arg(long = "touch", value_name = "TICK")]
        touch: Vec<u64>,
        /// Skip the boot delay and boot grace.
        #[arg(long)]
        immediate: bool,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Inspect or scaffold configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// List every tunable with its range and default.
    Keys {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a coreshift.toml listing every default.
    Init {
        #[arg(short, long, default_value = "coreshift.toml")]
        path: PathBuf,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the resolved configuration.
    Show {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
        /// Output format: text, json or toml
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,coreshift=debug,coreshiftd=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            set,
            simulate,
            sysfs_root,
            proc_root,
        } => {
            let opts = commands::run::RunOptions {
                config,
                set,
                simulate,
                sysfs_root,
                proc_root,
            };
            commands::run::run(opts).await
        }
        Command::Simulate {
            load,
            cores,
            active,
            touch,
            immediate,
            config,
            set,
            format,
        } => {
            let resolved = commands::resolve(config.as_deref(), &set)?;
            let opts = commands::simulate::SimulateOptions {
                load: commands::simulate::parse_load_script(&load)?,
                cores,
                active,
                touch,
                immediate,
            };
            commands::simulate::simulate(resolved, &opts, &format)
        }
        Command::Config { action } => match action {
            ConfigAction::Init { path, force } => commands::config::init(&path, force),
            ConfigAction::Show {
                config,
                set,
                format,
            } => {
                let resolved = commands::resolve(config.as_deref(), &set)?;
                commands::config::show(&resolved, &format)
            }
        },
        Command::Keys { format } => commands::config::keys(&format),
    }
}
