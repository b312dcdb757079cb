//! Host adapters: Linux sysfs core control and `/proc/stat` load.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, warn};

use coreshift_core::CoreId;
use coreshift_engine::{CoreLifecycle, LifecycleError, LifecycleResult, LoadSource};

/// Default sysfs directory for CPU hotplug.
pub const SYSFS_CPU_ROOT: &str = "/sys/devices/system/cpu";

/// Default procfs mount.
pub const PROC_ROOT: &str = "/proc";

/// Parse a kernel CPU list such as `0-3,5,7-8`.
pub fn parse_cpu_list(s: &str) -> Option<Vec<CoreId>> {
    let s = s.trim();
    if s.is_empty() {
        return Some(Vec::new());
    }

    let mut cores = Vec::new();
    for part in s.split(',') {
        let part = part.trim();
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo: CoreId = lo.parse().ok()?;
                let hi: CoreId = hi.parse().ok()?;
                if lo > hi {
                    return None;
                }
                cores.extend(lo..=hi);
            }
            None => cores.push(part.parse().ok()?),
        }
    }
    cores.sort_unstable();
    cores.dedup();
    Some(cores)
}

fn read_cpu_list(path: &Path) -> io::Result<Vec<CoreId>> {
    let content = fs::read_to_string(path)?;
    parse_cpu_list(&content).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("malformed cpu list in {}: {content:?}", path.display()),
        )
    })
}

/// Run a blocking sysfs write. Inside a multi-threaded runtime the worker
/// is handed off first: `cpuN/online` writes return only once the kernel
/// has finished the transition.
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

/// Core lifecycle over `/sys/devices/system/cpu`.
pub struct SysfsCpus {
    root: PathBuf,
    possible: u32,
}

impl SysfsCpus {
    /// Open a sysfs CPU directory, reading the `possible` mask once.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        let possible = read_cpu_list(&root.join("possible"))?
            .last()
            .map_or(1, |&max| max + 1);
        debug!(root = %root.display(), possible, "sysfs cpu control opened");
        Ok(Self { root, possible })
    }

    fn online(&self) -> io::Result<Vec<CoreId>> {
        read_cpu_list(&self.root.join("online"))
    }

    fn write_online(&self, core: CoreId, on: bool) -> LifecycleResult<()> {
        let path = self.root.join(format!("cpu{core}")).join("online");
        blocking(|| fs::write(&path, if on { "1" } else { "0" })).map_err(|e| {
            LifecycleError::Transition {
                core,
                reason: format!("{}: {e}", path.display()),
            }
        })
    }
}

impl CoreLifecycle for SysfsCpus {
    fn activate(&self, core: CoreId) -> LifecycleResult<()> {
        if core >= self.possible {
            return Err(LifecycleError::NoSuchCore(core));
        }
        if self.is_active(core) {
            return Ok(());
        }
        self.write_online(core, true)
    }

    fn deactivate(&self, core: CoreId) -> LifecycleResult<()> {
        if core == 0 {
            return Err(LifecycleError::Primary(core));
        }
        if core >= self.possible {
            return Err(LifecycleError::NoSuchCore(core));
        }
        if !self.is_active(core) {
            return Ok(());
        }
        self.write_online(core, false)
    }

    fn is_active(&self, core: CoreId) -> bool {
        match self.online() {
            Ok(online) => online.contains(&core),
            Err(e) => {
                warn!(error = %e, "failed to read online cpus");
                core == 0
            }
        }
    }

    fn active_count(&self) -> u32 {
        match self.online() {
            Ok(online) => online.len() as u32,
            Err(e) => {
                warn!(error = %e, "failed to read online cpus");
                1
            }
        }
    }

    fn max_possible(&self) -> u32 {
        self.possible
    }
}

/// Runnable-task count from the `procs_running` line of `/proc/stat`.
pub struct ProcStatLoad {
    path: PathBuf,
    last: AtomicU32,
}

impl ProcStatLoad {
    pub fn new(proc_root: &Path) -> Self {
        Self {
            path: proc_root.join("stat"),
            last: AtomicU32::new(0),
        }
    }

    fn read(&self) -> io::Result<u32> {
        let content = fs::read_to_string(&self.path)?;
        content
            .lines()
            .find_map(|line| line.strip_prefix("procs_running "))
            .and_then(|n| n.trim().parse().ok())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "no procs_running line"))
    }
}

impl LoadSource for ProcStatLoad {
    fn runnable_count(&self) -> u32 {
        match self.read() {
            Ok(n) => {
                self.last.store(n, Ordering::Relaxed);
                n
            }
            Err(e) => {
                let last = self.last.load(Ordering::Relaxed);
                warn!(path = %self.path.display(), error = %e, last, "load read failed");
                last
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_sysfs(possible: &str, online: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("possible"), possible).unwrap();
        fs::write(dir.path().join("online"), online).unwrap();
        for core in parse_cpu_list(possible).unwrap() {
            let cpu = dir.path().join(format!("cpu{core}"));
            fs::create_dir(&cpu).unwrap();
            fs::write(cpu.join("online"), "1").unwrap();
        }
        dir
    }

    #[test]
    fn parse_cpu_list_values() {
        assert_eq!(parse_cpu_list("0-3\n"), Some(vec![0, 1, 2, 3]));
        assert_eq!(parse_cpu_list("0,2-3,5"), Some(vec![0, 2, 3, 5]));
        assert_eq!(parse_cpu_list("1,0,1"), Some(vec![0, 1]));
        assert_eq!(parse_cpu_list(""), Some(vec![]));
        assert_eq!(parse_cpu_list("3-1"), None);
        assert_eq!(parse_cpu_list("a-b"), None);
    }

    #[test]
    fn sysfs_reads_counts() {
        let dir = fake_sysfs("0-3\n", "0-1\n");
        let cpus = SysfsCpus::open(dir.path()).unwrap();
        assert_eq!(cpus.max_possible(), 4);
        assert_eq!(cpus.active_count(), 2);
        assert!(cpus.is_active(1));
        assert!(!cpus.is_active(2));
    }

    #[test]
    fn sysfs_writes_online_files() {
        let dir = fake_sysfs("0-3\n", "0\n");
        let cpus = SysfsCpus::open(dir.path()).unwrap();

        cpus.activate(2).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("cpu2/online")).unwrap(), "1");

        // The kernel would update `online`; emulate it.
        fs::write(dir.path().join("online"), "0,2\n").unwrap();
        cpus.deactivate(2).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("cpu2/online")).unwrap(), "0");
    }

    #[test]
    fn sysfs_rejects_primary_and_unknown() {
        let dir = fake_sysfs("0-1\n", "0-1\n");
        let cpus = SysfsCpus::open(dir.path()).unwrap();
        assert!(matches!(cpus.deactivate(0), Err(LifecycleError::Primary(0))));
        assert!(matches!(cpus.activate(7), Err(LifecycleError::NoSuchCore(7))));
    }

    #[test]
    fn sysfs_redundant_requests_do_not_write() {
        let dir = fake_sysfs("0-3\n", "0-1\n");
        let cpus = SysfsCpus::open(dir.path()).unwrap();
        fs::remove_file(dir.path().join("cpu3/online")).unwrap();
        // cpu3 is offline; deactivating it must not touch the missing file.
        cpus.deactivate(3).unwrap();
        cpus.activate(1).unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sysfs_writes_from_runtime_worker() {
        let dir = fake_sysfs("0-3\n", "0\n");
        let cpus = SysfsCpus::open(dir.path()).unwrap();
        cpus.activate(3).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("cpu3/online")).unwrap(), "1");
    }

    #[tokio::test]
    async fn sysfs_writes_on_current_thread_runtime() {
        let dir = fake_sysfs("0-3\n", "0\n");
        let cpus = SysfsCpus::open(dir.path()).unwrap();
        cpus.activate(1).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("cpu1/online")).unwrap(), "1");
    }

    #[test]
    fn sysfs_open_fails_without_possible() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SysfsCpus::open(dir.path()).is_err());
    }

    #[test]
    fn proc_stat_parses_procs_running() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("stat"),
            "cpu  1 2 3 4\nctxt 99\nprocs_running 6\nprocs_blocked 0\n",
        )
        .unwrap();
        let load = ProcStatLoad::new(dir.path());
        assert_eq!(load.runnable_count(), 6);
    }

    #[test]
    fn proc_stat_keeps_last_reading_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let stat = dir.path().join("stat");
        fs::write(&stat, "procs_running 3\n").unwrap();
        let load = ProcStatLoad::new(dir.path());
        assert_eq!(load.runnable_count(), 3);

        fs::remove_file(&stat).unwrap();
        assert_eq!(load.runnable_count(), 3);
    }
}
