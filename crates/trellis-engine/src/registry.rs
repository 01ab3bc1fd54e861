//! Tracking of live child process groups.
//!
//! Leaves register their process group for the lifetime of the child so
//! the signal broker can forward termination signals to everything the
//! run has spawned. The drain flag stops new leaves from spawning after
//! a first termination signal while already-running children finish.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct ProcessRegistry {
    draining: AtomicBool,
    groups: Mutex<HashSet<u32>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, pgid: u32) {
        self.groups.lock().unwrap().insert(pgid);
    }

    pub fn unregister(&self, pgid: u32) {
        self.groups.lock().unwrap().remove(&pgid);
    }

    /// Stop admitting new leaf processes. Running children are unaffected.
    pub fn begin_drain(&self) {
        self.draining.store(true, Ordering::SeqCst);
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> Vec<u32> {
        self.groups.lock().unwrap().iter().copied().collect()
    }

    /// Forward `signal` to every registered process group.
    #[cfg(unix)]
    pub fn signal_all(&self, signal: nix::sys::signal::Signal) {
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        for pgid in self.snapshot() {
            if let Err(e) = killpg(Pid::from_raw(pgid as i32), signal) {
                log::debug!("{signal} to process group {pgid} failed: {e}");
            }
        }
    }

    /// Kill every registered process group outright.
    #[cfg(unix)]
    pub fn kill_all(&self) {
        self.signal_all(nix::sys::signal::Signal::SIGKILL);
    }

    #[cfg(windows)]
    pub fn kill_all(&self) {
        for pid in self.snapshot() {
            if let Err(e) = std::process::Command::new("taskkill")
                .args(["/PID", &pid.to_string(), "/T", "/F"])
                .output()
            {
                log::debug!("taskkill for pid {pid} failed: {e}");
            }
        }
    }

    #[cfg(not(any(unix, windows)))]
    pub fn kill_all(&self) {
        log::warn!("process group termination not supported on this platform");
    }
}
