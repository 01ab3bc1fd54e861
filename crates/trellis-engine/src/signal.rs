//! Two-stage termination signal handling.
//!
//! The broker runs on its own task. The first signal of a kind asks the
//! run to wind down gracefully: no new processes spawn, and the signal
//! is forwarded to every running child process group. A second signal
//! of the same kind cancels the run's context and kills the remaining
//! groups outright.

use crate::registry::ProcessRegistry;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct SignalBroker {
    cancel: CancellationToken,
    registry: Arc<ProcessRegistry>,
}

impl SignalBroker {
    pub fn new(cancel: CancellationToken, registry: Arc<ProcessRegistry>) -> Self {
        Self { cancel, registry }
    }

    /// Start listening on a dedicated task. The task ends when the
    /// context is cancelled, whether by a second signal or by the run
    /// finishing.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.listen())
    }

    #[cfg(unix)]
    async fn listen(self) {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupt = match signal(SignalKind::interrupt()) {
            Ok(stream) => stream,
            Err(e) => {
                log::error!("failed to install SIGINT handler: {e}");
                return;
            }
        };
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {e}");
                return;
            }
        };

        let mut seen = std::collections::HashSet::new();
        loop {
            tokio::select! {
                received = interrupt.recv() => match received {
                    Some(()) => self.observe("SIGINT", nix::sys::signal::Signal::SIGINT, &mut seen),
                    None => break,
                },
                received = terminate.recv() => match received {
                    Some(()) => self.observe("SIGTERM", nix::sys::signal::Signal::SIGTERM, &mut seen),
                    None => break,
                },
                () = self.cancel.cancelled() => break,
            }
        }
    }

    #[cfg(unix)]
    fn observe(
        &self,
        name: &'static str,
        signal: nix::sys::signal::Signal,
        seen: &mut std::collections::HashSet<&'static str>,
    ) {
        if seen.insert(name) {
            log::warn!("received {name}; waiting for running commands (send again to abort)");
            self.registry.begin_drain();
            self.registry.signal_all(signal);
        } else {
            log::warn!("received {name} again; aborting");
            self.registry.kill_all();
            self.cancel.cancel();
        }
    }

    #[cfg(not(unix))]
    async fn listen(self) {
        let mut seen = false;
        loop {
            tokio::select! {
                received = tokio::signal::ctrl_c() => {
                    if let Err(e) = received {
                        log::error!("failed to listen for ctrl-c: {e}");
                        return;
                    }
                    if seen {
                        log::warn!("received ctrl-c again; aborting");
                        self.registry.kill_all();
                        self.cancel.cancel();
                    } else {
                        seen = true;
                        log::warn!("received ctrl-c; waiting for running commands (send again to abort)");
                        self.registry.begin_drain();
                    }
                }
                () = self.cancel.cancelled() => break,
            }
        }
    }
}
