//! Engine facade: wires a command tree to its run context.

use crate::command::Command;
use crate::context::RunContext;
use crate::registry::ProcessRegistry;
use crate::signal::SignalBroker;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use trellis_core::{CommandResult, NullReporter, Reporter};

/// Runs command trees. Owns the run-wide policy: the cap on
/// concurrently running leaf processes and the progress reporter.
///
/// The cap defaults to the number of hardware threads and is enforced
/// with a semaphore leaves acquire around their child process; composite
/// commands never hold a permit.
pub struct Engine {
    max_parallel: usize,
    reporter: Arc<dyn Reporter>,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            max_parallel: default_parallelism(),
            reporter: Arc::new(NullReporter),
        }
    }

    /// Cap on simultaneously running leaf processes (minimum 1).
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Run `root` to completion and return its result tree.
    pub async fn run(&self, root: Box<dyn Command>) -> CommandResult {
        self.run_with_token(root, CancellationToken::new()).await
    }

    /// Run `root` under an externally controlled cancellation token.
    /// Callers compose timeouts by cancelling the token on a deadline.
    pub async fn run_with_token(
        &self,
        root: Box<dyn Command>,
        cancel: CancellationToken,
    ) -> CommandResult {
        self.execute(root, cancel, Arc::new(ProcessRegistry::new()))
            .await
    }

    /// Run `root` with two-stage termination signal handling installed
    /// for the duration of the run.
    pub async fn run_with_signals(&self, root: Box<dyn Command>) -> CommandResult {
        let cancel = CancellationToken::new();
        let registry = Arc::new(ProcessRegistry::new());
        let broker = SignalBroker::new(cancel.clone(), Arc::clone(&registry)).spawn();

        let result = self.execute(root, cancel.clone(), registry).await;

        cancel.cancel();
        let _ = broker.await;
        result
    }

    async fn execute(
        &self,
        mut root: Box<dyn Command>,
        cancel: CancellationToken,
        registry: Arc<ProcessRegistry>,
    ) -> CommandResult {
        let ctx = RunContext::new(
            cancel,
            Arc::new(Semaphore::new(self.max_parallel)),
            Arc::clone(&self.reporter),
            registry,
        );
        root.run(&ctx).await
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism().map_or(4, NonZeroUsize::get)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StubCommand;
    use trellis_core::Status;

    #[test]
    fn parallelism_cap_is_at_least_one() {
        let engine = Engine::new().with_max_parallel(0);
        assert_eq!(engine.max_parallel, 1);
    }

    #[tokio::test]
    async fn runs_a_root_command_to_completion() {
        let engine = Engine::new();
        let result = engine
            .run(Box::new(StubCommand::succeeding("root")))
            .await;
        assert_eq!(result.status, Status::Success);
        assert_eq!(result.label, "root");
    }

    #[tokio::test]
    async fn pre_cancelled_token_short_circuits_the_run() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let engine = Engine::new();
        let leaf = crate::process::ProcessCommand::new("leaf", "/bin/true", vec![]);
        let result = engine.run_with_token(Box::new(leaf), cancel).await;
        assert_eq!(result.status, Status::Error);
        assert!(result.is_error_kind(trellis_core::ErrorKind::Cancelled));
    }
}
