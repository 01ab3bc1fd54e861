//! Shared doubles for composite tests.

use crate::command::{Command, CommandBase};
use crate::context::RunContext;
use crate::registry::ProcessRegistry;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use trellis_core::{CommandResult, EnvMap, ErrorInfo, NullReporter, RunError, RunsOn, Status};

pub fn test_context() -> RunContext {
    RunContext::new(
        CancellationToken::new(),
        Arc::new(Semaphore::new(4)),
        Arc::new(NullReporter),
        Arc::new(ProcessRegistry::new()),
    )
}

/// What a [`StubCommand`] observed by the time it ran.
#[derive(Debug, Clone, Default)]
pub struct Observed {
    pub cwd: PathBuf,
    pub env: EnvMap,
}

/// Command double returning a canned result and recording the cwd/env
/// state pushed into it by its parent.
#[derive(Clone)]
pub struct StubCommand {
    base: CommandBase,
    status: Status,
    exit_code: i32,
    error: Option<RunError>,
    new_cwd: Option<PathBuf>,
    runs: Arc<AtomicUsize>,
    observed: Arc<Mutex<Observed>>,
}

impl StubCommand {
    pub fn succeeding(label: &str) -> Self {
        Self::with_outcome(label, Status::Success, 0, None)
    }

    pub fn failing(label: &str, exit_code: i32) -> Self {
        Self::with_outcome(
            label,
            Status::Error,
            exit_code,
            Some(RunError::ProcessExit { code: exit_code }),
        )
    }

    pub fn skipping(label: &str, exit_code: i32) -> Self {
        Self::with_outcome(
            label,
            Status::Skipped,
            exit_code,
            Some(RunError::SkipIntentional),
        )
    }

    pub fn with_outcome(
        label: &str,
        status: Status,
        exit_code: i32,
        error: Option<RunError>,
    ) -> Self {
        Self {
            base: CommandBase::new(label),
            status,
            exit_code,
            error,
            new_cwd: None,
            runs: Arc::new(AtomicUsize::new(0)),
            observed: Arc::new(Mutex::new(Observed::default())),
        }
    }

    pub fn with_runs_on(mut self, runs_on: RunsOn) -> Self {
        self.base.runs_on = runs_on;
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.base.cwd = cwd.into();
        self
    }

    pub fn announcing_cwd(mut self, new_cwd: impl Into<PathBuf>) -> Self {
        self.new_cwd = Some(new_cwd.into());
        self
    }

    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn observed(&self) -> Observed {
        self.observed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Command for StubCommand {
    fn label(&self) -> &str {
        &self.base.label
    }

    fn runs_on(&self) -> &RunsOn {
        &self.base.runs_on
    }

    fn set_cwd(&mut self, cwd: &Path, force: bool) {
        self.base.set_cwd(cwd, force);
    }

    fn inherit_env(&mut self, env: &EnvMap) {
        self.base.inherit_env(env);
    }

    fn boxed_clone(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }

    async fn run(&mut self, _ctx: &RunContext) -> CommandResult {
        self.runs.fetch_add(1, Ordering::SeqCst);
        *self.observed.lock().unwrap() = Observed {
            cwd: self.base.cwd.clone(),
            env: self.base.env.clone(),
        };
        CommandResult {
            label: self.base.label.clone(),
            status: self.status,
            exit_code: self.exit_code,
            error: self.error.as_ref().map(ErrorInfo::from),
            stdout: Vec::new(),
            stderr: Vec::new(),
            children: Vec::new(),
            new_cwd: self.new_cwd.clone(),
        }
    }
}
