//! Leaf command executing one OS process.

use crate::command::{Command, CommandBase};
use crate::context::RunContext;
use crate::tee::{pump, LastLine, LineScanner};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use trellis_core::{CommandResult, EnvMap, EventKind, RunError, RunsOn, Status};

/// Character cap for the stderr excerpt attached to failure events.
const LAST_LINE_MAX: usize = 160;

/// A command that spawns one child process, streams its output as
/// progress events, and classifies the exit code.
///
/// The child runs in its own process group so signal forwarding reaches
/// grandchildren; one permit of the global concurrency cap is held for
/// the duration of the process.
#[derive(Debug, Clone)]
pub struct ProcessCommand {
    base: CommandBase,
    path: PathBuf,
    args: Vec<String>,
    success_exit_codes: Vec<i32>,
    skip_exit_codes: Vec<i32>,
}

impl ProcessCommand {
    pub fn new(label: impl Into<String>, path: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            base: CommandBase::new(label),
            path: path.into(),
            args,
            success_exit_codes: vec![0],
            skip_exit_codes: Vec::new(),
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.base.cwd = cwd.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.base.env.insert(key.into(), value.into());
        self
    }

    pub fn with_runs_on(mut self, runs_on: RunsOn) -> Self {
        self.base.runs_on = runs_on;
        self
    }

    pub fn with_success_exit_codes(mut self, codes: Vec<i32>) -> Self {
        self.success_exit_codes = codes;
        self
    }

    /// Exit codes that mark the result skipped and stop the enclosing
    /// serial batch. Skip takes precedence over success on overlap.
    pub fn with_skip_exit_codes(mut self, codes: Vec<i32>) -> Self {
        self.skip_exit_codes = codes;
        self
    }

    fn classify(&self, exit_code: i32) -> (Status, Option<RunError>) {
        if self.skip_exit_codes.contains(&exit_code) {
            (Status::Skipped, Some(RunError::SkipIntentional))
        } else if self.success_exit_codes.contains(&exit_code) {
            (Status::Success, None)
        } else {
            (
                Status::Error,
                Some(RunError::ProcessExit { code: exit_code }),
            )
        }
    }

    /// The directory the child will run in: `None` inherits the engine
    /// process's own, anything else must exist.
    fn effective_cwd(&self) -> trellis_core::Result<Option<PathBuf>> {
        if !self.base.has_cwd() {
            return Ok(None);
        }
        if self.base.cwd.is_dir() {
            Ok(Some(self.base.cwd.clone()))
        } else {
            Err(RunError::CwdMissing {
                path: self.base.cwd.display().to_string(),
            })
        }
    }

    fn fail(&self, ctx: &RunContext, error: RunError) -> CommandResult {
        ctx.emit(
            &self.base.label,
            EventKind::Failed {
                exit_code: -1,
                message: error.to_string(),
            },
        );
        CommandResult::failed(&self.base.label, error)
    }
}

#[async_trait]
impl Command for ProcessCommand {
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

    async fn run(&mut self, ctx: &RunContext) -> CommandResult {
        let label = self.base.label.clone();
        ctx.emit(&label, EventKind::Started);

        if ctx.registry().is_draining() || ctx.is_cancelled() {
            return self.fail(ctx, RunError::Cancelled);
        }

        let cwd = match self.effective_cwd() {
            Ok(cwd) => cwd,
            Err(error) => return self.fail(ctx, error),
        };

        let permit = match ctx.acquire_permit().await {
            Ok(permit) => permit,
            Err(error) => return self.fail(ctx, error),
        };

        let mut cmd = tokio::process::Command::new(&self.path);
        cmd.args(&self.args)
            .envs(self.base.env.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &cwd {
            cmd.current_dir(cwd);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                drop(permit);
                return self.fail(
                    ctx,
                    RunError::Spawn {
                        details: e.to_string(),
                    },
                );
            }
        };

        let pgid = child.id();
        if let Some(pgid) = pgid {
            ctx.registry().register(pgid);
        }

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stderr_last = LastLine::new();
        let stderr_scanner = LineScanner::new(stderr_last.clone());

        let stdout_pump = async {
            match stdout {
                Some(stream) => {
                    pump(stream, LineScanner::default(), |line| {
                        ctx.emit(
                            &label,
                            EventKind::Progress {
                                line,
                                is_stderr: false,
                            },
                        );
                    })
                    .await
                }
                None => Vec::new(),
            }
        };
        let stderr_pump = async {
            match stderr {
                Some(stream) => {
                    pump(stream, stderr_scanner, |line| {
                        ctx.emit(
                            &label,
                            EventKind::Progress {
                                line,
                                is_stderr: true,
                            },
                        );
                    })
                    .await
                }
                None => Vec::new(),
            }
        };

        let outcome = tokio::select! {
            joined = async {
                let (stdout_buf, stderr_buf) = tokio::join!(stdout_pump, stderr_pump);
                let wait = child.wait().await;
                (wait, stdout_buf, stderr_buf)
            } => Some(joined),
            () = ctx.cancel_token().cancelled() => None,
        };

        let result = match outcome {
            Some((wait, stdout_buf, stderr_buf)) => {
                let exit_code = match wait {
                    Ok(status) => status.code().unwrap_or(-1),
                    Err(e) => {
                        log::warn!("wait for {} failed: {e}", self.path.display());
                        -1
                    }
                };
                let (status, error) = self.classify(exit_code);
                CommandResult {
                    label: label.clone(),
                    status,
                    exit_code,
                    error: error.map(Into::into),
                    stdout: stdout_buf,
                    stderr: stderr_buf,
                    children: Vec::new(),
                    new_cwd: None,
                }
            }
            None => {
                #[cfg(unix)]
                if let Some(pgid) = pgid {
                    let _ = nix::sys::signal::killpg(
                        nix::unistd::Pid::from_raw(pgid as i32),
                        nix::sys::signal::Signal::SIGKILL,
                    );
                }
                let _ = child.start_kill();
                let _ = child.wait().await;
                CommandResult::cancelled(label.clone())
            }
        };

        if let Some(pgid) = pgid {
            ctx.registry().unregister(pgid);
        }
        drop(permit);

        match result.status {
            Status::Success => ctx.emit(&label, EventKind::Completed),
            Status::Skipped => ctx.emit(&label, EventKind::Skipped),
            Status::Error => {
                let mut message = result
                    .error
                    .as_ref()
                    .map_or_else(|| "failed".to_string(), ToString::to_string);
                let stderr_tail = stderr_last.get(LAST_LINE_MAX);
                if !stderr_tail.is_empty() {
                    message.push_str(": ");
                    message.push_str(&stderr_tail);
                }
                ctx.emit(
                    &label,
                    EventKind::Failed {
                        exit_code: result.exit_code,
                        message,
                    },
                );
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ProcessRegistry;
    use std::sync::Arc;
    use tokio::sync::Semaphore;
    use tokio_util::sync::CancellationToken;
    use trellis_core::{ErrorKind, NullReporter};

    fn test_context() -> RunContext {
        RunContext::new(
            CancellationToken::new(),
            Arc::new(Semaphore::new(4)),
            Arc::new(NullReporter),
            Arc::new(ProcessRegistry::new()),
        )
    }

    #[test]
    fn classification_skip_beats_success_on_overlap() {
        let cmd = ProcessCommand::new("cmd", "/bin/true", vec![])
            .with_success_exit_codes(vec![0, 7])
            .with_skip_exit_codes(vec![7]);
        let (status, error) = cmd.classify(7);
        assert_eq!(status, Status::Skipped);
        assert_eq!(error, Some(RunError::SkipIntentional));
    }

    #[test]
    fn classification_defaults_to_zero_success() {
        let cmd = ProcessCommand::new("cmd", "/bin/true", vec![]);
        assert_eq!(cmd.classify(0).0, Status::Success);
        let (status, error) = cmd.classify(3);
        assert_eq!(status, Status::Error);
        assert_eq!(error, Some(RunError::ProcessExit { code: 3 }));
    }

    #[tokio::test]
    async fn missing_cwd_fails_without_spawning() {
        let ctx = test_context();
        let mut cmd = ProcessCommand::new("cmd", "/bin/true", vec![])
            .with_cwd("/nonexistent/path/for/trellis/tests");
        let result = cmd.run(&ctx).await;
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.exit_code, -1);
        assert!(result.is_error_kind(ErrorKind::CwdMissing));
    }

    #[tokio::test]
    async fn unknown_executable_reports_spawn_error() {
        let ctx = test_context();
        let mut cmd = ProcessCommand::new("cmd", "trellis-no-such-binary-3917", vec![]);
        let result = cmd.run(&ctx).await;
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.exit_code, -1);
        assert!(result.is_error_kind(ErrorKind::Spawn));
    }

    #[tokio::test]
    async fn draining_registry_prevents_new_spawns() {
        let ctx = test_context();
        ctx.registry().begin_drain();
        let mut cmd = ProcessCommand::new("cmd", "/bin/true", vec![]);
        let result = cmd.run(&ctx).await;
        assert!(result.is_error_kind(ErrorKind::Cancelled));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let ctx = test_context();
        let mut cmd = ProcessCommand::new(
            "echo",
            "/bin/sh",
            vec!["-c".to_string(), "echo hello".to_string()],
        );
        let result = cmd.run(&ctx).await;
        assert_eq!(result.status, Status::Success);
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, b"hello\n");
        assert!(result.children.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn skip_exit_code_marks_result_skipped() {
        let ctx = test_context();
        let mut cmd = ProcessCommand::new(
            "skipper",
            "/bin/sh",
            vec!["-c".to_string(), "exit 99".to_string()],
        )
        .with_skip_exit_codes(vec![99]);
        let result = cmd.run(&ctx).await;
        assert_eq!(result.status, Status::Skipped);
        assert_eq!(result.exit_code, 99);
        assert!(result.is_error_kind(ErrorKind::SkipIntentional));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn env_overlay_reaches_the_child() {
        let ctx = test_context();
        let mut cmd = ProcessCommand::new(
            "env",
            "/bin/sh",
            vec!["-c".to_string(), "printf '%s' \"$TRELLIS_TEST_VALUE\"".to_string()],
        )
        .with_env("TRELLIS_TEST_VALUE", "from-overlay");
        let result = cmd.run(&ctx).await;
        assert_eq!(result.stdout, b"from-overlay");
    }
}
