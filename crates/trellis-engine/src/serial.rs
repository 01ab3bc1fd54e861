//! Serial composite: ordered children with sibling gating and
//! workspace carry-over.

use crate::command::{Command, CommandBase};
use crate::context::RunContext;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use trellis_core::{
    evaluate_gate, CommandResult, EnvMap, ErrorKind, EventKind, GateDecision, PreviousState,
    RunError, RunsOn,
};

/// Executes children left to right. Each child sees the previous
/// sibling's outcome through the condition gate; a child announcing a
/// relocated working directory moves every later sibling there.
#[derive(Clone, Default)]
pub struct SerialCommand {
    base: CommandBase,
    children: Vec<Box<dyn Command>>,
}

impl SerialCommand {
    pub fn new(label: impl Into<String>, children: Vec<Box<dyn Command>>) -> Self {
        Self {
            base: CommandBase::new(label),
            children,
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
}

#[async_trait]
impl Command for SerialCommand {
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
        ctx.emit(&self.base.label, EventKind::Started);
        let child_ctx = ctx.child(&self.base.label);
        let results = run_batch(
            &mut self.children,
            &self.base.env,
            &self.base.cwd,
            &child_ctx,
        )
        .await;
        let result = CommandResult::from_children(&self.base.label, results);
        ctx.emit_terminal(&result);
        result
    }
}

/// Run `children` as one serial batch under `ctx` (already prefixed with
/// the batch's own label), pushing `parent_env`/`parent_cwd` into each
/// child before it runs.
///
/// Also used by the for-each composite for its per-item batches.
pub(crate) async fn run_batch(
    children: &mut [Box<dyn Command>],
    parent_env: &EnvMap,
    parent_cwd: &Path,
    ctx: &RunContext,
) -> Vec<CommandResult> {
    let mut previous = PreviousState::default();
    let mut results = Vec::with_capacity(children.len());
    let mut carry_cwd: Option<PathBuf> = None;
    let mut temp_dirs: Vec<PathBuf> = Vec::new();
    let mut stop_batch = false;

    for child in children.iter_mut() {
        if ctx.is_cancelled() {
            break;
        }

        child.inherit_env(parent_env);
        if !parent_cwd.as_os_str().is_empty() {
            child.set_cwd(parent_cwd, false);
        }
        if let Some(cwd) = &carry_cwd {
            child.set_cwd(cwd, true);
        }

        if stop_batch {
            ctx.emit(child.label(), EventKind::Skipped);
            results.push(CommandResult::skipped(
                child.label(),
                RunError::SkipIntentional,
            ));
            continue;
        }

        match evaluate_gate(child.runs_on(), &previous) {
            GateDecision::Skip => {
                ctx.emit(child.label(), EventKind::Skipped);
                results.push(CommandResult::skipped(
                    child.label(),
                    RunError::SkipIntentional,
                ));
            }
            GateDecision::SkipOnError => {
                ctx.emit(child.label(), EventKind::Skipped);
                results.push(CommandResult::skipped(child.label(), RunError::SkipOnError));
            }
            GateDecision::Run => {
                let result = child.run(ctx).await;
                previous = PreviousState::new(result.status, result.exit_code);
                if result.is_error_kind(ErrorKind::SkipIntentional) {
                    stop_batch = true;
                }
                if let Some(new_cwd) = result.new_cwd.clone() {
                    temp_dirs.push(new_cwd.clone());
                    carry_cwd = Some(new_cwd);
                }
                results.push(result);
            }
        }
    }

    // Relocated workspaces live exactly as long as their batch.
    for dir in temp_dirs {
        if let Err(e) = std::fs::remove_dir_all(&dir) {
            log::warn!("failed to remove relocated workspace {}: {e}", dir.display());
        }
    }

    results
}
