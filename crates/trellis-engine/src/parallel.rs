//! Parallel composite: concurrent children with a shared entry state.

use crate::command::{Command, CommandBase};
use crate::context::RunContext;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;
use trellis_core::{
    evaluate_gate, CommandResult, EnvMap, EventKind, GateDecision, PreviousState, RunError, RunsOn,
};

/// Executes children concurrently. Siblings in the batch do not observe
/// each other's outcome: the gate is consulted once per child against
/// the batch's entry state. Results keep the static child order, and
/// workspace relocation does not apply (sibling ordering is ambiguous).
#[derive(Clone, Default)]
pub struct ParallelCommand {
    base: CommandBase,
    children: Vec<Box<dyn Command>>,
}

impl ParallelCommand {
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
impl Command for ParallelCommand {
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
        let children = std::mem::take(&mut self.children);
        let results = run_all(
            children,
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

/// Run `children` concurrently under `ctx` (already prefixed with the
/// batch's own label), one task per non-skipped child, and reassemble
/// results in static order.
///
/// Also used by the for-each composite in parallel mode.
pub(crate) async fn run_all(
    children: Vec<Box<dyn Command>>,
    parent_env: &EnvMap,
    parent_cwd: &Path,
    ctx: &RunContext,
) -> Vec<CommandResult> {
    let entry = PreviousState::default();
    let mut slots: Vec<Option<CommandResult>> = Vec::with_capacity(children.len());
    let mut labels: Vec<String> = Vec::with_capacity(children.len());
    let mut tasks = JoinSet::new();

    for (index, mut child) in children.into_iter().enumerate() {
        labels.push(child.label().to_string());
        child.inherit_env(parent_env);
        if !parent_cwd.as_os_str().is_empty() {
            child.set_cwd(parent_cwd, false);
        }

        match evaluate_gate(child.runs_on(), &entry) {
            GateDecision::Skip => {
                ctx.emit(child.label(), EventKind::Skipped);
                slots.push(Some(CommandResult::skipped(
                    child.label(),
                    RunError::SkipIntentional,
                )));
            }
            GateDecision::SkipOnError => {
                ctx.emit(child.label(), EventKind::Skipped);
                slots.push(Some(CommandResult::skipped(
                    child.label(),
                    RunError::SkipOnError,
                )));
            }
            GateDecision::Run => {
                slots.push(None);
                let task_ctx = ctx.clone();
                tasks.spawn(async move { (index, child.run(&task_ctx).await) });
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => slots[index] = Some(result),
            Err(e) => log::warn!("child task failed to complete: {e}"),
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| slot.unwrap_or_else(|| CommandResult::cancelled(&labels[index])))
        .collect()
}
