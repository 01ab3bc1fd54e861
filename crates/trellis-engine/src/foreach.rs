//! For-each composite: one sub-tree per provided item.

use crate::command::{Command, CommandBase};
use crate::context::RunContext;
use crate::provider::{ItemsProvider, ProviderErrorKind};
use crate::serial::SerialCommand;
use crate::{parallel, serial};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use trellis_core::{CommandResult, EnvMap, EventKind, RunError, RunsOn};

/// How the per-item sub-trees execute relative to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForEachMode {
    Serial,
    Parallel,
}

/// How an item string becomes the working directory of its sub-tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CwdStrategy {
    /// Items do not affect the working directory.
    None,
    /// Join the item onto the for-each's working directory.
    ItemRelative,
    /// Use the item as a working directory as-is.
    ItemAbsolute,
}

/// Enumerates items from a provider and materializes a fresh serial
/// batch per item, with the item bound to the `ITEM` environment
/// variable and optionally to the batch's working directory.
#[derive(Clone)]
pub struct ForEachCommand {
    base: CommandBase,
    provider: Box<dyn ItemsProvider>,
    mode: ForEachMode,
    cwd_strategy: CwdStrategy,
    items_skip_on_errors: Vec<ProviderErrorKind>,
    template: Vec<Box<dyn Command>>,
}

impl ForEachCommand {
    pub fn new(
        label: impl Into<String>,
        provider: Box<dyn ItemsProvider>,
        mode: ForEachMode,
        template: Vec<Box<dyn Command>>,
    ) -> Self {
        Self {
            base: CommandBase::new(label),
            provider,
            mode,
            cwd_strategy: CwdStrategy::None,
            items_skip_on_errors: Vec::new(),
            template,
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

    pub fn with_cwd_strategy(mut self, strategy: CwdStrategy) -> Self {
        self.cwd_strategy = strategy;
        self
    }

    /// Provider error kinds that turn the whole for-each into a single
    /// skipped result instead of an error.
    pub fn with_items_skip_on_errors(mut self, kinds: Vec<ProviderErrorKind>) -> Self {
        self.items_skip_on_errors = kinds;
        self
    }

    fn batch_for_item(&self, item: &str) -> Box<dyn Command> {
        let mut batch =
            SerialCommand::new(item, self.template.clone()).with_env("ITEM", item);
        match self.cwd_strategy {
            CwdStrategy::None => {}
            CwdStrategy::ItemRelative => {
                batch = batch.with_cwd(self.base.cwd.join(item));
            }
            CwdStrategy::ItemAbsolute => {
                batch = batch.with_cwd(PathBuf::from(item));
            }
        }
        Box::new(batch)
    }
}

#[async_trait]
impl Command for ForEachCommand {
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

        let items = tokio::select! {
            () = ctx.cancel_token().cancelled() => {
                let result = CommandResult::cancelled(&self.base.label);
                ctx.emit_terminal(&result);
                return result;
            }
            items = self.provider.items(ctx, &self.base.cwd) => items,
        };

        let items = match items {
            Ok(items) => items,
            Err(e) if self.items_skip_on_errors.contains(&e.kind()) => {
                log::debug!(
                    "for-each {} skipped: provider reported {e}",
                    self.base.label
                );
                let result =
                    CommandResult::skipped(&self.base.label, RunError::SkipIntentional);
                ctx.emit_terminal(&result);
                return result;
            }
            Err(e) => {
                let result = CommandResult::failed(
                    &self.base.label,
                    RunError::ProviderFailed {
                        details: e.to_string(),
                    },
                );
                ctx.emit_terminal(&result);
                return result;
            }
        };

        let child_ctx = ctx.child(&self.base.label);
        let mut batches: Vec<Box<dyn Command>> = items
            .iter()
            .map(|item| self.batch_for_item(item))
            .collect();

        let results = match self.mode {
            ForEachMode::Serial => {
                serial::run_batch(
                    &mut batches,
                    &self.base.env,
                    &self.base.cwd,
                    &child_ctx,
                )
                .await
            }
            ForEachMode::Parallel => {
                parallel::run_all(batches, &self.base.env, &self.base.cwd, &child_ctx).await
            }
        };

        let result = CommandResult::from_children(&self.base.label, results);
        ctx.emit_terminal(&result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderError, StaticItemsProvider};
    use crate::testutil::{test_context, StubCommand};
    use trellis_core::{ErrorKind, Status};

    #[derive(Debug, Clone)]
    struct FailingProvider(ProviderErrorKind);

    #[async_trait]
    impl ItemsProvider for FailingProvider {
        async fn items(
            &self,
            _ctx: &RunContext,
            _cwd: &Path,
        ) -> Result<Vec<String>, ProviderError> {
            Err(match self.0 {
                ProviderErrorKind::PathNotFound => ProviderError::PathNotFound {
                    path: "/gone".to_string(),
                },
                ProviderErrorKind::Io => ProviderError::Io {
                    details: "disk on fire".to_string(),
                },
                ProviderErrorKind::Other => ProviderError::Other {
                    details: "no idea".to_string(),
                },
            })
        }

        fn boxed_clone(&self) -> Box<dyn ItemsProvider> {
            Box::new(self.clone())
        }
    }

    fn static_provider(items: &[&str]) -> Box<dyn ItemsProvider> {
        Box::new(StaticItemsProvider::new(
            items.iter().map(ToString::to_string).collect(),
        ))
    }

    #[tokio::test]
    async fn produces_one_child_per_item() {
        let inner = StubCommand::succeeding("inner");
        let mut foreach = ForEachCommand::new(
            "over-items",
            static_provider(&["a", "b", "c"]),
            ForEachMode::Serial,
            vec![Box::new(inner)],
        );

        let result = foreach.run(&test_context()).await;

        assert_eq!(result.status, Status::Success);
        let labels: Vec<_> = result.children.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, ["a", "b", "c"]);
        for child in &result.children {
            assert_eq!(child.children.len(), 1);
            assert_eq!(child.children[0].label, "inner");
        }
    }

    #[tokio::test]
    async fn item_relative_strategy_joins_cwd_onto_the_foreach_root() {
        let inner = StubCommand::succeeding("inner");
        let handle = inner.clone();
        let mut foreach = ForEachCommand::new(
            "over-items",
            static_provider(&["sub"]),
            ForEachMode::Serial,
            vec![Box::new(inner)],
        )
        .with_cwd("/workspace/root")
        .with_cwd_strategy(CwdStrategy::ItemRelative);

        foreach.run(&test_context()).await;

        // The per-item batch pushed its joined cwd into the template clone.
        assert_eq!(
            handle.observed().cwd,
            PathBuf::from("/workspace/root/sub")
        );
    }

    #[tokio::test]
    async fn item_absolute_strategy_uses_items_verbatim() {
        let inner = StubCommand::succeeding("inner");
        let handle = inner.clone();
        let mut foreach = ForEachCommand::new(
            "over-items",
            static_provider(&["/elsewhere/dir"]),
            ForEachMode::Parallel,
            vec![Box::new(inner)],
        )
        .with_cwd("/workspace/root")
        .with_cwd_strategy(CwdStrategy::ItemAbsolute);

        foreach.run(&test_context()).await;

        assert_eq!(handle.observed().cwd, PathBuf::from("/elsewhere/dir"));
    }

    #[tokio::test]
    async fn binds_each_item_as_environment_variable() {
        let inner = StubCommand::succeeding("inner");
        let handle = inner.clone();
        let mut foreach = ForEachCommand::new(
            "over-items",
            static_provider(&["the-item"]),
            ForEachMode::Serial,
            vec![Box::new(inner)],
        )
        .with_env("ITEM", "shadowed-by-binding");

        foreach.run(&test_context()).await;

        assert_eq!(
            handle.observed().env.get("ITEM").map(String::as_str),
            Some("the-item")
        );
    }

    #[tokio::test]
    async fn whitelisted_provider_error_skips_the_whole_foreach() {
        let mut foreach = ForEachCommand::new(
            "over-items",
            Box::new(FailingProvider(ProviderErrorKind::PathNotFound)),
            ForEachMode::Serial,
            vec![Box::new(StubCommand::succeeding("inner"))],
        )
        .with_items_skip_on_errors(vec![ProviderErrorKind::PathNotFound]);

        let result = foreach.run(&test_context()).await;

        assert_eq!(result.status, Status::Skipped);
        assert!(result.is_error_kind(ErrorKind::SkipIntentional));
        assert!(result.children.is_empty());
    }

    #[tokio::test]
    async fn unlisted_provider_error_fails_the_foreach() {
        let mut foreach = ForEachCommand::new(
            "over-items",
            Box::new(FailingProvider(ProviderErrorKind::Io)),
            ForEachMode::Serial,
            vec![Box::new(StubCommand::succeeding("inner"))],
        )
        .with_items_skip_on_errors(vec![ProviderErrorKind::PathNotFound]);

        let result = foreach.run(&test_context()).await;

        assert_eq!(result.status, Status::Error);
        assert!(result.is_error_kind(ErrorKind::ProviderFailed));
    }

    #[tokio::test]
    async fn serial_mode_gates_later_items_after_a_failing_one() {
        let failing = StubCommand::failing("inner", 1);
        let mut foreach = ForEachCommand::new(
            "over-items",
            static_provider(&["one", "two"]),
            ForEachMode::Serial,
            vec![Box::new(failing)],
        );

        let result = foreach.run(&test_context()).await;

        assert_eq!(result.status, Status::Error);
        assert_eq!(result.children[0].status, Status::Error);
        assert_eq!(result.children[1].status, Status::Skipped);
        assert!(result.children[1].is_error_kind(ErrorKind::SkipOnError));
    }

    #[tokio::test]
    async fn parallel_mode_runs_every_item_despite_failures() {
        let failing = StubCommand::failing("inner", 1);
        let mut foreach = ForEachCommand::new(
            "over-items",
            static_provider(&["one", "two"]),
            ForEachMode::Parallel,
            vec![Box::new(failing)],
        );

        let result = foreach.run(&test_context()).await;

        assert_eq!(result.status, Status::Error);
        assert_eq!(result.children[0].status, Status::Error);
        assert_eq!(result.children[1].status, Status::Error);
    }
}
