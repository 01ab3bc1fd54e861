//! Item enumeration for for-each composites.

use crate::context::RunContext;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from an items provider, tagged so for-each composites can
/// whitelist specific kinds as "nothing to do".
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("path not found: {path}")]
    PathNotFound { path: String },

    #[error("io error listing items: {details}")]
    Io { details: String },

    #[error("{details}")]
    Other { details: String },
}

impl ProviderError {
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            Self::PathNotFound { .. } => ProviderErrorKind::PathNotFound,
            Self::Io { .. } => ProviderErrorKind::Io,
            Self::Other { .. } => ProviderErrorKind::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    PathNotFound,
    Io,
    Other,
}

/// Source of the item strings a for-each composite iterates over.
#[async_trait]
pub trait ItemsProvider: Send + Sync {
    /// Enumerate items for a for-each rooted at `cwd`.
    async fn items(&self, ctx: &RunContext, cwd: &Path) -> Result<Vec<String>, ProviderError>;

    fn boxed_clone(&self) -> Box<dyn ItemsProvider>;
}

impl Clone for Box<dyn ItemsProvider> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

/// Provider returning a fixed list of items.
#[derive(Debug, Clone)]
pub struct StaticItemsProvider {
    items: Vec<String>,
}

impl StaticItemsProvider {
    pub fn new(items: Vec<String>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl ItemsProvider for StaticItemsProvider {
    async fn items(&self, _ctx: &RunContext, _cwd: &Path) -> Result<Vec<String>, ProviderError> {
        Ok(self.items.clone())
    }

    fn boxed_clone(&self) -> Box<dyn ItemsProvider> {
        Box::new(self.clone())
    }
}

/// Provider returning the subdirectories beneath the for-each's working
/// directory, as paths relative to it, sorted.
///
/// `depth` bounds recursion (1 lists immediate children only; 0 means
/// unlimited). Hidden directories (name starting with `.`) are excluded
/// unless `include_hidden` is set.
#[derive(Debug, Clone)]
pub struct DirItemsProvider {
    depth: usize,
    include_hidden: bool,
}

impl DirItemsProvider {
    pub fn new(depth: usize, include_hidden: bool) -> Self {
        Self {
            depth,
            include_hidden,
        }
    }
}

#[async_trait]
impl ItemsProvider for DirItemsProvider {
    async fn items(&self, _ctx: &RunContext, cwd: &Path) -> Result<Vec<String>, ProviderError> {
        let root = if cwd.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            cwd.to_path_buf()
        };
        if !root.is_dir() {
            return Err(ProviderError::PathNotFound {
                path: root.display().to_string(),
            });
        }

        let depth = self.depth;
        let include_hidden = self.include_hidden;
        let listed = tokio::task::spawn_blocking(move || {
            let mut items = Vec::new();
            collect_subdirs(&root, &root, depth, 1, include_hidden, &mut items)?;
            items.sort();
            Ok::<_, std::io::Error>(items)
        })
        .await
        .map_err(|e| ProviderError::Other {
            details: e.to_string(),
        })?;

        listed.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProviderError::PathNotFound {
                    path: e.to_string(),
                }
            } else {
                ProviderError::Io {
                    details: e.to_string(),
                }
            }
        })
    }

    fn boxed_clone(&self) -> Box<dyn ItemsProvider> {
        Box::new(self.clone())
    }
}

fn collect_subdirs(
    base: &Path,
    dir: &Path,
    depth: usize,
    level: usize,
    include_hidden: bool,
    out: &mut Vec<String>,
) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if !include_hidden && name.to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(base).unwrap_or(&path);
        out.push(relative.to_string_lossy().into_owned());
        if depth == 0 || level < depth {
            collect_subdirs(base, &path, depth, level + 1, include_hidden, out)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_context;

    fn make_tree(root: &Path) {
        std::fs::create_dir_all(root.join("alpha/nested")).unwrap();
        std::fs::create_dir_all(root.join("beta")).unwrap();
        std::fs::create_dir_all(root.join(".hidden")).unwrap();
        std::fs::write(root.join("file.txt"), "not a dir").unwrap();
    }

    #[tokio::test]
    async fn lists_immediate_subdirectories_at_depth_one() {
        let scratch = tempfile::tempdir().unwrap();
        make_tree(scratch.path());

        let provider = DirItemsProvider::new(1, false);
        let items = provider
            .items(&test_context(), scratch.path())
            .await
            .unwrap();
        assert_eq!(items, ["alpha", "beta"]);
    }

    #[tokio::test]
    async fn unlimited_depth_recurses_and_stays_relative() {
        let scratch = tempfile::tempdir().unwrap();
        make_tree(scratch.path());

        let provider = DirItemsProvider::new(0, false);
        let items = provider
            .items(&test_context(), scratch.path())
            .await
            .unwrap();
        assert_eq!(items, ["alpha", "alpha/nested", "beta"]);
    }

    #[tokio::test]
    async fn hidden_directories_are_opt_in() {
        let scratch = tempfile::tempdir().unwrap();
        make_tree(scratch.path());

        let provider = DirItemsProvider::new(1, true);
        let items = provider
            .items(&test_context(), scratch.path())
            .await
            .unwrap();
        assert_eq!(items, [".hidden", "alpha", "beta"]);
    }

    #[tokio::test]
    async fn missing_root_reports_path_not_found() {
        let provider = DirItemsProvider::new(1, false);
        let err = provider
            .items(&test_context(), Path::new("/no/such/trellis/root"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ProviderErrorKind::PathNotFound);
    }

    #[tokio::test]
    async fn static_provider_returns_items_verbatim() {
        let provider = StaticItemsProvider::new(vec!["a".to_string(), "b".to_string()]);
        let items = provider
            .items(&test_context(), Path::new(""))
            .await
            .unwrap();
        assert_eq!(items, ["a", "b"]);
    }
}
