use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{AnalyzerConfig, AnalyzerKind, SearchScope};
use crate::error::DiscoveryError;
use crate::models::{DependencyFile, EntryKind, LockFormat};

/// Finds the lock files one analyzer understands.
///
/// Explicit paths are used verbatim without touching the repository. Otherwise
/// the tree is listed and files are matched on exact, case-sensitive basename.
/// Finding nothing is an empty result, not an error.
#[derive(Debug, Clone, Copy)]
pub struct LockFileLocator {
    analyzer: AnalyzerKind,
    format: LockFormat,
}

impl LockFileLocator {
    pub fn new(analyzer: AnalyzerKind) -> Self {
        Self {
            analyzer,
            format: analyzer.format(),
        }
    }

    pub async fn candidate_files(
        &self,
        cancel: &CancellationToken,
        owner: &str,
        repo: &str,
        git_ref: &str,
        cfg: &AnalyzerConfig,
    ) -> Result<Vec<DependencyFile>, DiscoveryError> {
        if !cfg.explicit_paths.is_empty() {
            return Ok(cfg
                .explicit_paths
                .iter()
                .map(|path| self.describe(path.clone()))
                .collect());
        }

        let entries = match cfg.search {
            SearchScope::Recursive => {
                cfg.access
                    .list_files_recursive(cancel, owner, repo, git_ref)
                    .await
            }
            SearchScope::Root => cfg.access.list_files(cancel, owner, repo, git_ref, "").await,
        }
        .map_err(DiscoveryError::Traversal)?;

        let file_name = self.format.file_name();
        let candidates: Vec<DependencyFile> = entries
            .into_iter()
            .filter(|entry| entry.kind == EntryKind::File && entry.basename() == file_name)
            .map(|entry| self.describe(entry.path))
            .collect();

        debug!(owner, repo, file_name, found = candidates.len(), "searched repository tree");
        Ok(candidates)
    }

    fn describe(&self, path: String) -> DependencyFile {
        DependencyFile {
            path,
            format: self.format,
            analyzer: self.analyzer,
        }
    }
}
