//! Lock-file analyzers.
//!
//! An analyzer pairs a [`LockFileLocator`] with the parser for one lock-file
//! format and runs in two phases: [`DependencyAnalyzer::candidate_files`] finds
//! the files, [`DependencyAnalyzer::analyze_dependencies`] fetches and parses them.

use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{AccessError, AnalysisError, DiscoveryError, ParseError, SetupError};
use crate::models::{DependencyFile, LockFormat, ParsedFile};
use crate::provider::RepositoryAccess;

pub mod locator;
pub mod pipfile;
pub mod poetry;
pub mod uv;

pub use locator::LockFileLocator;

/// The closed set of analyzers, keyed by their config name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalyzerKind {
    Poetry,
    Pipfile,
    UvLock,
}

impl AnalyzerKind {
    pub const ALL: [AnalyzerKind; 3] = [AnalyzerKind::Poetry, AnalyzerKind::Pipfile, AnalyzerKind::UvLock];

    pub fn name(self) -> &'static str {
        match self {
            AnalyzerKind::Poetry => "poetry",
            AnalyzerKind::Pipfile => "pipfile",
            AnalyzerKind::UvLock => "uvlock",
        }
    }

    pub fn format(self) -> LockFormat {
        match self {
            AnalyzerKind::Poetry => LockFormat::PoetryLock,
            AnalyzerKind::Pipfile => LockFormat::PipfileLock,
            AnalyzerKind::UvLock => LockFormat::UvLock,
        }
    }

    /// Registry lookup: exact, case-sensitive match on the analyzer name.
    pub fn create(name: &str) -> Result<DependencyAnalyzer, SetupError> {
        let kind: AnalyzerKind = name.parse()?;
        Ok(DependencyAnalyzer::new(kind))
    }
}

impl std::str::FromStr for AnalyzerKind {
    type Err = SetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnalyzerKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| SetupError::UnsupportedAnalyzer(s.to_string()))
    }
}

impl std::fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How far candidate discovery looks when no explicit paths are configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    /// Only the repository root.
    Root,
    /// The whole tree.
    #[default]
    Recursive,
}

/// Inputs shared by both analyzer phases. Never mutated by an analyzer.
#[derive(Clone)]
pub struct AnalyzerConfig {
    pub explicit_paths: Vec<String>,
    pub search: SearchScope,
    pub access: Arc<dyn RepositoryAccess>,
}

impl AnalyzerConfig {
    pub fn new(access: Arc<dyn RepositoryAccess>) -> Self {
        Self {
            explicit_paths: Vec::new(),
            search: SearchScope::default(),
            access,
        }
    }

    pub fn with_paths(mut self, paths: Vec<String>) -> Self {
        self.explicit_paths = paths;
        self
    }

    pub fn with_search(mut self, search: SearchScope) -> Self {
        self.search = search;
        self
    }
}

pub struct DependencyAnalyzer {
    kind: AnalyzerKind,
    locator: LockFileLocator,
}

impl DependencyAnalyzer {
    pub fn new(kind: AnalyzerKind) -> Self {
        Self {
            kind,
            locator: LockFileLocator::new(kind),
        }
    }

    pub fn kind(&self) -> AnalyzerKind {
        self.kind
    }

    pub async fn candidate_files(
        &self,
        cancel: &CancellationToken,
        owner: &str,
        repo: &str,
        git_ref: &str,
        cfg: &AnalyzerConfig,
    ) -> Result<Vec<DependencyFile>, DiscoveryError> {
        self.locator
            .candidate_files(cancel, owner, repo, git_ref, cfg)
            .await
    }

    /// Fetch and parse every candidate, in order.
    ///
    /// A file that fails to fetch or parse is logged and skipped. The call only
    /// fails when at least one file was attempted and none succeeded, or when
    /// `cancel` fires.
    pub async fn analyze_dependencies(
        &self,
        cancel: &CancellationToken,
        owner: &str,
        repo: &str,
        git_ref: &str,
        candidates: &[DependencyFile],
        cfg: &AnalyzerConfig,
    ) -> Result<Vec<ParsedFile>, AnalysisError> {
        let mut attempted = 0usize;
        let mut last_error: Option<String> = None;
        let mut parsed = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            if cancel.is_cancelled() {
                return Err(AnalysisError::Cancelled);
            }
            attempted += 1;

            let content = match cfg
                .access
                .file_content(cancel, owner, repo, git_ref, &candidate.path)
                .await
            {
                Ok(content) => content,
                Err(AccessError::Cancelled) => return Err(AnalysisError::Cancelled),
                Err(e) => {
                    warn!(owner, repo, path = %candidate.path, error = %e, "skipping lock file: fetch failed");
                    last_error = Some(e.to_string());
                    continue;
                }
            };

            match parse_lock_file(candidate.format, &candidate.path, &content) {
                Ok(dependencies) => {
                    debug!(
                        owner,
                        repo,
                        path = %candidate.path,
                        analyzer = %candidate.analyzer,
                        count = dependencies.len(),
                        "parsed lock file"
                    );
                    parsed.push(ParsedFile {
                        path: candidate.path.clone(),
                        dependencies,
                    });
                }
                Err(e) => {
                    warn!(owner, repo, path = %candidate.path, error = %e, "skipping lock file: parse failed");
                    last_error = Some(e.to_string());
                }
            }
        }

        if attempted > 0 && parsed.is_empty() {
            return Err(AnalysisError::AllCandidatesFailed {
                attempted,
                last: last_error.unwrap_or_default(),
            });
        }

        Ok(parsed)
    }
}

/// Decode `raw` as the given lock-file format.
pub fn parse_lock_file(
    format: LockFormat,
    path: &str,
    raw: &str,
) -> Result<Vec<crate::models::Dependency>, ParseError> {
    match format {
        LockFormat::PoetryLock => poetry::parse(raw).map_err(|e| ParseError::new(path, e)),
        LockFormat::PipfileLock => pipfile::parse(raw).map_err(|e| ParseError::new(path, e)),
        LockFormat::UvLock => uv::parse(raw).map_err(|e| ParseError::new(path, e)),
    }
}
