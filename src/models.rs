use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, Serializer};

use crate::analyzer::{AnalyzerKind, SearchScope};
use crate::error::RepositoryError;

/// A single package pinned by a lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependency {
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub kind: DependencyType,
    pub source: DependencySource,
}

impl Dependency {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            kind: DependencyType::Runtime,
            source: DependencySource::Registry,
        }
    }

    pub fn dev(mut self) -> Self {
        self.kind = DependencyType::Dev;
        self
    }

    pub fn with_source(mut self, source: DependencySource) -> Self {
        self.source = source;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyType {
    Runtime,
    Dev,
}

impl std::fmt::Display for DependencyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyType::Runtime => write!(f, "runtime"),
            DependencyType::Dev => write!(f, "dev"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencySource {
    Registry,
    Git,
    Path,
}

impl std::fmt::Display for DependencySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencySource::Registry => write!(f, "registry"),
            DependencySource::Git => write!(f, "git"),
            DependencySource::Path => write!(f, "path"),
        }
    }
}

/// Serialization format of a lock file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LockFormat {
    PoetryLock,
    PipfileLock,
    UvLock,
}

impl LockFormat {
    /// Exact basename the format is stored under.
    pub fn file_name(self) -> &'static str {
        match self {
            LockFormat::PoetryLock => "poetry.lock",
            LockFormat::PipfileLock => "Pipfile.lock",
            LockFormat::UvLock => "uv.lock",
        }
    }
}

impl std::fmt::Display for LockFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.file_name())
    }
}

/// A located, not yet parsed lock file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyFile {
    pub path: String,
    pub format: LockFormat,
    pub analyzer: AnalyzerKind,
}

/// A lock file that was fetched and parsed, with its dependencies in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFile {
    pub path: String,
    pub dependencies: Vec<Dependency>,
}

/// Repository metadata as reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepoInfo {
    pub name: String,
    pub default_branch: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// One entry of a repository tree listing. `path` is relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    pub kind: EntryKind,
}

impl FileEntry {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Dir,
        }
    }

    /// Last path segment.
    pub fn basename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// One repository to scan, after default inheritance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoConfig {
    pub provider: String,
    pub owner: String,
    pub repository: String,
    /// Empty means "use the repository's default branch".
    pub git_ref: String,
    pub analyzer: String,
    pub packages: Vec<String>,
    pub paths: Vec<String>,
    pub search: SearchScope,
}

impl RepoConfig {
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repository)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepositoryReport {
    pub provider: String,
    pub owner: String,
    pub repository: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub analyzer: String,
    /// Tracked package name to locked version, for tracked packages that were found.
    pub dependencies: BTreeMap<String, String>,
    /// Lock files that parsed successfully, in discovery order.
    pub files: Vec<String>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<RepositoryError>,
}

impl RepositoryReport {
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repository)
    }
}

fn serialize_error<S: Serializer>(
    error: &Option<RepositoryError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub repositories: Vec<RepositoryReport>,
    /// Sorted, deduplicated union of every requested package name.
    pub packages: Vec<String>,
}

impl Report {
    pub fn has_errors(&self) -> bool {
        self.repositories.iter().any(|r| r.error.is_some())
    }

    /// Errors keyed by `owner/repo`.
    pub fn errors(&self) -> BTreeMap<String, &RepositoryError> {
        self.repositories
            .iter()
            .filter_map(|r| r.error.as_ref().map(|e| (r.slug(), e)))
            .collect()
    }
}
