//! Error taxonomy for repository scanning.
//!
//! Everything below [`GenerateError`] stays local to one repository: it ends up in
//! that repository's [`RepositoryReport::error`](crate::models::RepositoryReport)
//! and never aborts the rest of the run. Only cancellation escalates.

use thiserror::Error;

/// Failure of a [`RepositoryAccess`](crate::provider::RepositoryAccess) call.
///
/// Causes are kept as strings so reports stay `Clone + PartialEq`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("request failed: {0}")]
    Http(String),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    #[error("cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for AccessError {
    fn from(err: reqwest::Error) -> Self {
        AccessError::Http(err.to_string())
    }
}

/// A lock file that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to parse {path}: {cause}")]
pub struct ParseError {
    pub path: String,
    pub cause: String,
}

impl ParseError {
    pub fn new(path: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self {
            path: path.into(),
            cause: cause.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("unsupported analyzer: {0}")]
    UnsupportedAnalyzer(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("failed to list repository files: {0}")]
    Traversal(#[source] AccessError),

    #[error("no {file_name} found in repository")]
    NoCandidates { file_name: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    /// Every attempted candidate failed to fetch or parse; `last` is the final cause.
    #[error("all {attempted} candidate file(s) failed, last error: {last}")]
    AllCandidatesFailed { attempted: usize, last: String },

    #[error("analysis cancelled")]
    Cancelled,
}

/// The error recorded for a single repository.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error("failed to resolve default branch: {0}")]
    Resolve(#[source] AccessError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("scan task failed: {0}")]
    Task(String),
}

/// Failure of a whole report run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerateError {
    #[error("report generation cancelled")]
    Cancelled,
}
