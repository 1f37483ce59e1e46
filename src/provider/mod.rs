//! Repository access over provider REST APIs.
//!
//! The scanning core only ever talks to the [`RepositoryAccess`] trait. Concrete
//! clients live in [`github`] and [`gitlab`]; [`ProviderRegistry`] maps a provider
//! name from the config onto one of them.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::config::ProvidersConfig;
use crate::error::{AccessError, SetupError};
use crate::models::{FileEntry, RepoInfo};

pub mod github;
pub mod gitlab;
#[cfg(test)]
pub mod mock;

const USER_AGENT: &str = concat!("version-checkr/", env!("CARGO_PKG_VERSION"));

/// Read-only access to one provider's repositories.
///
/// Every call takes the run's cancellation token and returns
/// [`AccessError::Cancelled`] once it fires.
#[async_trait]
pub trait RepositoryAccess: Send + Sync {
    async fn repository_info(
        &self,
        cancel: &CancellationToken,
        owner: &str,
        repo: &str,
    ) -> Result<RepoInfo, AccessError>;

    /// Entries directly under `path` (empty string for the root).
    async fn list_files(
        &self,
        cancel: &CancellationToken,
        owner: &str,
        repo: &str,
        git_ref: &str,
        path: &str,
    ) -> Result<Vec<FileEntry>, AccessError>;

    async fn list_files_recursive(
        &self,
        cancel: &CancellationToken,
        owner: &str,
        repo: &str,
        git_ref: &str,
    ) -> Result<Vec<FileEntry>, AccessError>;

    async fn file_content(
        &self,
        cancel: &CancellationToken,
        owner: &str,
        repo: &str,
        git_ref: &str,
        path: &str,
    ) -> Result<String, AccessError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    GitHub,
    GitLab,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::GitHub => "github",
            ProviderKind::GitLab => "gitlab",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = SetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(ProviderKind::GitHub),
            "gitlab" => Ok(ProviderKind::GitLab),
            other => Err(SetupError::UnsupportedProvider(other.to_string())),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps provider names to shared clients.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    clients: HashMap<ProviderKind, Arc<dyn RepositoryAccess>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, kind: ProviderKind, access: Arc<dyn RepositoryAccess>) -> Self {
        self.clients.insert(kind, access);
        self
    }

    /// Build the GitHub and GitLab clients from the `[providers]` config section.
    pub fn from_config(providers: &ProvidersConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;

        let github = github::GitHubClient::new(
            client.clone(),
            providers.github.base_url.clone(),
            providers.github.resolve_token("GITHUB_TOKEN"),
        );
        let gitlab = gitlab::GitLabClient::new(
            client,
            providers.gitlab.base_url.clone(),
            providers.gitlab.resolve_token("GITLAB_TOKEN"),
        );

        Ok(Self::new()
            .register(ProviderKind::GitHub, Arc::new(github))
            .register(ProviderKind::GitLab, Arc::new(gitlab)))
    }

    /// Look up the client for a provider name. Matching is exact and case-sensitive.
    pub fn connect(&self, provider: &str) -> Result<Arc<dyn RepositoryAccess>, SetupError> {
        let kind: ProviderKind = provider.parse()?;
        self.clients
            .get(&kind)
            .cloned()
            .ok_or_else(|| SetupError::UnsupportedProvider(provider.to_string()))
    }
}

/// Run `fut` unless `cancel` fires first.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, AccessError>
where
    F: Future<Output = Result<T, AccessError>>,
{
    if cancel.is_cancelled() {
        return Err(AccessError::Cancelled);
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(AccessError::Cancelled),
        result = fut => result,
    }
}

/// Map non-success statuses onto [`AccessError`].
fn check_status(url: &str, response: Response) -> Result<Response, AccessError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(match status.as_u16() {
        404 => AccessError::NotFound(url.to_string()),
        401 | 403 => AccessError::Unauthorized(url.to_string()),
        code => AccessError::Status {
            url: url.to_string(),
            status: code,
        },
    })
}

async fn decode_json<T: DeserializeOwned>(url: &str, response: Response) -> Result<T, AccessError> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| AccessError::InvalidResponse {
        url: url.to_string(),
        message: e.to_string(),
    })
}

/// Tree item as returned by both GitHub and GitLab listings.
#[derive(Debug, Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

impl TreeItem {
    /// Submodules and symlinks have no counterpart and are dropped.
    fn into_entry(self) -> Option<FileEntry> {
        match self.kind.as_str() {
            "blob" | "file" => Some(FileEntry::file(self.path)),
            "tree" | "dir" => Some(FileEntry::dir(self.path)),
            _ => None,
        }
    }
}
