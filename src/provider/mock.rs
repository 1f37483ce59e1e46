//! In-memory [`RepositoryAccess`] for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{cancellable, RepositoryAccess};
use crate::error::AccessError;
use crate::models::{FileEntry, RepoInfo};

/// Serves every repository from the same in-memory file set.
#[derive(Default)]
pub struct MockRepository {
    files: Vec<(String, String)>,
    file_errors: HashMap<String, AccessError>,
    tree_error: Option<AccessError>,
    default_branch: String,
    delay: Option<Duration>,
    pub tree_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub content_calls: AtomicUsize,
    pub refs_seen: Mutex<Vec<String>>,
}

impl MockRepository {
    pub fn new() -> Self {
        Self {
            default_branch: "main".to_string(),
            ..Default::default()
        }
    }

    pub fn with_file(mut self, path: &str, content: &str) -> Self {
        self.files.push((path.to_string(), content.to_string()));
        self
    }

    pub fn with_file_error(mut self, path: &str, error: AccessError) -> Self {
        self.file_errors.insert(path.to_string(), error);
        self
    }

    pub fn with_tree_error(mut self, error: AccessError) -> Self {
        self.tree_error = Some(error);
        self
    }

    pub fn with_default_branch(mut self, branch: &str) -> Self {
        self.default_branch = branch.to_string();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn entries(&self) -> Vec<FileEntry> {
        self.files
            .iter()
            .map(|(path, _)| FileEntry::file(path.clone()))
            .collect()
    }
}

#[async_trait]
impl RepositoryAccess for MockRepository {
    async fn repository_info(
        &self,
        cancel: &CancellationToken,
        _owner: &str,
        repo: &str,
    ) -> Result<RepoInfo, AccessError> {
        cancellable(cancel, async {
            self.pause().await;
            Ok(RepoInfo {
                name: repo.to_string(),
                default_branch: self.default_branch.clone(),
            })
        })
        .await
    }

    async fn list_files(
        &self,
        cancel: &CancellationToken,
        _owner: &str,
        _repo: &str,
        git_ref: &str,
        path: &str,
    ) -> Result<Vec<FileEntry>, AccessError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.refs_seen.lock().unwrap().push(git_ref.to_string());
        cancellable(cancel, async {
            self.pause().await;
            if let Some(err) = &self.tree_error {
                return Err(err.clone());
            }
            let prefix = path.trim_matches('/');
            Ok(self
                .entries()
                .into_iter()
                .filter(|e| match e.path.rsplit_once('/') {
                    Some((dir, _)) => dir == prefix,
                    None => prefix.is_empty(),
                })
                .collect())
        })
        .await
    }

    async fn list_files_recursive(
        &self,
        cancel: &CancellationToken,
        _owner: &str,
        _repo: &str,
        git_ref: &str,
    ) -> Result<Vec<FileEntry>, AccessError> {
        self.tree_calls.fetch_add(1, Ordering::SeqCst);
        self.refs_seen.lock().unwrap().push(git_ref.to_string());
        cancellable(cancel, async {
            self.pause().await;
            match &self.tree_error {
                Some(err) => Err(err.clone()),
                None => Ok(self.entries()),
            }
        })
        .await
    }

    async fn file_content(
        &self,
        cancel: &CancellationToken,
        _owner: &str,
        _repo: &str,
        git_ref: &str,
        path: &str,
    ) -> Result<String, AccessError> {
        self.content_calls.fetch_add(1, Ordering::SeqCst);
        self.refs_seen.lock().unwrap().push(git_ref.to_string());
        cancellable(cancel, async {
            self.pause().await;
            if let Some(err) = self.file_errors.get(path) {
                return Err(err.clone());
            }
            self.files
                .iter()
                .find(|(p, _)| p == path)
                .map(|(_, content)| content.clone())
                .ok_or_else(|| AccessError::NotFound(path.to_string()))
        })
        .await
    }
}
