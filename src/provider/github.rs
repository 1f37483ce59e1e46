use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{cancellable, check_status, decode_json, RepositoryAccess, TreeItem};
use crate::error::AccessError;
use crate::models::{FileEntry, RepoInfo};

pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// GitHub REST v3 client.
pub struct GitHubClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitTree {
    #[serde(default)]
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

impl GitHubClient {
    pub fn new(client: Client, base_url: Option<String>, token: Option<String>) -> Self {
        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Self {
            client,
            base_url,
            token,
        }
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn repo_url(&self, owner: &str, repo: &str) -> String {
        format!("{}/repos/{}/{}", self.base_url, owner, repo)
    }
}

#[async_trait]
impl RepositoryAccess for GitHubClient {
    async fn repository_info(
        &self,
        cancel: &CancellationToken,
        owner: &str,
        repo: &str,
    ) -> Result<RepoInfo, AccessError> {
        let url = self.repo_url(owner, repo);
        cancellable(cancel, async {
            let response = check_status(&url, self.get(&url).send().await?)?;
            decode_json(&url, response).await
        })
        .await
    }

    async fn list_files(
        &self,
        cancel: &CancellationToken,
        owner: &str,
        repo: &str,
        git_ref: &str,
        path: &str,
    ) -> Result<Vec<FileEntry>, AccessError> {
        let path = path.trim_matches('/');
        let url = if path.is_empty() {
            format!("{}/contents", self.repo_url(owner, repo))
        } else {
            format!("{}/contents/{}", self.repo_url(owner, repo), path)
        };

        cancellable(cancel, async {
            let request = self.get(&url).query(&[("ref", git_ref)]);
            let response = check_status(&url, request.send().await?)?;
            let items: Vec<TreeItem> = decode_json(&url, response).await?;
            Ok(items.into_iter().filter_map(TreeItem::into_entry).collect())
        })
        .await
    }

    async fn list_files_recursive(
        &self,
        cancel: &CancellationToken,
        owner: &str,
        repo: &str,
        git_ref: &str,
    ) -> Result<Vec<FileEntry>, AccessError> {
        let url = format!("{}/git/trees/{}", self.repo_url(owner, repo), git_ref);

        cancellable(cancel, async {
            let request = self.get(&url).query(&[("recursive", "1")]);
            let response = check_status(&url, request.send().await?)?;
            let tree: GitTree = decode_json(&url, response).await?;
            if tree.truncated {
                warn!(owner, repo, git_ref, "GitHub truncated the tree listing");
            }
            debug!(owner, repo, entries = tree.tree.len(), "listed repository tree");
            Ok(tree.tree.into_iter().filter_map(TreeItem::into_entry).collect())
        })
        .await
    }

    async fn file_content(
        &self,
        cancel: &CancellationToken,
        owner: &str,
        repo: &str,
        git_ref: &str,
        path: &str,
    ) -> Result<String, AccessError> {
        let url = format!(
            "{}/contents/{}",
            self.repo_url(owner, repo),
            path.trim_start_matches('/')
        );

        cancellable(cancel, async {
            let request = self
                .get(&url)
                .header("Accept", "application/vnd.github.raw")
                .query(&[("ref", git_ref)]);
            let response = check_status(&url, request.send().await?)?;
            Ok(response.text().await?)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let client = GitHubClient::new(
            Client::new(),
            Some("https://ghe.example.com/api/v3/".to_string()),
            None,
        );
        assert_eq!(
            client.repo_url("acme", "api"),
            "https://ghe.example.com/api/v3/repos/acme/api"
        );
    }

    #[test]
    fn test_parse_git_tree() {
        let body = r#"{
            "sha": "abc",
            "tree": [
                {"path": "poetry.lock", "mode": "100644", "type": "blob", "sha": "1"},
                {"path": "services", "mode": "040000", "type": "tree", "sha": "2"},
                {"path": "services/api/poetry.lock", "mode": "100644", "type": "blob", "sha": "3"}
            ],
            "truncated": false
        }"#;
        let tree: GitTree = serde_json::from_str(body).unwrap();
        let entries: Vec<FileEntry> = tree.tree.into_iter().filter_map(TreeItem::into_entry).collect();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2], FileEntry::file("services/api/poetry.lock"));
    }

    #[test]
    fn test_parse_repo_info() {
        let body = r#"{"id": 1, "name": "api", "full_name": "acme/api", "default_branch": "trunk"}"#;
        let info: RepoInfo = serde_json::from_str(body).unwrap();
        assert_eq!(info.default_branch, "trunk");
    }
}
