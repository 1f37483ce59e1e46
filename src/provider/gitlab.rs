use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{cancellable, check_status, decode_json, RepositoryAccess, TreeItem};
use crate::error::AccessError;
use crate::models::{FileEntry, RepoInfo};

pub const DEFAULT_BASE_URL: &str = "https://gitlab.com/api/v4";

const PER_PAGE: &str = "100";

/// GitLab REST v4 client. `owner` may be a nested group path (`group/subgroup`).
pub struct GitLabClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Project {
    name: String,
    /// Empty projects have no default branch.
    default_branch: Option<String>,
}

impl GitLabClient {
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
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.header("PRIVATE-TOKEN", token),
            None => request,
        }
    }

    fn project_url(&self, owner: &str, repo: &str) -> String {
        format!(
            "{}/projects/{}",
            self.base_url,
            encode_path(&format!("{}/{}", owner, repo))
        )
    }

    /// Walk every page of a repository tree listing.
    async fn tree(
        &self,
        owner: &str,
        repo: &str,
        git_ref: &str,
        path: &str,
        recursive: bool,
    ) -> Result<Vec<FileEntry>, AccessError> {
        let url = format!("{}/repository/tree", self.project_url(owner, repo));
        let recursive = if recursive { "true" } else { "false" };
        let mut entries = Vec::new();
        let mut page = "1".to_string();

        loop {
            let response = {
                let mut query = vec![
                    ("ref", git_ref),
                    ("recursive", recursive),
                    ("per_page", PER_PAGE),
                    ("page", page.as_str()),
                ];
                if !path.is_empty() {
                    query.push(("path", path));
                }
                check_status(&url, self.get(&url).query(&query).send().await?)?
            };
            let next_page = response
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string);

            let items: Vec<TreeItem> = decode_json(&url, response).await?;
            entries.extend(items.into_iter().filter_map(TreeItem::into_entry));

            match next_page {
                Some(next) => page = next,
                None => break,
            }
        }

        debug!(owner, repo, entries = entries.len(), "listed repository tree");
        Ok(entries)
    }
}

/// Percent-encode `/` and `.` the way GitLab expects for project ids and file paths.
fn encode_path(path: &str) -> String {
    path.trim_matches('/')
        .replace('%', "%25")
        .replace('/', "%2F")
        .replace('.', "%2E")
}

#[async_trait]
impl RepositoryAccess for GitLabClient {
    async fn repository_info(
        &self,
        cancel: &CancellationToken,
        owner: &str,
        repo: &str,
    ) -> Result<RepoInfo, AccessError> {
        let url = self.project_url(owner, repo);
        cancellable(cancel, async {
            let response = check_status(&url, self.get(&url).send().await?)?;
            let project: Project = decode_json(&url, response).await?;
            let default_branch = project
                .default_branch
                .ok_or_else(|| AccessError::InvalidResponse {
                    url: url.clone(),
                    message: "project has no default branch".to_string(),
                })?;
            Ok(RepoInfo {
                name: project.name,
                default_branch,
            })
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
        cancellable(cancel, self.tree(owner, repo, git_ref, path, false)).await
    }

    async fn list_files_recursive(
        &self,
        cancel: &CancellationToken,
        owner: &str,
        repo: &str,
        git_ref: &str,
    ) -> Result<Vec<FileEntry>, AccessError> {
        cancellable(cancel, self.tree(owner, repo, git_ref, "", true)).await
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
            "{}/repository/files/{}/raw",
            self.project_url(owner, repo),
            encode_path(path)
        );

        cancellable(cancel, async {
            let request = self.get(&url).query(&[("ref", git_ref)]);
            let response = check_status(&url, request.send().await?)?;
            Ok(response.text().await?)
        })
        .await
    }
}
