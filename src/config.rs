use std::path::Path;

use anyhow::{bail, Result};
use serde::Deserialize;

use crate::analyzer::SearchScope;
use crate::models::RepoConfig;

/// Root configuration structure, deserialized from `.version-checkr/config.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Values inherited by every repository entry that leaves them out.
    #[serde(default)]
    pub defaults: RepositoryEntry,
    #[serde(default)]
    pub repositories: Vec<RepositoryEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    /// Cap on repositories scanned at the same time. Unset means no cap.
    pub max_concurrency: Option<usize>,
    /// Deadline for the whole run, in seconds.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub github: ProviderSettings,
    #[serde(default)]
    pub gitlab: ProviderSettings,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProviderSettings {
    pub base_url: Option<String>,
    pub token: Option<String>,
}

impl ProviderSettings {
    /// The configured token, falling back to the `env_var` environment variable.
    pub fn resolve_token(&self, env_var: &str) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var(env_var).ok())
            .filter(|t| !t.trim().is_empty())
    }
}

/// One `[[repositories]]` entry, or the `[defaults]` table. Every field is optional.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RepositoryEntry {
    pub provider: Option<String>,
    pub owner: Option<String>,
    pub repository: Option<String>,
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    pub analyzer: Option<String>,
    pub packages: Option<Vec<String>>,
    pub paths: Option<Vec<String>>,
    pub search: Option<SearchScope>,
}

impl Config {
    /// Apply `[defaults]` to every repository entry, preserving config order.
    ///
    /// Lists are replaced, not merged. A missing `ref` stays empty and is resolved
    /// to the repository's default branch at scan time.
    pub fn resolve_repositories(&self) -> Result<Vec<RepoConfig>> {
        self.repositories
            .iter()
            .enumerate()
            .map(|(i, entry)| self.resolve(i, entry))
            .collect()
    }

    fn resolve(&self, index: usize, entry: &RepositoryEntry) -> Result<RepoConfig> {
        let d = &self.defaults;
        let pick = |own: &Option<String>, fallback: &Option<String>| own.clone().or_else(|| fallback.clone());

        let Some(owner) = pick(&entry.owner, &d.owner) else {
            bail!("repositories[{}]: missing `owner`", index);
        };
        let Some(repository) = entry.repository.clone() else {
            bail!("repositories[{}] ({}): missing `repository`", index, owner);
        };
        let slug = format!("{}/{}", owner, repository);
        let Some(provider) = pick(&entry.provider, &d.provider) else {
            bail!("{}: no `provider` set and no default provider", slug);
        };
        let Some(analyzer) = pick(&entry.analyzer, &d.analyzer) else {
            bail!("{}: no `analyzer` set and no default analyzer", slug);
        };

        Ok(RepoConfig {
            provider,
            owner,
            repository,
            git_ref: pick(&entry.git_ref, &d.git_ref).unwrap_or_default(),
            analyzer,
            packages: entry
                .packages
                .clone()
                .or_else(|| d.packages.clone())
                .unwrap_or_default(),
            paths: entry
                .paths
                .clone()
                .or_else(|| d.paths.clone())
                .unwrap_or_default(),
            search: entry.search.or(d.search).unwrap_or_default(),
        })
    }
}

/// Load the configuration, searching in order:
///
/// 1. `config_override`, the path passed via `--config`
/// 2. `./.version-checkr/config.toml`
/// 3. `~/.config/version-checkr/config.toml`
pub fn load_config(config_override: Option<&Path>) -> Result<Config> {
    if let Some(path) = config_override {
        return read_config(path);
    }

    let local = Path::new(".version-checkr").join("config.toml");
    if local.exists() {
        return read_config(&local);
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home
            .join(".config")
            .join("version-checkr")
            .join("config.toml");
        if home_config.exists() {
            return read_config(&home_config);
        }
    }

    bail!("no config file found; pass --config or create .version-checkr/config.toml")
}

fn read_config(path: &Path) -> Result<Config> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => bail!("failed to read {}: {}", path.display(), e),
    };
    match toml::from_str(&content) {
        Ok(config) => Ok(config),
        Err(e) => bail!("invalid config {}: {}", path.display(), e),
    }
}
