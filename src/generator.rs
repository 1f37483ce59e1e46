//! Fans one scan task out per repository and joins the results into a [`Report`].
//!
//! Tasks share nothing mutable. Each one produces the [`RepositoryReport`] for
//! its input position, so the output order always matches the config order no
//! matter which repository finishes first.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::future::join_all;
use indicatif::ProgressBar;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analyzer::{AnalyzerConfig, AnalyzerKind};
use crate::error::{DiscoveryError, GenerateError, RepositoryError};
use crate::models::{ParsedFile, RepoConfig, Report, RepositoryReport};
use crate::provider::ProviderRegistry;

/// Lifecycle of one repository scan. There is no retry; failures are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    Queued,
    Discovering,
    NoFilesFound,
    Analyzing,
    Complete,
    Failed,
}

impl std::fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskPhase::Queued => "queued",
            TaskPhase::Discovering => "discovering",
            TaskPhase::NoFilesFound => "no-files-found",
            TaskPhase::Analyzing => "analyzing",
            TaskPhase::Complete => "complete",
            TaskPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

pub struct ReportGenerator {
    providers: ProviderRegistry,
    max_concurrency: Option<usize>,
    progress: Option<ProgressBar>,
}

impl ReportGenerator {
    pub fn new(providers: ProviderRegistry) -> Self {
        Self {
            providers,
            max_concurrency: None,
            progress: None,
        }
    }

    /// Limit how many repositories are scanned at once. `None` or `0` means no limit.
    pub fn with_max_concurrency(mut self, limit: Option<usize>) -> Self {
        self.max_concurrency = limit.filter(|n| *n > 0);
        self
    }

    /// Tick `progress` once per finished repository.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Scan every repository concurrently and wait for all of them.
    ///
    /// Per-repository failures land in that repository's report. The call itself
    /// only fails when `cancel` fires before or while waiting.
    pub async fn generate(
        &self,
        cancel: &CancellationToken,
        configs: &[RepoConfig],
    ) -> Result<Report, GenerateError> {
        if cancel.is_cancelled() {
            return Err(GenerateError::Cancelled);
        }

        let packages = tracked_packages(configs);
        let limiter = self.max_concurrency.map(|n| Arc::new(Semaphore::new(n)));

        let handles: Vec<_> = configs
            .iter()
            .cloned()
            .map(|config| {
                let providers = self.providers.clone();
                let cancel = cancel.clone();
                let limiter = limiter.clone();
                let progress = self.progress.clone();
                tokio::spawn(async move {
                    let _permit = match limiter {
                        Some(semaphore) => tokio::select! {
                            biased;
                            _ = cancel.cancelled() => None,
                            permit = semaphore.acquire_owned() => permit.ok(),
                        },
                        None => None,
                    };
                    let report = scan_repository(&providers, &cancel, &config).await;
                    if let Some(pb) = progress {
                        pb.inc(1);
                    }
                    report
                })
            })
            .collect();
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                for abort in aborts {
                    abort.abort();
                }
                warn!("report generation cancelled");
                return Err(GenerateError::Cancelled);
            }
            joined = join_all(handles) => joined,
        };

        // join_all keeps spawn order, so result i belongs to configs[i].
        let repositories: Vec<RepositoryReport> = joined
            .into_iter()
            .zip(configs)
            .map(|(result, config)| match result {
                Ok(report) => report,
                Err(e) => {
                    let mut report = empty_report(config);
                    report.error = Some(RepositoryError::Task(e.to_string()));
                    report
                }
            })
            .collect();

        info!(
            repositories = repositories.len(),
            failed = repositories.iter().filter(|r| r.error.is_some()).count(),
            "report generated"
        );

        Ok(Report {
            repositories,
            packages,
        })
    }
}

/// Sorted, deduplicated union of every requested package, whatever the scan outcome.
pub fn tracked_packages(configs: &[RepoConfig]) -> Vec<String> {
    configs
        .iter()
        .flat_map(|c| c.packages.iter().cloned())
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect()
}

fn empty_report(config: &RepoConfig) -> RepositoryReport {
    RepositoryReport {
        provider: config.provider.clone(),
        owner: config.owner.clone(),
        repository: config.repository.clone(),
        git_ref: config.git_ref.clone(),
        analyzer: config.analyzer.clone(),
        dependencies: BTreeMap::new(),
        files: Vec::new(),
        error: None,
    }
}

async fn scan_repository(
    providers: &ProviderRegistry,
    cancel: &CancellationToken,
    config: &RepoConfig,
) -> RepositoryReport {
    let mut report = empty_report(config);
    let slug = config.slug();
    debug!(repo = %slug, phase = %TaskPhase::Queued);

    match scan(providers, cancel, config, &mut report).await {
        Ok(()) => {
            debug!(repo = %slug, phase = %TaskPhase::Complete, tracked = report.dependencies.len());
        }
        Err(e) => {
            warn!(repo = %slug, phase = %TaskPhase::Failed, error = %e, "repository scan failed");
            report.files.clear();
            report.dependencies.clear();
            report.error = Some(e);
        }
    }

    report
}

async fn scan(
    providers: &ProviderRegistry,
    cancel: &CancellationToken,
    config: &RepoConfig,
    report: &mut RepositoryReport,
) -> Result<(), RepositoryError> {
    let owner = config.owner.as_str();
    let repo = config.repository.as_str();

    let access = providers.connect(&config.provider)?;
    let analyzer = AnalyzerKind::create(&config.analyzer)?;

    if report.git_ref.is_empty() {
        let info = access
            .repository_info(cancel, owner, repo)
            .await
            .map_err(RepositoryError::Resolve)?;
        debug!(owner, repo = %info.name, default_branch = %info.default_branch, "resolved ref");
        report.git_ref = info.default_branch;
    }
    let git_ref = report.git_ref.clone();

    let cfg = AnalyzerConfig::new(access)
        .with_paths(config.paths.clone())
        .with_search(config.search);

    debug!(owner, repo, phase = %TaskPhase::Discovering);
    let candidates = analyzer
        .candidate_files(cancel, owner, repo, &git_ref, &cfg)
        .await?;
    if candidates.is_empty() {
        debug!(owner, repo, phase = %TaskPhase::NoFilesFound);
        return Err(DiscoveryError::NoCandidates {
            file_name: analyzer.kind().format().file_name(),
        }
        .into());
    }

    debug!(owner, repo, phase = %TaskPhase::Analyzing, candidates = candidates.len());
    let parsed = analyzer
        .analyze_dependencies(cancel, owner, repo, &git_ref, &candidates, &cfg)
        .await?;

    report.files = parsed.iter().map(|f| f.path.clone()).collect();
    report.dependencies = select_tracked(&config.packages, &parsed);
    Ok(())
}

/// Version of each tracked package. The first file in discovery order that
/// declares a package wins; untracked packages are ignored.
fn select_tracked(packages: &[String], parsed: &[ParsedFile]) -> BTreeMap<String, String> {
    let mut found = BTreeMap::new();
    for package in packages {
        if found.contains_key(package) {
            continue;
        }
        let version = parsed
            .iter()
            .flat_map(|file| file.dependencies.iter())
            .find(|dep| &dep.name == package)
            .map(|dep| dep.version.clone());
        if let Some(version) = version {
            found.insert(package.clone(), version);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::analyzer::SearchScope;
    use crate::error::{AccessError, AnalysisError, SetupError};
    use crate::models::Dependency;
    use crate::provider::mock::MockRepository;
    use crate::provider::ProviderKind;

    const DJANGO_PIPFILE: &str = r#"{"default": {"django": {"version": "==4.2.0"}}, "develop": {}}"#;

    fn repo(provider: &str, name: &str, analyzer: &str, packages: &[&str], paths: &[&str]) -> RepoConfig {
        RepoConfig {
            provider: provider.to_string(),
            owner: "acme".to_string(),
            repository: name.to_string(),
            git_ref: "main".to_string(),
            analyzer: analyzer.to_string(),
            packages: packages.iter().map(|p| p.to_string()).collect(),
            paths: paths.iter().map(|p| p.to_string()).collect(),
            search: SearchScope::Recursive,
        }
    }

    fn registry(github: MockRepository) -> (ProviderRegistry, Arc<MockRepository>) {
        let github = Arc::new(github);
        let registry = ProviderRegistry::new().register(ProviderKind::GitHub, github.clone());
        (registry, github)
    }

    #[tokio::test]
    async fn test_tracked_package_found_and_missing() {
        let (providers, github) =
            registry(MockRepository::new().with_file("Pipfile.lock", DJANGO_PIPFILE));
        let configs = vec![repo(
            "github",
            "api",
            "pipfile",
            &["django", "requests"],
            &["Pipfile.lock"],
        )];

        let report = ReportGenerator::new(providers)
            .generate(&CancellationToken::new(), &configs)
            .await
            .unwrap();

        assert_eq!(report.packages, vec!["django", "requests"]);
        assert_eq!(report.repositories.len(), 1);
        let api = &report.repositories[0];
        assert!(api.error.is_none());
        assert_eq!(
            api.dependencies,
            BTreeMap::from([("django".to_string(), "4.2.0".to_string())])
        );
        assert_eq!(api.files, vec!["Pipfile.lock"]);
        assert_eq!(github.tree_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_provider_is_isolated() {
        let (providers, _) =
            registry(MockRepository::new().with_file("Pipfile.lock", DJANGO_PIPFILE));
        let configs = vec![
            repo("invalid-provider", "broken", "pipfile", &["django"], &[]),
            repo("github", "api", "pipfile", &["django"], &[]),
        ];

        let report = ReportGenerator::new(providers)
            .generate(&CancellationToken::new(), &configs)
            .await
            .unwrap();

        assert_eq!(report.repositories.len(), 2);
        assert_eq!(
            report.repositories[0].error,
            Some(SetupError::UnsupportedProvider("invalid-provider".to_string()).into())
        );
        assert!(report.repositories[1].error.is_none());
        assert_eq!(report.repositories[1].dependencies["django"], "4.2.0");
        assert!(report.has_errors());
        assert!(report.errors().contains_key("acme/broken"));
    }

    #[tokio::test]
    async fn test_unsupported_analyzer() {
        let (providers, _) = registry(MockRepository::new());
        let configs = vec![repo("github", "api", "npm", &["left-pad"], &[])];

        let report = ReportGenerator::new(providers)
            .generate(&CancellationToken::new(), &configs)
            .await
            .unwrap();

        assert_eq!(
            report.repositories[0].error,
            Some(SetupError::UnsupportedAnalyzer("npm".to_string()).into())
        );
        assert_eq!(report.packages, vec!["left-pad"]);
    }

    #[tokio::test]
    async fn test_packages_union_is_sorted_and_independent_of_failures() {
        let (providers, _) = registry(MockRepository::new());
        let configs = vec![
            repo("github", "a", "poetry", &["requests", "django"], &[]),
            repo("nope", "b", "poetry", &["celery", "django"], &[]),
            repo("github", "c", "bogus", &["attrs"], &[]),
        ];

        let report = ReportGenerator::new(providers)
            .generate(&CancellationToken::new(), &configs)
            .await
            .unwrap();

        assert!(report.repositories.iter().all(|r| r.error.is_some()));
        assert_eq!(report.packages, vec!["attrs", "celery", "django", "requests"]);
    }

    #[tokio::test]
    async fn test_no_lock_files_found() {
        let (providers, _) = registry(MockRepository::new().with_file("README.md", "# api"));
        let configs = vec![repo("github", "api", "uvlock", &["django"], &[])];

        let report = ReportGenerator::new(providers)
            .generate(&CancellationToken::new(), &configs)
            .await
            .unwrap();

        let api = &report.repositories[0];
        assert_eq!(
            api.error,
            Some(DiscoveryError::NoCandidates { file_name: "uv.lock" }.into())
        );
        assert!(api.dependencies.is_empty());
    }

    #[tokio::test]
    async fn test_all_files_broken() {
        let (providers, _) = registry(MockRepository::new().with_file("poetry.lock", "not = [toml"));
        let configs = vec![repo("github", "api", "poetry", &["django"], &[])];

        let report = ReportGenerator::new(providers)
            .generate(&CancellationToken::new(), &configs)
            .await
            .unwrap();

        match &report.repositories[0].error {
            Some(RepositoryError::Analysis(AnalysisError::AllCandidatesFailed { attempted, .. })) => {
                assert_eq!(*attempted, 1)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_first_file_in_discovery_order_wins() {
        let (providers, _) = registry(
            MockRepository::new()
                .with_file("services/a/Pipfile.lock", r#"{"default": {"django": {"version": "==3.2.0"}}}"#)
                .with_file("broken/Pipfile.lock", "{")
                .with_file("services/b/Pipfile.lock", r#"{"default": {"django": {"version": "==4.2.0"}, "celery": {"version": "==5.3.0"}}}"#),
        );
        let configs = vec![repo("github", "api", "pipfile", &["django", "celery"], &[])];

        let report = ReportGenerator::new(providers)
            .generate(&CancellationToken::new(), &configs)
            .await
            .unwrap();

        let api = &report.repositories[0];
        assert!(api.error.is_none());
        assert_eq!(api.dependencies["django"], "3.2.0");
        assert_eq!(api.dependencies["celery"], "5.3.0");
        assert_eq!(api.files, vec!["services/a/Pipfile.lock", "services/b/Pipfile.lock"]);
    }

    #[tokio::test]
    async fn test_output_order_follows_input_order() {
        let slow = Arc::new(
            MockRepository::new()
                .with_file("Pipfile.lock", DJANGO_PIPFILE)
                .with_delay(Duration::from_millis(50)),
        );
        let fast = Arc::new(MockRepository::new().with_file(
            "Pipfile.lock",
            r#"{"default": {"django": {"version": "==5.0.1"}}}"#,
        ));
        let providers = ProviderRegistry::new()
            .register(ProviderKind::GitHub, slow)
            .register(ProviderKind::GitLab, fast);
        let configs = vec![
            repo("github", "slow", "pipfile", &["django"], &[]),
            repo("gitlab", "fast", "pipfile", &["django"], &[]),
        ];

        let report = ReportGenerator::new(providers)
            .generate(&CancellationToken::new(), &configs)
            .await
            .unwrap();

        let names: Vec<&str> = report.repositories.iter().map(|r| r.repository.as_str()).collect();
        assert_eq!(names, vec!["slow", "fast"]);
        assert_eq!(report.repositories[0].dependencies["django"], "4.2.0");
        assert_eq!(report.repositories[1].dependencies["django"], "5.0.1");
    }

    #[tokio::test]
    async fn test_default_branch_is_resolved() {
        let (providers, github) = registry(
            MockRepository::new()
                .with_file("poetry.lock", "[[package]]\nname = \"django\"\nversion = \"4.2.0\"\n")
                .with_default_branch("trunk"),
        );
        let mut config = repo("github", "api", "poetry", &["django"], &[]);
        config.git_ref = String::new();

        let report = ReportGenerator::new(providers)
            .generate(&CancellationToken::new(), &[config])
            .await
            .unwrap();

        assert_eq!(report.repositories[0].git_ref, "trunk");
        assert!(github
            .refs_seen
            .lock()
            .unwrap()
            .iter()
            .all(|r| r == "trunk"));
    }

    #[tokio::test]
    async fn test_traversal_error_is_recorded() {
        let (providers, _) = registry(
            MockRepository::new().with_tree_error(AccessError::Unauthorized("acme/api".to_string())),
        );
        let configs = vec![repo("github", "api", "poetry", &["django"], &[])];

        let report = ReportGenerator::new(providers)
            .generate(&CancellationToken::new(), &configs)
            .await
            .unwrap();

        assert_eq!(
            report.repositories[0].error,
            Some(DiscoveryError::Traversal(AccessError::Unauthorized("acme/api".to_string())).into())
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (providers, github) = registry(MockRepository::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = ReportGenerator::new(providers)
            .generate(&cancel, &[repo("github", "api", "poetry", &["django"], &[])])
            .await;

        assert_eq!(result, Err(GenerateError::Cancelled));
        assert_eq!(github.tree_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_while_waiting() {
        let (providers, _) = registry(
            MockRepository::new()
                .with_file("poetry.lock", "")
                .with_delay(Duration::from_secs(30)),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = ReportGenerator::new(providers)
            .generate(&cancel, &[repo("github", "api", "poetry", &["django"], &[])])
            .await;

        assert_eq!(result, Err(GenerateError::Cancelled));
    }

    #[tokio::test]
    async fn test_bounded_concurrency_completes_every_repository() {
        let (providers, _) = registry(
            MockRepository::new()
                .with_file("Pipfile.lock", DJANGO_PIPFILE)
                .with_delay(Duration::from_millis(5)),
        );
        let configs: Vec<RepoConfig> = (0..6)
            .map(|i| repo("github", &format!("svc-{i}"), "pipfile", &["django"], &[]))
            .collect();

        let report = ReportGenerator::new(providers)
            .with_max_concurrency(Some(2))
            .generate(&CancellationToken::new(), &configs)
            .await
            .unwrap();

        assert_eq!(report.repositories.len(), 6);
        assert!(!report.has_errors());
        assert_eq!(report.repositories[5].repository, "svc-5");
    }

    #[tokio::test]
    async fn test_generate_is_idempotent() {
        let (providers, _) = registry(
            MockRepository::new()
                .with_file("Pipfile.lock", DJANGO_PIPFILE)
                .with_file("other/Pipfile.lock", "{"),
        );
        let configs = vec![
            repo("github", "api", "pipfile", &["requests", "django"], &[]),
            repo("svn", "old", "pipfile", &["six"], &[]),
        ];
        let generator = ReportGenerator::new(providers);

        let first = generator.generate(&CancellationToken::new(), &configs).await.unwrap();
        let second = generator.generate(&CancellationToken::new(), &configs).await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_select_tracked_ignores_untracked() {
        let parsed = vec![ParsedFile {
            path: "poetry.lock".to_string(),
            dependencies: vec![
                Dependency::new("django", "4.2.0"),
                Dependency::new("Django", "1.0.0"),
                Dependency::new("sqlparse", "0.4.4"),
            ],
        }];
        let tracked = select_tracked(&["django".to_string(), "flask".to_string()], &parsed);
        assert_eq!(tracked, BTreeMap::from([("django".to_string(), "4.2.0".to_string())]));
    }
}
