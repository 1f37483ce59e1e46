use serde::Deserialize;

use crate::models::{Dependency, DependencySource};

#[derive(Debug, Deserialize)]
struct PoetryLock {
    #[serde(default)]
    package: Vec<PoetryPackage>,
}

#[derive(Debug, Deserialize)]
struct PoetryPackage {
    name: String,
    version: String,
    /// Poetry < 1.2 marks dev packages with `category = "dev"`.
    category: Option<String>,
    /// Poetry 2 lists the dependency groups a package belongs to.
    #[serde(default)]
    groups: Vec<String>,
    source: Option<PoetrySource>,
}

#[derive(Debug, Deserialize)]
struct PoetrySource {
    #[serde(rename = "type")]
    kind: String,
}

impl PoetryPackage {
    fn is_dev(&self) -> bool {
        if self.category.as_deref() == Some("dev") {
            return true;
        }
        !self.groups.is_empty() && !self.groups.iter().any(|g| g == "main")
    }

    fn source(&self) -> DependencySource {
        match self.source.as_ref().map(|s| s.kind.as_str()) {
            Some("git") => DependencySource::Git,
            Some("directory") | Some("file") => DependencySource::Path,
            _ => DependencySource::Registry,
        }
    }
}

/// Parse a `poetry.lock` (`[[package]]` tables, document order).
pub fn parse(raw: &str) -> Result<Vec<Dependency>, toml::de::Error> {
    let lock: PoetryLock = toml::from_str(raw)?;

    let deps = lock
        .package
        .into_iter()
        .map(|p| {
            let dep = Dependency::new(p.name.clone(), p.version.clone()).with_source(p.source());
            if p.is_dev() {
                dep.dev()
            } else {
                dep
            }
        })
        .collect();

    Ok(deps)
}
