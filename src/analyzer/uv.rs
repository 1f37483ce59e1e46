use std::collections::{BTreeMap, HashSet, VecDeque};

use serde::Deserialize;

use crate::models::{Dependency, DependencySource};

#[derive(Debug, Deserialize)]
struct UvLock {
    #[serde(default)]
    package: Vec<UvPackage>,
}

#[derive(Debug, Deserialize)]
struct UvPackage {
    name: String,
    /// Virtual workspace roots carry no version.
    version: Option<String>,
    /// Inline table with a single key naming the origin, e.g. `{ registry = "..." }`.
    #[serde(default)]
    source: toml::Table,
    #[serde(default)]
    dependencies: Vec<UvRequirement>,
    #[serde(default, rename = "optional-dependencies")]
    optional_dependencies: BTreeMap<String, Vec<UvRequirement>>,
    #[serde(default, rename = "dev-dependencies")]
    dev_dependencies: BTreeMap<String, Vec<UvRequirement>>,
}

#[derive(Debug, Deserialize)]
struct UvRequirement {
    name: String,
}

impl UvPackage {
    fn source(&self) -> DependencySource {
        if self.source.contains_key("git") {
            DependencySource::Git
        } else if ["editable", "virtual", "directory", "path"]
            .iter()
            .any(|key| self.source.contains_key(*key))
        {
            DependencySource::Path
        } else {
            DependencySource::Registry
        }
    }

    fn is_workspace_member(&self) -> bool {
        self.source.contains_key("editable") || self.source.contains_key("virtual")
    }

    fn runtime_requirements(&self) -> impl Iterator<Item = &str> {
        self.dependencies
            .iter()
            .chain(self.optional_dependencies.values().flatten())
            .map(|r| r.name.as_str())
    }
}

/// Parse a `uv.lock` (`[[package]]` tables, document order).
///
/// A package is dev when it is only reachable from a workspace member's
/// `dev-dependencies` groups and not from its regular or optional dependencies.
pub fn parse(raw: &str) -> Result<Vec<Dependency>, toml::de::Error> {
    let lock: UvLock = toml::from_str(raw)?;

    let members = || lock.package.iter().filter(|p| p.is_workspace_member());
    let runtime = reachable(&lock.package, members().flat_map(|m| m.runtime_requirements()));
    let dev = reachable(
        &lock.package,
        members().flat_map(|m| m.dev_dependencies.values().flatten().map(|r| r.name.as_str())),
    );

    let deps = lock
        .package
        .iter()
        .map(|p| {
            let version = p.version.clone().unwrap_or_else(|| "*".to_string());
            let dep = Dependency::new(p.name.clone(), version).with_source(p.source());
            let name = p.name.as_str();
            if dev.contains(name) && !runtime.contains(name) && !p.is_workspace_member() {
                dep.dev()
            } else {
                dep
            }
        })
        .collect();

    Ok(deps)
}

/// Names reachable from `roots` through the packages' runtime dependency edges.
fn reachable<'a>(
    packages: &'a [UvPackage],
    roots: impl Iterator<Item = &'a str>,
) -> HashSet<&'a str> {
    let by_name: BTreeMap<&str, &UvPackage> = packages.iter().map(|p| (p.name.as_str(), p)).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = roots.collect();

    while let Some(name) = queue.pop_front() {
        if !seen.insert(name) {
            continue;
        }
        if let Some(pkg) = by_name.get(name) {
            queue.extend(pkg.runtime_requirements());
        }
    }

    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DependencyType;

    const LOCK: &str = r#"
version = 1
requires-python = ">=3.11"

[[package]]
name = "app"
version = "0.1.0"
source = { editable = "." }
dependencies = [
    { name = "django" },
]

[package.dev-dependencies]
dev = [
    { name = "pytest" },
    { name = "django" },
]

[[package]]
name = "asgiref"
version = "3.7.2"
source = { registry = "https://pypi.org/simple" }

[[package]]
name = "django"
version = "4.2.0"
source = { registry = "https://pypi.org/simple" }
dependencies = [
    { name = "asgiref" },
]

[[package]]
name = "iniconfig"
version = "2.0.0"
source = { registry = "https://pypi.org/simple" }

[[package]]
name = "pytest"
version = "7.4.0"
source = { registry = "https://pypi.org/simple" }
dependencies = [
    { name = "iniconfig" },
]

[[package]]
name = "shared"
version = "1.2.0"
source = { git = "https://github.com/acme/shared?rev=abc#abc" }
"#;

    fn find<'a>(deps: &'a [Dependency], name: &str) -> &'a Dependency {
        deps.iter().find(|d| d.name == name).unwrap()
    }

    #[test]
    fn test_parse_uv_lock_order() {
        let deps = parse(LOCK).unwrap();
        let names: Vec<&str> = deps.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["app", "asgiref", "django", "iniconfig", "pytest", "shared"]);
        assert_eq!(find(&deps, "django").version, "4.2.0");
    }

    #[test]
    fn test_dev_classification() {
        let deps = parse(LOCK).unwrap();
        assert_eq!(find(&deps, "django").kind, DependencyType::Runtime);
        assert_eq!(find(&deps, "asgiref").kind, DependencyType::Runtime);
        assert_eq!(find(&deps, "pytest").kind, DependencyType::Dev);
        assert_eq!(find(&deps, "iniconfig").kind, DependencyType::Dev);
        assert_eq!(find(&deps, "app").kind, DependencyType::Runtime);
    }

    #[test]
    fn test_sources() {
        let deps = parse(LOCK).unwrap();
        assert_eq!(find(&deps, "app").source, DependencySource::Path);
        assert_eq!(find(&deps, "django").source, DependencySource::Registry);
        assert_eq!(find(&deps, "shared").source, DependencySource::Git);
    }

    #[test]
    fn test_virtual_root_without_version() {
        let content = r#"
version = 1

[[package]]
name = "workspace"
source = { virtual = "." }
"#;
        let deps = parse(content).unwrap();
        assert_eq!(deps[0].version, "*");
        assert_eq!(deps[0].source, DependencySource::Path);
    }

    #[test]
    fn test_malformed() {
        assert!(parse("version = 1\n[[package]]\nversion = \"1.0\"\n").is_err());
        assert!(parse("[[package\n").is_err());
    }
}
