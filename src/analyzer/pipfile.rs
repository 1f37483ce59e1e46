use serde::Deserialize;
use serde_json::{Map, Value};

use crate::models::{Dependency, DependencySource};

/// `Pipfile.lock`: JSON with `default` (runtime) and `develop` (dev) sections.
#[derive(Debug, Deserialize)]
struct PipfileLock {
    #[serde(default)]
    default: Map<String, Value>,
    #[serde(default)]
    develop: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct PipfileEntry {
    version: Option<String>,
    git: Option<String>,
    #[serde(rename = "ref")]
    git_ref: Option<String>,
    path: Option<String>,
    file: Option<String>,
}

/// Parse a `Pipfile.lock`. Packages come out in document order, `default` first.
pub fn parse(raw: &str) -> Result<Vec<Dependency>, serde_json::Error> {
    let lock: PipfileLock = serde_json::from_str(raw)?;

    let mut deps = Vec::with_capacity(lock.default.len() + lock.develop.len());
    for (name, value) in &lock.default {
        deps.push(to_dependency(name, value)?);
    }
    for (name, value) in &lock.develop {
        deps.push(to_dependency(name, value)?.dev());
    }

    Ok(deps)
}

fn to_dependency(name: &str, value: &Value) -> Result<Dependency, serde_json::Error> {
    let entry = PipfileEntry::deserialize(value)?;

    if entry.git.is_some() {
        let version = entry.git_ref.unwrap_or_else(|| "*".to_string());
        return Ok(Dependency::new(name, version).with_source(DependencySource::Git));
    }

    let version = entry
        .version
        .as_deref()
        .map(strip_exact_pin)
        .unwrap_or_else(|| "*".to_string());

    let is_local = entry.path.is_some()
        || entry
            .file
            .as_deref()
            .is_some_and(|f| !f.starts_with("http://") && !f.starts_with("https://"));
    let source = if is_local {
        DependencySource::Path
    } else {
        DependencySource::Registry
    };

    Ok(Dependency::new(name, version).with_source(source))
}

/// `==4.2.0` and `===4.2.0` become `4.2.0`; any other specifier is kept as written.
fn strip_exact_pin(spec: &str) -> String {
    let spec = spec.trim();
    let pinned = spec
        .strip_prefix("===")
        .or_else(|| spec.strip_prefix("=="))
        .map(str::trim);
    match pinned {
        Some(version) if !version.is_empty() && !version.contains(char::is_whitespace) => {
            version.to_string()
        }
        _ => spec.to_string(),
    }
}
