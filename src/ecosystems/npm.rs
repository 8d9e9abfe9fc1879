//! Node projects.
//!
//! `package-lock.json` is preferred, then an installed `node_modules`
//! tree, then the ranges declared in `package.json`.

use std::collections::HashSet;
use std::path::Path;

use serde_json::Value;

use crate::core::{DependencyRequest, Ecosystem, FetchError, RequestOrigin};
use crate::ecosystems::{read_json, EcosystemAdapter};
use crate::util::fs::list_subdirs;

/// Dependency sections of package.json, in the order they are read.
const DEPENDENCY_SECTIONS: [&str; 4] = [
    "dependencies",
    "devDependencies",
    "optionalDependencies",
    "peerDependencies",
];

/// Range prefixes that point somewhere other than the registry.
const NON_REGISTRY_PREFIXES: [&str; 9] = [
    "file:", "link:", "workspace:", "git:", "git+", "github:", "http:", "https:", "npm:",
];

pub struct NpmAdapter;

impl EcosystemAdapter for NpmAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    fn manifest_files(&self) -> &'static [&'static str] {
        &["package-lock.json", "node_modules", "package.json"]
    }

    fn list_dependencies(&self, project_root: &Path) -> Result<Vec<DependencyRequest>, FetchError> {
        let lockfile = project_root.join("package-lock.json");
        if lockfile.is_file() {
            tracing::debug!("reading {}", lockfile.display());
            return read_lockfile(&lockfile);
        }

        let node_modules = project_root.join("node_modules");
        if node_modules.is_dir() {
            let installed = read_installed(&node_modules)?;
            if !installed.is_empty() {
                tracing::debug!("reading installed packages in {}", node_modules.display());
                return Ok(installed);
            }
        }

        let manifest = project_root.join("package.json");
        if manifest.is_file() {
            return read_manifest(&manifest);
        }

        Err(self.not_found(project_root))
    }
}

/// Exact versions from package-lock.json.
///
/// Lockfile v2/v3 list every install path under `packages`; v1 nests
/// `dependencies`. A package installed at several paths is listed once,
/// at the version of its shallowest (hoisted) install.
fn read_lockfile(path: &Path) -> Result<Vec<DependencyRequest>, FetchError> {
    let doc = read_json(path)?;

    let mut found: Vec<(usize, String, String)> = Vec::new();
    if let Some(packages) = doc.get("packages").and_then(Value::as_object) {
        for (install_path, package) in packages {
            let Some(idx) = install_path.rfind("node_modules/") else {
                continue;
            };
            if package.get("link").and_then(Value::as_bool).unwrap_or(false) {
                continue;
            }
            let name = &install_path[idx + "node_modules/".len()..];
            let Some(version) = package.get("version").and_then(Value::as_str) else {
                continue;
            };
            if !resolved_from_registry(package) {
                tracing::debug!("skipping {} (not from the registry)", name);
                continue;
            }
            let depth = install_path.matches("node_modules/").count();
            found.push((depth, name.to_string(), version.to_string()));
        }
    } else if let Some(deps) = doc.get("dependencies").and_then(Value::as_object) {
        collect_v1(deps, 1, &mut found);
    }

    // Shallowest first, then by name, so the surviving order is stable
    found.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    let mut seen = HashSet::new();
    let mut requests = Vec::new();
    for (_, name, version) in found {
        if !seen.insert(name.clone()) {
            continue;
        }
        requests.push(DependencyRequest::new(name, version).with_origin(RequestOrigin::Lockfile));
    }
    Ok(requests)
}

fn collect_v1(
    deps: &serde_json::Map<String, Value>,
    depth: usize,
    found: &mut Vec<(usize, String, String)>,
) {
    for (name, package) in deps {
        if let Some(version) = package.get("version").and_then(Value::as_str) {
            if resolved_from_registry(package) && !is_non_registry(version) {
                found.push((depth, name.clone(), version.to_string()));
            }
        }
        if let Some(nested) = package.get("dependencies").and_then(Value::as_object) {
            collect_v1(nested, depth + 1, found);
        }
    }
}

fn resolved_from_registry(package: &Value) -> bool {
    match package.get("resolved").and_then(Value::as_str) {
        Some(resolved) => !(resolved.starts_with("git") || resolved.starts_with("file:")),
        None => true,
    }
}

/// Installed packages, including `@scope/name` directories.
fn read_installed(node_modules: &Path) -> Result<Vec<DependencyRequest>, FetchError> {
    let mut package_dirs = Vec::new();
    let dirs = list_subdirs(node_modules).map_err(|e| super::invalid(node_modules, format!("{:#}", e)))?;
    for dir in dirs {
        let Some(dir_name) = dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if dir_name.starts_with('.') {
            continue;
        }
        if dir_name.starts_with('@') {
            let scoped = list_subdirs(&dir).map_err(|e| super::invalid(&dir, format!("{:#}", e)))?;
            package_dirs.extend(scoped);
        } else {
            package_dirs.push(dir);
        }
    }

    let mut requests = Vec::new();
    for dir in package_dirs {
        let manifest = dir.join("package.json");
        if !manifest.is_file() {
            continue;
        }
        let doc = match read_json(&manifest) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!("skipping {}: {}", dir.display(), e);
                continue;
            }
        };
        let (Some(name), Some(version)) = (
            doc.get("name").and_then(Value::as_str),
            doc.get("version").and_then(Value::as_str),
        ) else {
            continue;
        };

        let mut request = DependencyRequest::new(name, version).with_origin(RequestOrigin::Installed);
        if let Some(url) = repository_field(&doc) {
            request = request.with_repository(url);
        }
        requests.push(request);
    }
    Ok(requests)
}

/// The `repository` field of a package document, as a URL string.
///
/// Accepts both the string and `{ "type": "git", "url": ... }` forms.
pub(crate) fn repository_field(doc: &Value) -> Option<String> {
    let repo = doc.get("repository")?;
    let raw = match repo {
        Value::String(s) => s.as_str(),
        Value::Object(o) => o.get("url")?.as_str()?,
        _ => return None,
    };
    let raw = raw.trim();
    (!raw.is_empty()).then(|| raw.to_string())
}

/// Declared ranges from package.json.
fn read_manifest(path: &Path) -> Result<Vec<DependencyRequest>, FetchError> {
    let doc = read_json(path)?;

    let mut requests = Vec::new();
    for section in DEPENDENCY_SECTIONS {
        let Some(deps) = doc.get(section).and_then(Value::as_object) else {
            continue;
        };
        for (name, range) in deps {
            let Some(range) = range.as_str() else {
                continue;
            };
            if is_non_registry(range) {
                tracing::debug!("skipping {} ({})", name, range);
                continue;
            }
            requests.push(DependencyRequest::new(name, range));
        }
    }
    Ok(requests)
}

/// Whether a package.json range refers to something outside the registry.
fn is_non_registry(range: &str) -> bool {
    let range = range.trim();
    if NON_REGISTRY_PREFIXES.iter().any(|p| range.starts_with(p)) {
        return true;
    }
    // GitHub shorthand `owner/repo` or a local path
    range.contains('/') && !range.contains(' ')
}
