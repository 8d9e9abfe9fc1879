//! Python projects.
//!
//! Sources, first match wins:
//! 1. `uv.lock`, `poetry.lock` or `pdm.lock`
//! 2. an installed virtualenv (`.venv` or `venv`)
//! 3. `requirements.txt` and `pyproject.toml` `[project].dependencies`

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::core::{DependencyRequest, Ecosystem, FetchError, RequestOrigin};
use crate::ecosystems::{invalid, read_toml, EcosystemAdapter};
use crate::util::fs::list_subdirs;

const LOCKFILES: [&str; 3] = ["uv.lock", "poetry.lock", "pdm.lock"];
const VENV_DIRS: [&str; 2] = [".venv", "venv"];

/// Installed tooling that is never a project dependency.
const PACKAGING_TOOLS: [&str; 5] = [
    "pip",
    "setuptools",
    "wheel",
    "pkg-resources",
    "importlib-metadata",
];

/// Project-URL labels that point at source code.
const SOURCE_LABELS: [&str; 4] = ["source", "repository", "code", "homepage"];

/// `name[extras] specifier`
static REQUIREMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9][A-Za-z0-9._-]*)\s*(?:\[[^\]]*\])?\s*(.*)$").expect("valid regex")
});

pub struct PipAdapter;

impl EcosystemAdapter for PipAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Pip
    }

    fn manifest_files(&self) -> &'static [&'static str] {
        &[
            "uv.lock",
            "poetry.lock",
            "pdm.lock",
            ".venv",
            "venv",
            "requirements.txt",
            "pyproject.toml",
        ]
    }

    fn list_dependencies(&self, project_root: &Path) -> Result<Vec<DependencyRequest>, FetchError> {
        if let Some(lockfile) = LOCKFILES
            .iter()
            .map(|f| project_root.join(f))
            .find(|p| p.is_file())
        {
            tracing::debug!("reading {}", lockfile.display());
            return read_lockfile(&lockfile);
        }

        if let Some(site_packages) = VENV_DIRS
            .iter()
            .filter_map(|d| site_packages(&project_root.join(d)))
            .next()
        {
            tracing::debug!("reading installed packages in {}", site_packages.display());
            return read_installed(&site_packages);
        }

        let requirements = project_root.join("requirements.txt");
        let pyproject = project_root.join("pyproject.toml");
        if !requirements.is_file() && !pyproject.is_file() {
            return Err(self.not_found(project_root));
        }

        let mut requests = Vec::new();
        if requirements.is_file() {
            let content = std::fs::read_to_string(&requirements).map_err(|e| invalid(&requirements, e))?;
            requests.extend(content.lines().filter_map(parse_requirement_line));
        }
        if pyproject.is_file() {
            requests.extend(read_pyproject(&pyproject)?);
        }
        Ok(requests)
    }
}

/// `[[package]]` tables of uv, poetry and pdm lockfiles.
fn read_lockfile(path: &Path) -> Result<Vec<DependencyRequest>, FetchError> {
    let doc = read_toml(path)?;
    let packages = doc
        .get("package")
        .and_then(|p| p.as_array())
        .ok_or_else(|| invalid(path, "no [[package]] tables"))?;

    let mut requests = Vec::new();
    for package in packages {
        let (Some(name), Some(version)) = (
            package.get("name").and_then(|v| v.as_str()),
            package.get("version").and_then(|v| v.as_str()),
        ) else {
            continue;
        };

        if !from_registry(package) {
            tracing::debug!("skipping {} (not from a package index)", name);
            continue;
        }

        requests.push(
            DependencyRequest::new(name, format!("=={}", version)).with_origin(RequestOrigin::Lockfile),
        );
    }
    Ok(requests)
}

/// Whether a lockfile package came from a package index.
fn from_registry(package: &toml::Value) -> bool {
    match package.get("source") {
        None => true,
        Some(toml::Value::Table(source)) => {
            // uv: { registry = "..." }; poetry: { type = "legacy", url = ... }
            if source.contains_key("registry") {
                return true;
            }
            match source.get("type").and_then(|t| t.as_str()) {
                Some(kind) => kind == "legacy",
                None => false,
            }
        }
        Some(_) => false,
    }
}

/// Locate `site-packages` inside a virtualenv.
fn site_packages(venv: &Path) -> Option<PathBuf> {
    if !venv.is_dir() {
        return None;
    }

    let windows = venv.join("Lib").join("site-packages");
    if windows.is_dir() {
        return Some(windows);
    }

    list_subdirs(&venv.join("lib"))
        .ok()?
        .into_iter()
        .filter(|d| {
            d.file_name()
                .map(|n| n.to_string_lossy().starts_with("python"))
                .unwrap_or(false)
        })
        .map(|d| d.join("site-packages"))
        .find(|d| d.is_dir())
}

/// Installed distributions from `*.dist-info/METADATA`.
fn read_installed(site_packages: &Path) -> Result<Vec<DependencyRequest>, FetchError> {
    let mut requests = Vec::new();

    let dist_infos = list_subdirs(site_packages).map_err(|e| invalid(site_packages, format!("{:#}", e)))?;
    for dist_info in dist_infos {
        let is_dist_info = dist_info
            .extension()
            .map(|e| e == "dist-info")
            .unwrap_or(false);
        if !is_dist_info {
            continue;
        }

        let metadata_path = dist_info.join("METADATA");
        let Ok(content) = std::fs::read_to_string(&metadata_path) else {
            tracing::debug!("no METADATA in {}", dist_info.display());
            continue;
        };

        let Some(metadata) = parse_metadata(&content) else {
            tracing::debug!("incomplete METADATA in {}", dist_info.display());
            continue;
        };

        if PACKAGING_TOOLS.contains(&Ecosystem::Pip.normalize_name(&metadata.name).as_str()) {
            continue;
        }

        let mut request = DependencyRequest::new(&metadata.name, format!("=={}", metadata.version))
            .with_origin(RequestOrigin::Installed);
        if let Some(url) = metadata.repository {
            request = request.with_repository(url);
        }
        requests.push(request);
    }

    Ok(requests)
}

#[derive(Debug, PartialEq, Eq)]
struct DistMetadata {
    name: String,
    version: String,
    repository: Option<String>,
}

/// Read the header block of a core metadata file.
fn parse_metadata(content: &str) -> Option<DistMetadata> {
    let mut name = None;
    let mut version = None;
    let mut repository = None;
    let mut home_page = None;

    for line in content.lines() {
        if line.is_empty() {
            break;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => name = Some(value.to_string()),
            "version" => version = Some(value.to_string()),
            "home-page" => home_page = Some(value.to_string()),
            "project-url" if repository.is_none() => {
                if let Some((label, url)) = value.split_once(',') {
                    let label = label.trim().to_ascii_lowercase();
                    if SOURCE_LABELS.iter().any(|l| label.contains(l)) {
                        repository = Some(url.trim().to_string());
                    }
                }
            }
            _ => {}
        }
    }

    Some(DistMetadata {
        name: name?,
        version: version?,
        repository: repository.or(home_page),
    })
}

/// Parse one PEP 508 line from a requirements file.
///
/// Options, editable installs, URLs and direct references are skipped;
/// environment markers are dropped.
pub(crate) fn parse_requirement_line(line: &str) -> Option<DependencyRequest> {
    let line = match line.find(" #") {
        Some(i) => &line[..i],
        None => line,
    };
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
        return None;
    }
    if line.contains("://") || line.contains(" @ ") {
        tracing::debug!("skipping direct reference `{}`", line);
        return None;
    }

    let line = match line.split_once(';') {
        Some((req, _markers)) => req.trim(),
        None => line,
    };

    let caps = REQUIREMENT.captures(line)?;
    let name = caps.get(1)?.as_str();
    let spec = caps
        .get(2)
        .map(|m| m.as_str().trim())
        .unwrap_or("")
        .trim_start_matches('(')
        .trim_end_matches(')')
        .trim();

    Some(DependencyRequest::new(name, spec))
}

/// `[project].dependencies` from pyproject.toml.
fn read_pyproject(path: &Path) -> Result<Vec<DependencyRequest>, FetchError> {
    let doc = read_toml(path)?;
    let deps = doc
        .get("project")
        .and_then(|p| p.get("dependencies"))
        .and_then(|d| d.as_array());

    Ok(deps
        .into_iter()
        .flatten()
        .filter_map(|d| d.as_str())
        .filter_map(parse_requirement_line)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ProjectFixture;

    #[test]
    fn test_requirement_lines() {
        let req = parse_requirement_line("requests>=2.0,<3.0").unwrap();
        assert_eq!(req.name(), "requests");
        assert_eq!(req.constraint(), ">=2.0,<3.0");

        let req = parse_requirement_line("uvicorn[standard] == 0.27.0 ; python_version >= '3.8'")
            .unwrap();
        assert_eq!(req.name(), "uvicorn");
        assert_eq!(req.constraint(), "== 0.27.0");

        let req = parse_requirement_line("numpy  # pinned later").unwrap();
        assert_eq!(req.constraint(), "");

        let req = parse_requirement_line("attrs (>=22.1)").unwrap();
        assert_eq!(req.constraint(), ">=22.1");
    }

    #[test]
    fn test_requirement_lines_skipped() {
        assert!(parse_requirement_line("# comment").is_none());
        assert!(parse_requirement_line("-r base.txt").is_none());
        assert!(parse_requirement_line("--index-url https://example.com/simple").is_none());
        assert!(parse_requirement_line("-e .").is_none());
        assert!(parse_requirement_line("pkg @ https://example.com/pkg.whl").is_none());
        assert!(parse_requirement_line("").is_none());
    }

    #[test]
    fn test_requirements_and_pyproject() {
        let project = ProjectFixture::new()
            .file("requirements.txt", "requests>=2.0,<3.0\n# tools\nrich\n")
            .file(
                "pyproject.toml",
                "[project]\nname = \"app\"\ndependencies = [\"httpx>=0.25\"]\n",
            )
            .build();

        let deps = PipAdapter.list_dependencies(project.path()).unwrap();
        let names: Vec<&str> = deps.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["requests", "rich", "httpx"]);
        assert_eq!(deps[2].constraint(), ">=0.25");
        assert!(deps.iter().all(|d| d.origin() == RequestOrigin::Manifest));
    }

    #[test]
    fn test_lockfile_wins() {
        let project = ProjectFixture::new()
            .file("requirements.txt", "requests\n")
            .file(
                "uv.lock",
                r#"
version = 1

[[package]]
name = "app"
version = "0.1.0"
source = { editable = "." }

[[package]]
name = "requests"
version = "2.31.0"
source = { registry = "https://pypi.org/simple" }

[[package]]
name = "idna"
version = "3.6"
source = { registry = "https://pypi.org/simple" }
"#,
            )
            .build();

        let deps = PipAdapter.list_dependencies(project.path()).unwrap();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].name(), "requests");
        assert_eq!(deps[0].constraint(), "==2.31.0");
        assert_eq!(deps[1].origin(), RequestOrigin::Lockfile);
    }

    #[test]
    fn test_poetry_lock_skips_git_sources() {
        let project = ProjectFixture::new()
            .file(
                "poetry.lock",
                r#"
[[package]]
name = "certifi"
version = "2024.2.2"

[[package]]
name = "mylib"
version = "0.3.0"

[package.source]
type = "git"
url = "https://github.com/me/mylib.git"
"#,
            )
            .build();

        let deps = PipAdapter.list_dependencies(project.path()).unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].name(), "certifi");
    }

    #[test]
    fn test_installed_virtualenv() {
        let site = ".venv/lib/python3.12/site-packages";
        let project = ProjectFixture::new()
            .file(
                &format!("{}/requests-2.31.0.dist-info/METADATA", site),
                "Metadata-Version: 2.1\nName: requests\nVersion: 2.31.0\n\
                 Project-URL: Documentation, https://requests.readthedocs.io\n\
                 Project-URL: Source, https://github.com/psf/requests\n\nBody text\n",
            )
            .file(
                &format!("{}/pip-24.0.dist-info/METADATA", site),
                "Name: pip\nVersion: 24.0\n",
            )
            .file(&format!("{}/requests/__init__.py", site), "")
            .build();

        let deps = PipAdapter.list_dependencies(project.path()).unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].name(), "requests");
        assert_eq!(deps[0].constraint(), "==2.31.0");
        assert_eq!(deps[0].repository(), Some("https://github.com/psf/requests"));
        assert_eq!(deps[0].origin(), RequestOrigin::Installed);
    }

    #[test]
    fn test_metadata_falls_back_to_home_page() {
        let meta = parse_metadata("Name: six\nVersion: 1.16.0\nHome-page: https://github.com/benjaminp/six\n")
            .unwrap();
        assert_eq!(meta.repository.as_deref(), Some("https://github.com/benjaminp/six"));
        assert!(parse_metadata("Name: broken\n").is_none());
    }

    #[test]
    fn test_invalid_lockfile() {
        let project = ProjectFixture::new().file("uv.lock", "not = [valid").build();
        let err = PipAdapter.list_dependencies(project.path()).unwrap_err();
        assert!(matches!(err, FetchError::ManifestInvalid { .. }));
        assert!(err.is_fatal());
    }
}
