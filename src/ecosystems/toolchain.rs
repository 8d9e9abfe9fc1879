//! Language toolchains pinned in `.mise.toml`.
//!
//! The pinned interpreter or compiler is fetched like any other dependency,
//! straight from its upstream repository.

use std::path::Path;

use crate::core::{DependencyRequest, Ecosystem, RequestOrigin};
use crate::ecosystems::read_toml;

pub const MISE_FILE: &str = ".mise.toml";

/// The upstream project behind an ecosystem's toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toolchain {
    /// Key under `[tools]`
    pub tool: &'static str,
    /// Dependency name used in the cache and manifest
    pub package: &'static str,
    pub repository: &'static str,
    /// Release tag patterns, `{version}` substituted
    pub tag_patterns: &'static [&'static str],
    /// Release segments a pinned version needs to name a tag
    min_segments: usize,
}

const PYTHON: Toolchain = Toolchain {
    tool: "python",
    package: "cpython",
    repository: "https://github.com/python/cpython",
    tag_patterns: &["v{version}"],
    min_segments: 3,
};

const NODE: Toolchain = Toolchain {
    tool: "node",
    package: "node",
    repository: "https://github.com/nodejs/node",
    tag_patterns: &["v{version}"],
    min_segments: 3,
};

const SWIFT: Toolchain = Toolchain {
    tool: "swift",
    package: "swift",
    repository: "https://github.com/apple/swift",
    tag_patterns: &["swift-{version}-RELEASE"],
    min_segments: 2,
};

impl Toolchain {
    pub fn for_ecosystem(ecosystem: Ecosystem) -> Toolchain {
        match ecosystem {
            Ecosystem::Pip => PYTHON,
            Ecosystem::Npm => NODE,
            Ecosystem::Swift => SWIFT,
        }
    }

    /// Whether `version` is specific enough to name a release tag.
    fn accepts(&self, version: &str) -> bool {
        let segments: Vec<&str> = version.split('.').collect();
        segments.len() >= self.min_segments
            && segments.iter().all(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
    }
}

/// The toolchain request for a project, if `.mise.toml` pins one.
pub fn toolchain_request(ecosystem: Ecosystem, project_root: &Path) -> Option<DependencyRequest> {
    let path = project_root.join(MISE_FILE);
    if !path.is_file() {
        return None;
    }

    let doc = match read_toml(&path) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!("ignoring {}: {}", path.display(), e);
            return None;
        }
    };

    let toolchain = Toolchain::for_ecosystem(ecosystem);
    let value = doc.get("tools")?.get(toolchain.tool)?;
    let version = pinned_version(value)?;

    if !toolchain.accepts(&version) {
        tracing::warn!(
            "{} version `{}` in {} does not name a release, skipping",
            toolchain.tool,
            version,
            MISE_FILE
        );
        return None;
    }

    Some(
        DependencyRequest::new(toolchain.package, version)
            .with_repository(toolchain.repository)
            .with_origin(RequestOrigin::Toolchain),
    )
}

/// `"3.12.1"`, `["3.12.1", "3.11"]` or `{ version = "3.12.1" }`.
fn pinned_version(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.trim().to_string()),
        toml::Value::Array(items) => items.first().and_then(pinned_version),
        toml::Value::Table(t) => t.get("version").and_then(pinned_version),
        _ => None,
    }
}
