//! Ecosystem adapters.
//!
//! An adapter turns a project directory into the flat list of dependencies
//! it declares. Adapters only read local files; they never touch the
//! network.

pub mod npm;
pub mod pip;
pub mod swift;
pub mod toolchain;

use std::path::Path;

use crate::core::{DependencyRequest, Ecosystem, FetchError};

pub use npm::NpmAdapter;
pub use pip::PipAdapter;
pub use swift::SwiftAdapter;

/// Reads one ecosystem's dependency manifests.
pub trait EcosystemAdapter: Send + Sync {
    fn ecosystem(&self) -> Ecosystem;

    /// Files the adapter recognizes, in order of preference.
    fn manifest_files(&self) -> &'static [&'static str];

    /// List the project's dependencies.
    ///
    /// Fails with `ManifestNotFound` when none of the recognized files
    /// exist, and with `ManifestInvalid` when the chosen one is unreadable.
    fn list_dependencies(&self, project_root: &Path) -> Result<Vec<DependencyRequest>, FetchError>;

    /// The project's language toolchain as a dependency, if pinned.
    fn toolchain_request(&self, project_root: &Path) -> Option<DependencyRequest> {
        toolchain::toolchain_request(self.ecosystem(), project_root)
    }

    /// Error for a project with none of the recognized files.
    fn not_found(&self, project_root: &Path) -> FetchError {
        FetchError::ManifestNotFound {
            ecosystem: self.ecosystem(),
            root: project_root.to_path_buf(),
            looked_for: self.manifest_files().to_vec(),
        }
    }
}

static PIP: PipAdapter = PipAdapter;
static NPM: NpmAdapter = NpmAdapter;
static SWIFT: SwiftAdapter = SwiftAdapter;

/// The adapter registered for an ecosystem.
pub fn adapter_for(ecosystem: Ecosystem) -> &'static dyn EcosystemAdapter {
    match ecosystem {
        Ecosystem::Pip => &PIP,
        Ecosystem::Npm => &NPM,
        Ecosystem::Swift => &SWIFT,
    }
}

/// Look up an adapter by its command-line identifier.
pub fn adapter_named(name: &str) -> Result<&'static dyn EcosystemAdapter, FetchError> {
    let ecosystem: Ecosystem = name.parse()?;
    Ok(adapter_for(ecosystem))
}

/// Parse a JSON manifest.
pub(crate) fn read_json(path: &Path) -> Result<serde_json::Value, FetchError> {
    let content = std::fs::read_to_string(path).map_err(|e| invalid(path, e))?;
    serde_json::from_str(&content).map_err(|e| invalid(path, e))
}

/// Parse a TOML manifest.
pub(crate) fn read_toml(path: &Path) -> Result<toml::Value, FetchError> {
    let content = std::fs::read_to_string(path).map_err(|e| invalid(path, e))?;
    toml::from_str(&content).map_err(|e| invalid(path, e))
}

pub(crate) fn invalid(path: &Path, err: impl std::fmt::Display) -> FetchError {
    FetchError::ManifestInvalid {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_table() {
        for eco in Ecosystem::ALL {
            assert_eq!(adapter_for(eco).ecosystem(), eco);
        }
        assert_eq!(adapter_named("python").unwrap().ecosystem(), Ecosystem::Pip);
    }

    #[test]
    fn test_unknown_adapter() {
        let err = adapter_named("cargo").err().unwrap();
        assert!(matches!(err, FetchError::UnsupportedEcosystem(_)));
    }

    #[test]
    fn test_empty_project_is_manifest_not_found() {
        let tmp = tempfile::TempDir::new().unwrap();
        for eco in Ecosystem::ALL {
            let err = adapter_for(eco).list_dependencies(tmp.path()).unwrap_err();
            assert!(
                matches!(err, FetchError::ManifestNotFound { .. }),
                "{} adapter returned {:?}",
                eco,
                err
            );
        }
    }
}
