//! Package registries over HTTP.
//!
//! - pip: the PyPI JSON API (`/pypi/<name>/json`, `/pypi/<name>/<version>/json`)
//! - npm: registry packuments (`<registry>/<name>`)
//! - swift: no central registry; versions are the tags of the package's
//!   repository

pub mod npm;
pub mod pypi;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use url::Url;

use crate::core::Ecosystem;
use crate::locator::url::normalize_repository_url;
use crate::resolver::VersionScheme;
use crate::sources::{
    HttpClient, PackageQuery, PackageRegistry, RepositoryMetadata, RepositoryProbe, SourceError,
};
use crate::util::config::{Config, DEFAULT_NPM_REGISTRY, DEFAULT_PYPI_URL};

/// Registry client for every supported ecosystem.
pub struct HttpRegistry {
    client: Arc<dyn HttpClient>,
    probe: Arc<dyn RepositoryProbe>,
    pypi_url: String,
    npm_registry: String,
    /// Parsed documents by URL, shared by version listing and metadata lookups
    documents: Mutex<HashMap<String, Arc<Value>>>,
}

impl HttpRegistry {
    pub fn new(client: Arc<dyn HttpClient>, probe: Arc<dyn RepositoryProbe>) -> Self {
        HttpRegistry {
            client,
            probe,
            pypi_url: DEFAULT_PYPI_URL.to_string(),
            npm_registry: DEFAULT_NPM_REGISTRY.to_string(),
            documents: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(
        client: Arc<dyn HttpClient>,
        probe: Arc<dyn RepositoryProbe>,
        config: &Config,
    ) -> Self {
        HttpRegistry::new(client, probe)
            .with_pypi_url(config.pypi_url())
            .with_npm_registry(config.npm_registry())
    }

    pub fn with_pypi_url(mut self, url: &str) -> Self {
        self.pypi_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_npm_registry(mut self, url: &str) -> Self {
        self.npm_registry = url.trim_end_matches('/').to_string();
        self
    }

    /// GET and parse a JSON document, reusing earlier responses.
    fn json(&self, url: &str) -> Result<Arc<Value>, SourceError> {
        if let Some(doc) = self.cached(url) {
            return Ok(doc);
        }

        let response = self.client.get(url)?.error_for_status(url)?;
        let doc: Value = serde_json::from_slice(&response.body)
            .map_err(|e| SourceError::Invalid(format!("{}: {}", url, e)))?;
        let doc = Arc::new(doc);

        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), Arc::clone(&doc));
        Ok(doc)
    }

    fn cached(&self, url: &str) -> Option<Arc<Value>> {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
    }

    /// The swift package's repository, from the query's hint.
    fn swift_repository(&self, query: &PackageQuery<'_>) -> Result<Url, SourceError> {
        query
            .repository
            .and_then(normalize_repository_url)
            .ok_or_else(|| SourceError::NotFound(format!("{} has no known repository", query.name)))
    }
}

impl PackageRegistry for HttpRegistry {
    fn available_versions(&self, query: &PackageQuery<'_>) -> Result<Vec<String>, SourceError> {
        match query.ecosystem {
            Ecosystem::Pip => {
                let doc = self.json(&pypi::project_url(&self.pypi_url, query.name))?;
                Ok(pypi::release_versions(&doc))
            }
            Ecosystem::Npm => {
                let doc = self.json(&npm::packument_url(&self.npm_registry, query.name))?;
                Ok(npm::versions(&doc))
            }
            Ecosystem::Swift => {
                let url = self.swift_repository(query)?;
                match self.probe.list_tags(&url)? {
                    Some(tags) => Ok(tag_versions(&tags)),
                    None => Err(SourceError::NotFound(url.to_string())),
                }
            }
        }
    }

    fn repository_metadata(
        &self,
        query: &PackageQuery<'_>,
        version: &str,
    ) -> Result<RepositoryMetadata, SourceError> {
        match query.ecosystem {
            Ecosystem::Pip => {
                let doc = self.json(&pypi::release_url(&self.pypi_url, query.name, version))?;
                Ok(pypi::release_metadata(&doc))
            }
            Ecosystem::Npm => {
                let doc = self.json(&npm::packument_url(&self.npm_registry, query.name))?;
                npm::release_metadata(&doc, version)
                    .ok_or_else(|| SourceError::NotFound(format!("{}@{}", query.name, version)))
            }
            Ecosystem::Swift => Ok(RepositoryMetadata {
                repositories: query.repository.map(str::to_string).into_iter().collect(),
                archive_url: None,
            }),
        }
    }
}

/// Version spellings named by release tags: `v1.3.0` lists as `1.3.0`.
///
/// Tags that are not versions are skipped. The locator maps a version back to
/// its tag through the tag patterns.
fn tag_versions(tags: &[String]) -> Vec<String> {
    let mut versions: Vec<String> = Vec::new();
    for tag in tags {
        let spelling = tag
            .strip_prefix('v')
            .or_else(|| tag.strip_prefix('V'))
            .unwrap_or(tag);
        if VersionScheme::Semver.parse(spelling).is_none() {
            continue;
        }
        if !versions.iter().any(|v| v == spelling) {
            versions.push(spelling.to_string());
        }
    }
    versions
}
