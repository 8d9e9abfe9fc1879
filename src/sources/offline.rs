//! Capabilities for offline runs, served from the cache alone.

use std::path::Path;
use std::sync::Arc;

use url::Url;

use crate::cache::CacheStore;
use crate::core::SourceLocation;
use crate::sources::{
    ContentFetcher, PackageQuery, PackageRegistry, RepositoryMetadata, RepositoryProbe, SourceError,
};

/// A registry that knows only the versions already in the cache.
pub struct OfflineRegistry {
    cache: Arc<CacheStore>,
}

impl OfflineRegistry {
    pub fn new(cache: Arc<CacheStore>) -> Self {
        OfflineRegistry { cache }
    }
}

impl PackageRegistry for OfflineRegistry {
    fn available_versions(&self, query: &PackageQuery<'_>) -> Result<Vec<String>, SourceError> {
        let versions = self.cache.versions(query.ecosystem, query.name);
        if versions.is_empty() {
            return Err(SourceError::NotFound(format!(
                "{} is not in the cache (offline)",
                query.name
            )));
        }
        Ok(versions)
    }

    fn repository_metadata(
        &self,
        query: &PackageQuery<'_>,
        _version: &str,
    ) -> Result<RepositoryMetadata, SourceError> {
        Err(SourceError::NotFound(format!("{}: no registry metadata offline", query.name)))
    }
}

/// Probe and fetcher that refuse every network request.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoNetwork;

impl RepositoryProbe for NoNetwork {
    fn list_tags(&self, url: &Url) -> Result<Option<Vec<String>>, SourceError> {
        Err(SourceError::NotFound(format!("{} (offline)", url)))
    }
}

impl ContentFetcher for NoNetwork {
    fn fetch(&self, location: &SourceLocation, _dest: &Path) -> Result<(), SourceError> {
        Err(SourceError::NotFound(format!("{} (offline)", location)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheKey, PutOptions};
    use crate::core::{Ecosystem, GitReference};
    use crate::test_support::FakeFetcher;
    use tempfile::TempDir;

    #[test]
    fn test_versions_from_cache() {
        let tmp = TempDir::new().unwrap();
        let cache = Arc::new(CacheStore::open(tmp.path()).unwrap());
        let location = SourceLocation::git(
            Url::parse("https://github.com/psf/requests").unwrap(),
            GitReference::Tag("v2.31.0".into()),
        );
        cache
            .put(
                &CacheKey::new(Ecosystem::Pip, "requests", "2.31.0"),
                &location,
                &FakeFetcher::new(),
                &PutOptions::default(),
            )
            .unwrap();

        let registry = OfflineRegistry::new(cache);
        let query = |name| PackageQuery {
            ecosystem: Ecosystem::Pip,
            name,
            repository: None,
        };
        assert_eq!(registry.available_versions(&query("Requests")).unwrap(), vec!["2.31.0"]);
        assert!(matches!(
            registry.available_versions(&query("rich")),
            Err(SourceError::NotFound(_))
        ));
    }

    #[test]
    fn test_no_network() {
        let tmp = TempDir::new().unwrap();
        let url = Url::parse("https://github.com/psf/requests").unwrap();
        assert!(NoNetwork.list_tags(&url).is_err());
        let location = SourceLocation::git(url, GitReference::DefaultBranch);
        assert!(NoNetwork.fetch(&location, tmp.path()).is_err());
    }
}
