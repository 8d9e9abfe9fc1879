//! Network capabilities.
//!
//! Everything that talks to the outside world sits behind one of the traits
//! in this module so that resolution, location and caching can run against
//! fakes in tests and against a cache-only registry when offline.

pub mod archive;
pub mod fetcher;
pub mod git;
pub mod http;
pub mod offline;
pub mod registry;

use std::path::Path;

use thiserror::Error;
use url::Url;

use crate::core::{Ecosystem, SourceLocation};

pub use archive::ArchiveFetcher;
pub use fetcher::SourceFetcher;
pub use git::{GitFetcher, GitProbe};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use offline::{NoNetwork, OfflineRegistry};
pub use registry::HttpRegistry;

/// Error reported by a capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// The thing asked for does not exist upstream
    #[error("not found: {0}")]
    NotFound(String),

    /// The request did not complete (connection, timeout, 5xx)
    #[error("transport error: {0}")]
    Transport(String),

    /// The upstream answered with something unusable
    #[error("invalid response: {0}")]
    Invalid(String),
}

impl SourceError {
    /// Whether retrying the same request later might succeed.
    pub fn is_transport(&self) -> bool {
        matches!(self, SourceError::Transport(_))
    }
}

/// The package a registry query is about.
#[derive(Debug, Clone, Copy)]
pub struct PackageQuery<'a> {
    pub ecosystem: Ecosystem,
    pub name: &'a str,
    /// Repository hint from local metadata
    pub repository: Option<&'a str>,
}

/// What a registry knows about where a release's source lives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryMetadata {
    /// Repository URLs as published, most specific first (not yet normalized)
    pub repositories: Vec<String>,
    /// Source archive (sdist, npm tarball)
    pub archive_url: Option<Url>,
}

/// A package index that knows which versions exist.
pub trait PackageRegistry: Send + Sync {
    /// Every published version of the package, in the ecosystem's spelling.
    ///
    /// Unknown packages yield `SourceError::NotFound`.
    fn available_versions(&self, query: &PackageQuery<'_>) -> Result<Vec<String>, SourceError>;

    /// Repository and archive information for one version.
    fn repository_metadata(
        &self,
        query: &PackageQuery<'_>,
        version: &str,
    ) -> Result<RepositoryMetadata, SourceError>;
}

/// Read-only access to git remotes.
pub trait RepositoryProbe: Send + Sync {
    /// List the tag names of a repository, or `None` if it does not exist.
    fn list_tags(&self, url: &Url) -> Result<Option<Vec<String>>, SourceError>;
}

/// Materializes a source location into a directory.
pub trait ContentFetcher: Send + Sync {
    /// Fetch the content at `location` into `dest`, which exists and is
    /// empty. Version-control metadata must not be left behind.
    fn fetch(&self, location: &SourceLocation, dest: &Path) -> Result<(), SourceError>;
}
