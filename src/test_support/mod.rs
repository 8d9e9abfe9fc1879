//! Test doubles for the network capabilities.
//!
//! Every trait in [`crate::sources`] has a fake here so that resolution,
//! location, caching and whole fetch runs can be exercised without a
//! network. The fakes are `Send + Sync` and count their calls, which lets
//! tests assert how often upstream would have been contacted.
//!
//! # Example
//!
//! ```rust,ignore
//! use ref_fetch::test_support::{FakeProbe, FakeRegistry};
//!
//! let registry = FakeRegistry::new()
//!     .with_versions(Ecosystem::Pip, "requests", &["2.31.0"])
//!     .with_repository(Ecosystem::Pip, "requests", "https://github.com/psf/requests");
//! let probe = FakeProbe::new().with_tags("https://github.com/psf/requests", &["v2.31.0"]);
//! ```

pub mod fixtures;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use url::Url;

use crate::core::{Ecosystem, SourceLocation};
use crate::sources::{
    ContentFetcher, HttpClient, HttpResponse, PackageQuery, PackageRegistry, RepositoryMetadata,
    RepositoryProbe, SourceError,
};
use crate::util::cancel::CancellationToken;

pub use fixtures::*;

fn registry_key(ecosystem: Ecosystem, name: &str) -> (Ecosystem, String) {
    (ecosystem, ecosystem.normalize_name(name))
}

/// In-memory package registry.
#[derive(Debug, Default)]
pub struct FakeRegistry {
    versions: HashMap<(Ecosystem, String), Vec<String>>,
    metadata: HashMap<(Ecosystem, String), RepositoryMetadata>,
    failing: HashSet<String>,
    calls: Arc<AtomicUsize>,
    lookups: Mutex<Vec<String>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        FakeRegistry::default()
    }

    /// Publish `versions` of a package.
    pub fn with_versions(mut self, ecosystem: Ecosystem, name: &str, versions: &[&str]) -> Self {
        self.versions
            .entry(registry_key(ecosystem, name))
            .or_default()
            .extend(versions.iter().map(|v| v.to_string()));
        self
    }

    /// Add a repository URL to every version's metadata.
    pub fn with_repository(mut self, ecosystem: Ecosystem, name: &str, url: &str) -> Self {
        self.metadata
            .entry(registry_key(ecosystem, name))
            .or_default()
            .repositories
            .push(url.to_string());
        self
    }

    /// Set the source archive of every version.
    pub fn with_archive(mut self, ecosystem: Ecosystem, name: &str, url: &str) -> Self {
        self.metadata
            .entry(registry_key(ecosystem, name))
            .or_default()
            .archive_url = Some(Url::parse(url).expect("valid archive url"));
        self
    }

    /// Fail every request about `name` with a transport error.
    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    /// Shared counter of all registry calls.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    /// Names whose versions were listed, in call order.
    pub fn lookups(&self) -> Vec<String> {
        self.lookups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check(&self, name: &str) -> Result<(), SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(name) {
            return Err(SourceError::Transport(format!("{}: connection refused", name)));
        }
        Ok(())
    }
}

impl PackageRegistry for FakeRegistry {
    fn available_versions(&self, query: &PackageQuery<'_>) -> Result<Vec<String>, SourceError> {
        self.check(query.name)?;
        self.lookups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(query.name.to_string());

        self.versions
            .get(&registry_key(query.ecosystem, query.name))
            .cloned()
            .ok_or_else(|| SourceError::NotFound(query.name.to_string()))
    }

    fn repository_metadata(
        &self,
        query: &PackageQuery<'_>,
        _version: &str,
    ) -> Result<RepositoryMetadata, SourceError> {
        self.check(query.name)?;
        Ok(self
            .metadata
            .get(&registry_key(query.ecosystem, query.name))
            .cloned()
            .unwrap_or_default())
    }
}

/// In-memory git remotes, keyed by URL.
#[derive(Debug, Default)]
pub struct FakeProbe {
    tags: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
}

impl FakeProbe {
    pub fn new() -> Self {
        FakeProbe::default()
    }

    /// Make `url` an existing repository with `tags`.
    pub fn with_tags(mut self, url: &str, tags: &[&str]) -> Self {
        self.tags
            .insert(probe_key(url), tags.iter().map(|t| t.to_string()).collect());
        self
    }

    /// Fail listing `url` with a transport error.
    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(probe_key(url));
        self
    }
}

fn probe_key(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

impl RepositoryProbe for FakeProbe {
    fn list_tags(&self, url: &Url) -> Result<Option<Vec<String>>, SourceError> {
        if self.failing.contains(url.as_str()) {
            return Err(SourceError::Transport(format!("{}: timed out", url)));
        }
        Ok(self.tags.get(url.as_str()).cloned())
    }
}

/// Content fetcher that writes a fixed set of files.
#[derive(Debug)]
pub struct FakeFetcher {
    files: Vec<(String, String)>,
    error: Option<SourceError>,
    cancel: Option<CancellationToken>,
    delay: Option<Duration>,
    count: AtomicUsize,
}

impl Default for FakeFetcher {
    fn default() -> Self {
        FakeFetcher::new()
    }
}

impl FakeFetcher {
    /// Writes `README.md` and `src/lib.txt`.
    pub fn new() -> Self {
        FakeFetcher {
            files: vec![
                ("README.md".to_string(), "# fixture\n".to_string()),
                ("src/lib.txt".to_string(), "content\n".to_string()),
            ],
            error: None,
            cancel: None,
            delay: None,
            count: AtomicUsize::new(0),
        }
    }

    /// Replace the files written by each fetch.
    pub fn with_files(mut self, files: &[(&str, &str)]) -> Self {
        self.files = files
            .iter()
            .map(|(path, content)| (path.to_string(), content.to_string()))
            .collect();
        self
    }

    /// Write the files, then fail with `error`.
    pub fn failing_with(mut self, error: SourceError) -> Self {
        self.error = Some(error);
        self
    }

    /// Cancel `token` once the content is written.
    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Sleep before writing, to widen race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl ContentFetcher for FakeFetcher {
    fn fetch(&self, _location: &SourceLocation, dest: &Path) -> Result<(), SourceError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        for (path, content) in &self.files {
            let path = dest.join(path);
            let write = |p: &Path| -> std::io::Result<()> {
                if let Some(parent) = p.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(p, content)
            };
            write(&path).map_err(|e| SourceError::Invalid(e.to_string()))?;
        }

        if let Some(token) = &self.cancel {
            token.cancel();
        }
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Mock HTTP response for registry and archive tests.
#[derive(Debug, Clone)]
pub struct MockHttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl MockHttpResponse {
    /// Create a successful response with the given body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        MockHttpResponse {
            status: 200,
            body: body.into(),
        }
    }

    /// Create a not found response.
    pub fn not_found() -> Self {
        MockHttpResponse {
            status: 404,
            body: b"Not Found".to_vec(),
        }
    }

    /// Create a server error response.
    pub fn server_error(message: &str) -> Self {
        MockHttpResponse {
            status: 500,
            body: message.as_bytes().to_vec(),
        }
    }
}

/// Mock HTTP client; unmatched URLs answer 404.
#[derive(Debug, Default)]
pub struct MockHttpClient {
    responses: HashMap<String, MockHttpResponse>,
    requests: Mutex<Vec<String>>,
}

impl MockHttpClient {
    /// Create a new mock HTTP client.
    pub fn new() -> Self {
        MockHttpClient::default()
    }

    /// Add a response for a URL (exact, or a prefix of the requested URL).
    pub fn with_response(mut self, url: &str, response: MockHttpResponse) -> Self {
        self.responses.insert(url.to_string(), response);
        self
    }

    /// Every URL requested so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lookup(&self, url: &str) -> MockHttpResponse {
        if let Some(response) = self.responses.get(url) {
            return response.clone();
        }

        // Longest prefix wins
        self.responses
            .iter()
            .filter(|(pattern, _)| url.starts_with(pattern.as_str()))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, response)| response.clone())
            .unwrap_or_else(MockHttpResponse::not_found)
    }
}

impl HttpClient for MockHttpClient {
    fn get(&self, url: &str) -> Result<HttpResponse, SourceError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());

        let response = self.lookup(url);
        Ok(HttpResponse {
            status: response.status,
            body: response.body,
        })
    }
}

/// Assertion helpers for testing.
pub mod assertions {
    use std::path::Path;

    use crate::core::{FetchManifest, FetchOutcome};

    /// Assert that a result is Ok and return the value.
    pub fn assert_ok<T, E: std::fmt::Debug>(result: Result<T, E>) -> T {
        match result {
            Ok(v) => v,
            Err(e) => panic!("expected Ok, got Err: {:?}", e),
        }
    }

    /// Assert that a result is Err and return the error.
    pub fn assert_err<T: std::fmt::Debug, E>(result: Result<T, E>) -> E {
        match result {
            Ok(v) => panic!("expected Err, got Ok: {:?}", v),
            Err(e) => e,
        }
    }

    /// Assert the outcome recorded for `dependency`.
    pub fn assert_outcome(manifest: &FetchManifest, dependency: &str, expected: FetchOutcome) {
        let entry = manifest
            .entry(dependency)
            .unwrap_or_else(|| panic!("no manifest entry for {}", dependency));
        assert_eq!(
            entry.outcome, expected,
            "{} was {:?} ({})",
            dependency, entry.outcome, entry.detail
        );
    }

    /// Assert that a file exists and contains specific content.
    pub fn assert_file_contains(path: impl AsRef<Path>, content: &str) {
        let path = path.as_ref();
        let actual = std::fs::read_to_string(path)
            .unwrap_or_else(|_| panic!("file not found: {}", path.display()));
        assert!(
            actual.contains(content),
            "file {} does not contain '{}'\nactual content:\n{}",
            path.display(),
            content,
            actual
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_http_client_prefix_match() {
        let client = MockHttpClient::new()
            .with_response("https://example.com/", MockHttpResponse::server_error("busy"))
            .with_response("https://example.com/file.tar.gz", MockHttpResponse::ok("tarball"));

        let response = client.get("https://example.com/file.tar.gz").unwrap();
        assert_eq!(response.body, b"tarball");
        assert_eq!(client.get("https://example.com/other").unwrap().status, 500);
        assert_eq!(client.get("https://elsewhere.org/").unwrap().status, 404);
        assert_eq!(client.requests().len(), 3);
    }

    #[test]
    fn test_fake_registry_normalizes_names() {
        let registry = FakeRegistry::new().with_versions(Ecosystem::Pip, "Typing_Extensions", &["4.9.0"]);
        let query = PackageQuery {
            ecosystem: Ecosystem::Pip,
            name: "typing-extensions",
            repository: None,
        };
        assert_eq!(registry.available_versions(&query).unwrap(), vec!["4.9.0"]);
        assert_eq!(registry.calls().load(Ordering::SeqCst), 1);
        assert_eq!(registry.lookups(), vec!["typing-extensions"]);
    }

    #[test]
    fn test_fake_probe_unknown_repository() {
        let probe = FakeProbe::new().with_tags("https://github.com/psf/requests", &["v1.0.0"]);
        let known = Url::parse("https://github.com/psf/requests").unwrap();
        let unknown = Url::parse("https://github.com/psf/nope").unwrap();
        assert_eq!(probe.list_tags(&known).unwrap().unwrap(), vec!["v1.0.0"]);
        assert_eq!(probe.list_tags(&unknown).unwrap(), None);
    }

    #[test]
    fn test_assertions() {
        use assertions::*;

        let ok_result: Result<i32, &str> = Ok(42);
        assert_eq!(assert_ok(ok_result), 42);

        let err_result: Result<i32, &str> = Err("error");
        assert_eq!(assert_err(err_result), "error");
    }
}
