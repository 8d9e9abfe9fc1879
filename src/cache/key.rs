//! Cache keys and their on-disk paths.

use std::fmt;
use std::path::PathBuf;

use crate::core::{Ecosystem, ResolvedDependency};

/// Identifies one cached dependency: `(ecosystem, name, version)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    ecosystem: Ecosystem,
    name: String,
    version: String,
}

impl CacheKey {
    /// Create a key. The name is normalized for the ecosystem so that
    /// equivalent spellings share an entry.
    pub fn new(ecosystem: Ecosystem, name: &str, version: &str) -> Self {
        CacheKey {
            ecosystem,
            name: ecosystem.normalize_name(name),
            version: version.trim().to_string(),
        }
    }

    pub fn for_resolved(resolved: &ResolvedDependency) -> Self {
        CacheKey::new(
            resolved.ecosystem(),
            resolved.name(),
            resolved.version().as_str(),
        )
    }

    pub fn ecosystem(&self) -> Ecosystem {
        self.ecosystem
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Path of the entry relative to the cache root.
    ///
    /// Components are percent-encoded so that distinct keys map to distinct
    /// paths and no key can leave the cache root.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.ecosystem.as_str())
            .join(encode_component(&self.name))
            .join(encode_component(&self.version))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.ecosystem, self.name, self.version)
    }
}

/// Percent-encode a path component.
///
/// Bytes outside `[A-Za-z0-9._+@-]` are encoded, and so are components made
/// only of dots. The empty string becomes `%`, which no encoding produces.
pub(crate) fn encode_component(s: &str) -> String {
    if s.is_empty() {
        return String::from("%");
    }
    if s.chars().all(|c| c == '.') {
        return "%2E".repeat(s.len());
    }

    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'+' | b'@' | b'-') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Component, Path};

    #[test]
    fn test_relative_path() {
        let key = CacheKey::new(Ecosystem::Pip, "Requests", "2.31.0");
        assert_eq!(key.relative_path(), Path::new("pip/requests/2.31.0"));
        assert_eq!(key.to_string(), "pip/requests@2.31.0");
    }

    #[test]
    fn test_scoped_npm_name_stays_one_component() {
        let key = CacheKey::new(Ecosystem::Npm, "@types/node", "20.1.0");
        assert_eq!(key.relative_path(), Path::new("npm/@types%2Fnode/20.1.0"));
    }

    #[test]
    fn test_dot_components_are_encoded() {
        let key = CacheKey::new(Ecosystem::Npm, "..", ".");
        let path = key.relative_path();
        assert!(path
            .components()
            .all(|c| matches!(c, Component::Normal(_))));
        assert_eq!(path, Path::new("npm/%2E%2E/%2E"));
    }

    #[test]
    fn test_distinct_keys_distinct_paths() {
        let a = CacheKey::new(Ecosystem::Npm, "a/b", "1.0.0");
        let b = CacheKey::new(Ecosystem::Npm, "a%2Fb", "1.0.0");
        assert_ne!(a.relative_path(), b.relative_path());
        assert_eq!(encode_component("a%2Fb"), "a%252Fb");
    }

    #[test]
    fn test_equivalent_pip_spellings_share_key() {
        assert_eq!(
            CacheKey::new(Ecosystem::Pip, "Typing_Extensions", "4.9.0"),
            CacheKey::new(Ecosystem::Pip, "typing-extensions", "4.9.0")
        );
    }
}
