//! npm registry packuments.

use serde_json::Value;
use url::Url;

use crate::ecosystems::npm::repository_field;
use crate::sources::RepositoryMetadata;

/// Packument URL; the slash of a scoped name is encoded.
pub(crate) fn packument_url(base: &str, name: &str) -> String {
    format!("{}/{}", base, name.replace('/', "%2F"))
}

pub(crate) fn versions(doc: &Value) -> Vec<String> {
    doc.get("versions")
        .and_then(Value::as_object)
        .map(|versions| versions.keys().cloned().collect())
        .unwrap_or_default()
}

/// Repository and tarball of one version, or `None` if it was never published.
pub(crate) fn release_metadata(doc: &Value, version: &str) -> Option<RepositoryMetadata> {
    let release = doc.get("versions")?.get(version)?;

    let repositories = repository_field(release)
        .or_else(|| repository_field(doc))
        .into_iter()
        .collect();

    let archive_url = release
        .get("dist")
        .and_then(|d| d.get("tarball"))
        .and_then(Value::as_str)
        .and_then(|u| Url::parse(u).ok());

    Some(RepositoryMetadata {
        repositories,
        archive_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packument_url() {
        assert_eq!(
            packument_url("https://registry.npmjs.org", "@types/node"),
            "https://registry.npmjs.org/@types%2Fnode"
        );
        assert_eq!(
            packument_url("https://registry.npmjs.org", "express"),
            "https://registry.npmjs.org/express"
        );
    }

    #[test]
    fn test_unknown_version() {
        let doc = serde_json::json!({ "versions": { "1.0.0": {} } });
        assert!(release_metadata(&doc, "2.0.0").is_none());
        assert!(release_metadata(&doc, "1.0.0").unwrap().repositories.is_empty());
    }
}
