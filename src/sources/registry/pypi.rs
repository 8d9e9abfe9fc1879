//! PyPI JSON API documents.

use serde_json::Value;
use url::Url;

use crate::sources::RepositoryMetadata;

/// `project_urls` labels that point at source code, most specific first.
const SOURCE_LABELS: [&str; 4] = ["source", "repository", "code", "homepage"];

pub(crate) fn project_url(base: &str, name: &str) -> String {
    format!("{}/pypi/{}/json", base, name)
}

pub(crate) fn release_url(base: &str, name: &str, version: &str) -> String {
    format!("{}/pypi/{}/{}/json", base, name, version)
}

/// Versions with at least one file that has not been yanked.
pub(crate) fn release_versions(doc: &Value) -> Vec<String> {
    let Some(releases) = doc.get("releases").and_then(Value::as_object) else {
        return Vec::new();
    };

    releases
        .iter()
        .filter(|(_, files)| {
            files.as_array().is_some_and(|files| {
                files
                    .iter()
                    .any(|f| !f.get("yanked").and_then(Value::as_bool).unwrap_or(false))
            })
        })
        .map(|(version, _)| version.clone())
        .collect()
}

/// Repository links and the sdist of one release.
pub(crate) fn release_metadata(doc: &Value) -> RepositoryMetadata {
    let info = doc.get("info");
    let mut repositories = Vec::new();

    let project_urls: Vec<(String, String)> = info
        .and_then(|i| i.get("project_urls"))
        .and_then(Value::as_object)
        .map(|urls| {
            urls.iter()
                .filter_map(|(label, url)| Some((label.to_ascii_lowercase(), url.as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default();

    for wanted in SOURCE_LABELS {
        for (label, url) in &project_urls {
            if label.contains(wanted) && !repositories.contains(url) {
                repositories.push(url.clone());
            }
        }
    }
    if let Some(home_page) = info.and_then(|i| i.get("home_page")).and_then(Value::as_str) {
        if !home_page.is_empty() && !repositories.iter().any(|r| r == home_page) {
            repositories.push(home_page.to_string());
        }
    }
    // Unlabelled links may still point at a repository
    for (_, url) in project_urls {
        if !repositories.contains(&url) {
            repositories.push(url);
        }
    }

    let archive_url = doc
        .get("urls")
        .and_then(Value::as_array)
        .and_then(|files| {
            files
                .iter()
                .find(|f| f.get("packagetype").and_then(Value::as_str) == Some("sdist"))
        })
        .and_then(|f| f.get("url"))
        .and_then(Value::as_str)
        .and_then(|u| Url::parse(u).ok());

    RepositoryMetadata {
        repositories,
        archive_url,
    }
}
