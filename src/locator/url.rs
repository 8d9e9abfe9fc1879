//! Repository URL normalization and naming conventions.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::core::Ecosystem;

/// Hosts whose URLs are known to name git repositories.
const GIT_HOSTS: [&str; 4] = ["github.com", "gitlab.com", "bitbucket.org", "codeberg.org"];

/// Path segments that start a deep link below the repository root.
const DEEP_LINK_SEGMENTS: [&str; 8] = [
    "-", "tree", "blob", "issues", "releases", "wiki", "pulls", "commits",
];

/// `owner/repo` shorthand.
static SHORTHAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+$").expect("valid regex"));

/// Normalize a published repository URL to the repository root.
///
/// Returns `None` for anything that does not look like a git repository:
/// documentation sites, bug trackers on unknown hosts, local paths.
pub fn normalize_repository_url(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    let raw = raw.strip_prefix("git+").unwrap_or(raw);

    let expanded = if let Some(rest) = raw.strip_prefix("github:") {
        format!("https://github.com/{}", rest)
    } else if let Some(rest) = raw.strip_prefix("gitlab:") {
        format!("https://gitlab.com/{}", rest)
    } else if let Some(rest) = raw.strip_prefix("bitbucket:") {
        format!("https://bitbucket.org/{}", rest)
    } else if !raw.contains("://") {
        match raw.split_once(':') {
            // scp-like `git@github.com:owner/repo.git`
            Some((user_host, path)) if user_host.contains('@') => {
                let host = user_host.rsplit('@').next()?;
                format!("https://{}/{}", host, path)
            }
            _ if SHORTHAND.is_match(raw) => format!("https://github.com/{}", raw),
            _ => return None,
        }
    } else {
        raw.to_string()
    };

    let url = Url::parse(&expanded).ok()?;
    if !matches!(url.scheme(), "https" | "http" | "git" | "ssh") {
        return None;
    }

    let host = url.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    if GIT_HOSTS.contains(&host.as_str()) {
        let mut root: Vec<&str> = segments
            .iter()
            .copied()
            .take_while(|seg| !DEEP_LINK_SEGMENTS.contains(seg))
            .collect();
        // gitlab allows nested groups; the others are strictly owner/repo
        if host != "gitlab.com" {
            root.truncate(2);
        }
        if root.len() < 2 {
            return None;
        }
        let last = root.len() - 1;
        root[last] = root[last].strip_suffix(".git").unwrap_or(root[last]);
        return Url::parse(&format!("https://{}/{}", host, root.join("/"))).ok();
    }

    if segments.last().is_some_and(|seg| seg.ends_with(".git")) {
        let scheme = if url.scheme() == "http" { "http" } else { "https" };
        let port = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
        return Url::parse(&format!("{}://{}{}/{}", scheme, host, port, segments.join("/"))).ok();
    }

    None
}

/// Default convention templates for an ecosystem.
pub fn default_conventions(ecosystem: Ecosystem) -> Vec<String> {
    match ecosystem {
        Ecosystem::Pip => vec!["https://github.com/{name}/{name}".into()],
        Ecosystem::Npm => vec![
            "https://github.com/{scope}/{bare}".into(),
            "https://github.com/{name}/{name}".into(),
        ],
        Ecosystem::Swift => Vec::new(),
    }
}

/// Expand convention templates for a package name.
///
/// Templates using `{scope}` or `{bare}` apply to scoped npm names
/// (`@scope/bare`); templates using `{name}` apply to unscoped names.
pub fn expand_conventions(templates: &[String], name: &str) -> Vec<Url> {
    let scoped = name
        .strip_prefix('@')
        .and_then(|rest| rest.split_once('/'));

    templates
        .iter()
        .filter_map(|template| {
            let uses_scope = template.contains("{scope}") || template.contains("{bare}");
            let expanded = match (scoped, uses_scope) {
                (Some((scope, bare)), true) => {
                    template.replace("{scope}", scope).replace("{bare}", bare)
                }
                (None, false) => template.replace("{name}", name),
                _ => return None,
            };
            normalize_repository_url(&expanded)
        })
        .collect()
}
