//! Matching release versions to repository tags.

use semver::Version;

use crate::resolver::VersionScheme;

/// Tag patterns tried before fuzzy matching.
pub const DEFAULT_TAG_PATTERNS: [&str; 6] = [
    "{version}",
    "v{version}",
    "release-{version}",
    "{name}-{version}",
    "{name}@{version}",
    "{name}-v{version}",
];

/// Characters after which a version may start inside a tag.
const VERSION_PREFIX_ENDS: [char; 6] = ['-', '_', '@', '/', 'v', 'V'];

/// How tags are matched against a version.
#[derive(Debug, Clone)]
pub struct TagPolicy {
    patterns: Vec<String>,
}

impl Default for TagPolicy {
    fn default() -> Self {
        TagPolicy::new(DEFAULT_TAG_PATTERNS.iter().map(|p| p.to_string()).collect())
    }
}

impl TagPolicy {
    /// Policy with custom patterns; an empty list means the defaults.
    pub fn new(patterns: Vec<String>) -> Self {
        if patterns.is_empty() {
            return TagPolicy {
                patterns: DEFAULT_TAG_PATTERNS.iter().map(|p| p.to_string()).collect(),
            };
        }
        TagPolicy { patterns }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Find the tag naming `version` of package `name`.
    ///
    /// Patterns are tried in order first. Failing that, any tag whose
    /// remainder after a prefix parses to the same version matches; among
    /// several, the shortest wins, then the lexicographically smallest.
    pub fn find_tag(
        &self,
        name: &str,
        raw_version: &str,
        version: Option<&Version>,
        scheme: VersionScheme,
        tags: &[String],
    ) -> Option<String> {
        for pattern in &self.patterns {
            let candidate = expand_pattern(pattern, name, raw_version);
            if tags.iter().any(|t| *t == candidate) {
                return Some(candidate);
            }
        }

        let version = version?;
        tags.iter()
            .filter(|tag| tag_names_version(tag, version, scheme))
            .min_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
            .cloned()
    }
}

/// Substitute `{name}` and `{version}` into a tag pattern.
pub fn expand_pattern(pattern: &str, name: &str, version: &str) -> String {
    pattern.replace("{name}", name).replace("{version}", version)
}

/// Whether some suffix of `tag` parses to exactly `version`.
fn tag_names_version(tag: &str, version: &Version, scheme: VersionScheme) -> bool {
    let chars: Vec<(usize, char)> = tag.char_indices().collect();
    chars.iter().enumerate().any(|(i, &(offset, c))| {
        if !c.is_ascii_digit() {
            return false;
        }
        let starts_version = i == 0 || VERSION_PREFIX_ENDS.contains(&chars[i - 1].1);
        starts_version && scheme.parse(&tag[offset..]).as_ref() == Some(version)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    fn find(policy: &TagPolicy, name: &str, raw: &str, scheme: VersionScheme, list: &[&str]) -> Option<String> {
        let version = scheme.parse(raw);
        policy.find_tag(name, raw, version.as_ref(), scheme, &tags(list))
    }

    #[test]
    fn test_patterns_in_order() {
        let policy = TagPolicy::default();
        assert_eq!(
            find(&policy, "requests", "2.31.0", VersionScheme::Pep440, &["2.31.0", "v2.31.0"]),
            Some("2.31.0".into())
        );
        assert_eq!(
            find(&policy, "requests", "2.31.0", VersionScheme::Pep440, &["v2.31.0", "v2.30.0"]),
            Some("v2.31.0".into())
        );
        assert_eq!(
            find(&policy, "core", "7.23.0", VersionScheme::Semver, &["core@7.23.0"]),
            Some("core@7.23.0".into())
        );
    }

    #[test]
    fn test_fuzzy_match() {
        let policy = TagPolicy::default();
        // pip spelling `1.26` matches a `1.26.0` tag
        assert_eq!(
            find(&policy, "numpy", "1.26", VersionScheme::Pep440, &["v1.26.0", "v1.25.0"]),
            Some("v1.26.0".into())
        );
        assert_eq!(
            find(&policy, "base64", "1.0.0", VersionScheme::Semver, &["base64-js-1.0.0"]),
            Some("base64-js-1.0.0".into())
        );
    }

    #[test]
    fn test_fuzzy_tie_break() {
        let policy = TagPolicy::new(vec!["nothing-{version}".into()]);
        assert_eq!(
            find(&policy, "pkg", "1.2.3", VersionScheme::Semver, &["release/v1.2.3", "pkg_1.2.3", "r-1.2.3"]),
            Some("r-1.2.3".into())
        );
        assert_eq!(
            find(&policy, "pkg", "1.2.3", VersionScheme::Semver, &["b-1.2.3", "a-1.2.3"]),
            Some("a-1.2.3".into())
        );
    }

    #[test]
    fn test_no_partial_digit_matches() {
        let policy = TagPolicy::new(vec!["x".into()]);
        assert_eq!(
            find(&policy, "pkg", "1.2.3", VersionScheme::Semver, &["11.2.3", "v1.2.30", "v1.2.3-rc.1"]),
            None
        );
    }

    #[test]
    fn test_empty_patterns_mean_defaults() {
        assert_eq!(TagPolicy::new(Vec::new()).patterns().len(), DEFAULT_TAG_PATTERNS.len());
    }
}
