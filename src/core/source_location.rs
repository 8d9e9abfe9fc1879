//! Upstream source locations.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// Git reference specification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GitReference {
    /// Default branch (usually main/master)
    DefaultBranch,
    /// Specific branch
    Branch(String),
    /// Specific tag
    Tag(String),
    /// Specific revision (commit hash)
    Rev(String),
}

impl fmt::Display for GitReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GitReference::DefaultBranch => write!(f, "default branch"),
            GitReference::Branch(b) => write!(f, "branch {}", b),
            GitReference::Tag(t) => write!(f, "tag {}", t),
            GitReference::Rev(r) => write!(f, "rev {}", r),
        }
    }
}

/// Where the content of one resolved dependency can be fetched from.
///
/// Always holds either a repository with a reference, or an archive URL, or
/// both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawSourceLocation")]
pub struct SourceLocation {
    repository: Option<Url>,
    reference: Option<GitReference>,
    archive: Option<Url>,
}

#[derive(Deserialize)]
struct RawSourceLocation {
    repository: Option<Url>,
    reference: Option<GitReference>,
    archive: Option<Url>,
}

impl TryFrom<RawSourceLocation> for SourceLocation {
    type Error = String;

    fn try_from(raw: RawSourceLocation) -> Result<Self, Self::Error> {
        SourceLocation::new(raw.repository, raw.reference, raw.archive)
    }
}

impl SourceLocation {
    /// Build a location, rejecting combinations that name nothing fetchable.
    pub fn new(
        repository: Option<Url>,
        reference: Option<GitReference>,
        archive: Option<Url>,
    ) -> Result<Self, String> {
        let has_git = repository.is_some() && reference.is_some();
        if !has_git && archive.is_none() {
            return Err(
                "a source location needs a repository with a reference or an archive URL".into(),
            );
        }
        Ok(SourceLocation {
            repository,
            reference,
            archive,
        })
    }

    /// A git repository at a reference.
    pub fn git(repository: Url, reference: GitReference) -> Self {
        SourceLocation {
            repository: Some(repository),
            reference: Some(reference),
            archive: None,
        }
    }

    /// A source archive only.
    pub fn archive(url: Url) -> Self {
        SourceLocation {
            repository: None,
            reference: None,
            archive: Some(url),
        }
    }

    /// Add an archive URL used when the git fetch fails.
    pub fn with_archive(mut self, url: Option<Url>) -> Self {
        if url.is_some() {
            self.archive = url;
        }
        self
    }

    pub fn repository(&self) -> Option<&Url> {
        self.repository.as_ref()
    }

    /// The git reference, present only together with a repository.
    pub fn reference(&self) -> Option<&GitReference> {
        self.repository.as_ref().and(self.reference.as_ref())
    }

    pub fn archive_url(&self) -> Option<&Url> {
        self.archive.as_ref()
    }

    /// Short human-readable description.
    pub fn describe(&self) -> String {
        match (self.repository.as_ref(), self.reference.as_ref()) {
            (Some(repo), Some(reference)) => format!("{} ({})", repo, reference),
            _ => match self.archive.as_ref() {
                Some(archive) => archive.to_string(),
                None => String::from("<nowhere>"),
            },
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}
