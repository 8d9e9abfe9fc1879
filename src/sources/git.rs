//! Git remotes: tag listing and single-reference checkouts.

use std::path::Path;

use git2::{build::CheckoutBuilder, AutotagOption, ErrorClass, ErrorCode, FetchOptions, Oid, Repository};
use url::Url;

use crate::core::{GitReference, SourceLocation};
use crate::sources::{ContentFetcher, RepositoryProbe, SourceError};

/// Lists tags of remote repositories without cloning them.
#[derive(Debug, Default, Clone)]
pub struct GitProbe;

impl GitProbe {
    pub fn new() -> Self {
        GitProbe
    }
}

impl RepositoryProbe for GitProbe {
    fn list_tags(&self, url: &Url) -> Result<Option<Vec<String>>, SourceError> {
        tracing::debug!("listing tags of {}", url);

        let mut remote = match git2::Remote::create_detached(url.as_str()) {
            Ok(remote) => remote,
            Err(e) => return Err(SourceError::Invalid(format!("{}: {}", url, e.message()))),
        };

        if let Err(e) = remote.connect(git2::Direction::Fetch) {
            return match classify(url, &e) {
                SourceError::NotFound(_) => Ok(None),
                other => Err(other),
            };
        }

        let heads = remote.list().map_err(|e| classify(url, &e))?;
        let mut tags: Vec<String> = heads
            .iter()
            .filter_map(|head| head.name().strip_prefix("refs/tags/"))
            .map(|tag| tag.trim_end_matches("^{}").to_string())
            .collect();
        tags.sort();
        tags.dedup();

        // Dropping the remote disconnects; a failed disconnect is not interesting
        let _ = remote.disconnect();
        Ok(Some(tags))
    }
}

/// Checks out exactly one reference of a repository, without history.
#[derive(Debug, Default, Clone)]
pub struct GitFetcher;

impl GitFetcher {
    pub fn new() -> Self {
        GitFetcher
    }

    /// Fetch `reference` of `url` and check it out into `dest`.
    pub fn checkout(&self, url: &Url, reference: &GitReference, dest: &Path) -> Result<(), SourceError> {
        tracing::info!("Fetching {} ({})", url, reference);

        let repo = Repository::init(dest)
            .map_err(|e| SourceError::Invalid(format!("failed to init {}: {}", dest.display(), e.message())))?;
        let result = fetch_into(&repo, url, reference);
        drop(repo);

        // Only the checked-out tree is kept
        let git_dir = dest.join(".git");
        if git_dir.exists() {
            std::fs::remove_dir_all(&git_dir).map_err(|e| {
                SourceError::Invalid(format!("failed to remove {}: {}", git_dir.display(), e))
            })?;
        }
        result
    }
}

impl ContentFetcher for GitFetcher {
    fn fetch(&self, location: &SourceLocation, dest: &Path) -> Result<(), SourceError> {
        match (location.repository(), location.reference()) {
            (Some(url), Some(reference)) => self.checkout(url, reference, dest),
            _ => Err(SourceError::Invalid(format!("{} is not a git location", location))),
        }
    }
}

fn fetch_into(repo: &Repository, url: &Url, reference: &GitReference) -> Result<(), SourceError> {
    let mut remote = repo
        .remote_anonymous(url.as_str())
        .map_err(|e| SourceError::Invalid(format!("{}: {}", url, e.message())))?;

    let full_rev = match reference {
        GitReference::Rev(rev) if rev.len() == 40 => Oid::from_str(rev).ok(),
        _ => None,
    };

    let refspec = match reference {
        GitReference::DefaultBranch => "HEAD".to_string(),
        GitReference::Branch(branch) => format!("+refs/heads/{0}:refs/remotes/origin/{0}", branch),
        GitReference::Tag(tag) => format!("+refs/tags/{0}:refs/tags/{0}", tag),
        GitReference::Rev(rev) => match full_rev {
            Some(_) => rev.clone(),
            // Abbreviated revisions need the branch history to be resolved
            None => "+refs/heads/*:refs/remotes/origin/*".to_string(),
        },
    };

    let mut options = FetchOptions::new();
    options.download_tags(AutotagOption::None);
    // The local transport does not support shallow fetches
    let shallow = url.scheme() != "file" && !matches!(reference, GitReference::Rev(_) if full_rev.is_none());
    if shallow {
        options.depth(1);
    }

    remote
        .fetch(&[refspec.as_str()], Some(&mut options), None)
        .map_err(|e| classify(url, &e))?;

    let commit = match (reference, full_rev) {
        (GitReference::Rev(_), Some(oid)) => repo.find_commit(oid),
        (GitReference::Rev(rev), None) => repo
            .revparse_single(rev)
            .and_then(|object| object.peel_to_commit()),
        _ => repo
            .find_reference("FETCH_HEAD")
            .and_then(|head| head.peel_to_commit()),
    }
    .map_err(|e| SourceError::NotFound(format!("{} in {}: {}", reference, url, e.message())))?;

    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.checkout_tree(commit.as_object(), Some(&mut checkout))
        .map_err(|e| SourceError::Invalid(format!("checkout of {} failed: {}", reference, e.message())))?;
    repo.set_head_detached(commit.id())
        .map_err(|e| SourceError::Invalid(e.message().to_string()))?;

    tracing::debug!("checked out {} at {}", reference, commit.id());
    Ok(())
}

/// Map a libgit2 error onto the capability error kinds.
///
/// Hosts answer anonymous requests for missing repositories with an
/// authentication challenge, so authentication failures count as not found.
fn classify(url: &Url, e: &git2::Error) -> SourceError {
    let message = format!("{}: {}", url, e.message());
    let lower = e.message().to_ascii_lowercase();

    if e.code() == ErrorCode::NotFound
        || e.code() == ErrorCode::Auth
        || lower.contains("404")
        || lower.contains("not found")
        || lower.contains("couldn't find remote ref")
        || lower.contains("authentication")
    {
        return SourceError::NotFound(message);
    }

    match e.class() {
        ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssh | ErrorClass::Ssl | ErrorClass::Os => {
            SourceError::Transport(message)
        }
        _ => SourceError::Invalid(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// A repository with one commit tagged `v1.0.0` and a second on top.
    fn upstream() -> (TempDir, Url, String) {
        let tmp = TempDir::new().unwrap();
        let repo = Repository::init(tmp.path()).unwrap();
        let sig = git2::Signature::now("Test", "test@example.com").unwrap();

        let commit = |message: &str, content: &str| {
            std::fs::write(tmp.path().join("README.md"), content).unwrap();
            let mut index = repo.index().unwrap();
            index.add_path(Path::new("README.md")).unwrap();
            index.write().unwrap();
            let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
            let parents = match repo.head() {
                Ok(head) => vec![head.peel_to_commit().unwrap()],
                Err(_) => Vec::new(),
            };
            let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
            repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
                .unwrap()
        };

        let first = commit("first", "version one");
        let object = repo.find_object(first, None).unwrap();
        repo.tag_lightweight("v1.0.0", &object, false).unwrap();
        commit("second", "version two");

        let url = Url::from_directory_path(tmp.path()).unwrap();
        (tmp, url, first.to_string())
    }

    #[test]
    fn test_list_tags() {
        let (_tmp, url, _) = upstream();
        let tags = GitProbe::new().list_tags(&url).unwrap().unwrap();
        assert_eq!(tags, vec!["v1.0.0".to_string()]);
    }

    #[test]
    fn test_checkout_tag_without_git_dir() {
        let (_tmp, url, _) = upstream();
        let dest = TempDir::new().unwrap();

        let location = SourceLocation::git(url, GitReference::Tag("v1.0.0".into()));
        GitFetcher::new().fetch(&location, dest.path()).unwrap();

        let readme = std::fs::read_to_string(dest.path().join("README.md")).unwrap();
        assert_eq!(readme, "version one");
        assert!(!dest.path().join(".git").exists());
    }

    #[test]
    fn test_checkout_abbreviated_revision() {
        let (_tmp, url, first) = upstream();
        let dest = TempDir::new().unwrap();

        GitFetcher::new()
            .checkout(&url, &GitReference::Rev(first[..10].to_string()), dest.path())
            .unwrap();
        let readme = std::fs::read_to_string(dest.path().join("README.md")).unwrap();
        assert_eq!(readme, "version one");
    }

    #[test]
    fn test_missing_tag_fails_and_cleans_up() {
        let (_tmp, url, _) = upstream();
        let dest = TempDir::new().unwrap();

        let result = GitFetcher::new().checkout(&url, &GitReference::Tag("v9.9.9".into()), dest.path());
        assert!(result.is_err());
        assert!(!dest.path().join(".git").exists());
    }

    #[test]
    fn test_archive_location_rejected() {
        let dest = TempDir::new().unwrap();
        let location = SourceLocation::archive(Url::parse("https://example.com/a.tar.gz").unwrap());
        let err = GitFetcher::new().fetch(&location, dest.path()).unwrap_err();
        assert!(matches!(err, SourceError::Invalid(_)));
    }
}
