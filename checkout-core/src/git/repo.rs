//! Read-only repository inspection

use std::path::{Path, PathBuf};

use git2::Repository;

use crate::{Error, Result};

/// Branch reported when HEAD is detached
pub const DETACHED_BRANCH: &str = "HEAD";

/// A checked-out repository, opened through libgit2
pub struct GitRepo {
    repo: Repository,
    root: PathBuf,
}

impl std::fmt::Debug for GitRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepo")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl GitRepo {
    /// Open the repository whose working tree is exactly `path`
    ///
    /// Unlike discovery, this never walks up into an enclosing repository.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let repo = Repository::open(path).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                Error::Config(format!("Not a git repository: {}", path.display()))
            } else {
                Error::Git2(e)
            }
        })?;

        let root = repo
            .workdir()
            .ok_or_else(|| Error::Config("Bare repositories are not supported".to_string()))?
            .to_path_buf();

        Ok(Self { repo, root })
    }

    /// Whether `path` holds repository metadata of its own
    pub fn has_metadata(path: impl AsRef<Path>) -> bool {
        path.as_ref().join(".git").exists()
    }

    /// Full hash of the commit HEAD points at, if any
    pub fn head_commit(&self) -> Result<Option<String>> {
        let head = match self.repo.head() {
            Ok(h) => h,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(Error::Git2(e)),
        };

        Ok(head.peel_to_commit().ok().map(|c| c.id().to_string()))
    }

    /// Get the current branch name
    ///
    /// Returns `None` for a detached HEAD.
    pub fn current_branch(&self) -> Result<Option<String>> {
        if self.repo.head_detached()? {
            return Ok(None);
        }

        let head = match self.repo.head() {
            Ok(h) => h,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => {
                // Unborn: the branch name is only in the symbolic HEAD
                let head = self.repo.find_reference("HEAD")?;
                return Ok(head
                    .symbolic_target()
                    .and_then(|t| t.strip_prefix("refs/heads/"))
                    .map(String::from));
            }
            Err(e) => return Err(Error::Git2(e)),
        };

        Ok(head.shorthand().map(String::from))
    }

    /// Whether a remote with this name is configured
    pub fn has_remote(&self, name: &str) -> Result<bool> {
        let remotes = self.repo.remotes()?;
        Ok(remotes.iter().flatten().any(|r| r == name))
    }

    /// Whether `origin/<branch>` exists as a remote-tracking reference
    pub fn has_remote_branch(&self, remote: &str, branch: &str) -> bool {
        self.repo
            .find_reference(&format!("refs/remotes/{}/{}", remote, branch))
            .is_ok()
    }

    /// Whether the object database already holds this commit
    pub fn has_commit(&self, sha: &str) -> bool {
        git2::Oid::from_str(sha)
            .ok()
            .and_then(|oid| self.repo.find_commit(oid).ok())
            .is_some()
    }
}
