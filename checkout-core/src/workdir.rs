//! Working-directory state machine
//!
//! A checkout path is either [`WorkdirState::Absent`] (missing, empty, or a
//! plain directory) or [`WorkdirState::Existing`] (holds repository metadata).
//! Absent paths are cloned into a staging directory and merged in; existing
//! repositories are cleaned, re-pointed, fetched, and switched in place.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, info};

use crate::config::{CheckoutConfig, FetchDepth};
use crate::error::best_effort;
use crate::git::{Git, GitRepo};
use crate::remote::RemoteUrl;
use crate::{Error, Result};

const REMOTE: &str = "origin";

/// Which path the checkout takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkdirState {
    /// No repository metadata at the checkout path
    Absent,
    /// The checkout path is already a repository
    Existing,
}

impl WorkdirState {
    /// Inspect the checkout path
    pub fn detect(path: &Path) -> Self {
        if GitRepo::has_metadata(path) {
            Self::Existing
        } else {
            Self::Absent
        }
    }
}

/// Arguments for `git clone`, without URL and destination
pub fn clone_args(config: &CheckoutConfig) -> Vec<String> {
    let mut args = vec!["clone".to_string()];
    args.extend(config.fetch_depth.arg());
    if let Some(git_ref) = &config.ref_name {
        args.push("--branch".to_string());
        args.push(git_ref.clone());
    }
    args
}

/// Arguments for refreshing `origin` in an existing repository
pub fn fetch_args(depth: FetchDepth) -> Vec<String> {
    let mut args = vec!["fetch".to_string()];
    args.extend(depth.arg());
    args.push(REMOTE.to_string());
    args
}

/// Bring an existing repository to the requested state
pub fn update_existing(
    git: &Git,
    config: &CheckoutConfig,
    remote: &RemoteUrl,
    path: &Path,
) -> Result<()> {
    info!(path = %path.display(), "Existing repository found, updating in place");
    let repo = GitRepo::open(path)?;

    if config.clean {
        info!("Cleaning working tree");
        git.run(path, ["clean", "-ffdx"])?;
        if repo.head_commit()?.is_some() {
            git.run(path, ["reset", "--hard", "HEAD"])?;
        }
    }

    if repo.has_remote(REMOTE)? {
        debug!("Updating remote {}", REMOTE);
        git.run(path, ["remote", "set-url", REMOTE, remote.as_str()])?;
    } else {
        debug!("Adding remote {}", REMOTE);
        git.run(path, ["remote", "add", REMOTE, remote.as_str()])?;
    }

    info!(depth = %config.fetch_depth, "Fetching from {}", remote.masked());
    git.run(path, fetch_args(config.fetch_depth))?;

    if let Some(git_ref) = &config.ref_name {
        switch_ref(git, config, path, git_ref)?;
    }

    pin_commit(git, config, path)
}

/// Switch to `git_ref`, creating a tracking branch when only the remote has it
///
/// The trailing `--` keeps git from reading the ref as a pathspec. When neither
/// works the error of the tracking-branch creation propagates.
fn switch_ref(git: &Git, config: &CheckoutConfig, path: &Path, git_ref: &str) -> Result<()> {
    info!("Switching to {}", git_ref);

    if !git.succeeds(path, ["checkout", git_ref, "--"])? {
        info!("{} is not a local reference, creating tracking branch", git_ref);
        let upstream = format!("{}/{}", REMOTE, git_ref);
        git.run(path, ["checkout", "-b", git_ref, "--track", upstream.as_str()])?;
        return Ok(());
    }

    // A pre-existing local branch still points at the old tip
    let repo = GitRepo::open(path)?;
    if repo.current_branch()?.as_deref() == Some(git_ref) && repo.has_remote_branch(REMOTE, git_ref) {
        let upstream = format!("{}/{}", REMOTE, git_ref);
        if config.clean {
            git.run(path, ["reset", "--hard", upstream.as_str()])?;
        } else {
            git.run(path, ["merge", "--ff-only", upstream.as_str()])?;
        }
    }

    Ok(())
}

/// Clone into a staging directory, then merge its contents into `path`
pub fn clone_fresh(
    git: &Git,
    config: &CheckoutConfig,
    remote: &RemoteUrl,
    path: &Path,
) -> Result<()> {
    info!(path = %path.display(), "No repository found, cloning {}", remote.masked());

    fs::create_dir_all(path)
        .map_err(|e| Error::Other(format!("Failed to create {}: {}", path.display(), e)))?;

    let staging = staging_dir(path)?;
    debug!(staging = %staging.path().display(), "Cloning into staging directory");

    let mut args: Vec<OsString> = clone_args(config).into_iter().map(OsString::from).collect();
    args.push(remote.as_str().into());
    args.push(staging.path().into());
    git.run(path, args)?;

    let moved = move_contents(staging.path(), path)?;
    if moved == 0 {
        let kept = staging.into_path();
        return Err(Error::Other(format!(
            "Could not move the clone into {}; it was left in {}",
            path.display(),
            kept.display()
        )));
    }
    debug!(entries = moved, "Moved clone into place");
    best_effort("Removing staging directory", staging.close());

    pin_commit(git, config, path)
}

/// Hidden temporary directory inside `path`, on the same filesystem
fn staging_dir(path: &Path) -> Result<tempfile::TempDir> {
    tempfile::Builder::new()
        .prefix(".checkout-")
        .tempdir_in(path)
        .map_err(|e| Error::Other(format!("Failed to create staging directory: {}", e)))
}

/// Move every entry (hidden ones included) of `from` into `to`
///
/// Entries that cannot be moved are skipped with a warning. Returns the number
/// of entries moved.
pub fn move_contents(from: &Path, to: &Path) -> Result<usize> {
    let mut moved = 0;

    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        let step = format!("Moving {}", entry.file_name().to_string_lossy());

        if best_effort(&step, move_entry(&entry.path(), &target)).is_some() {
            moved += 1;
        }
    }

    Ok(moved)
}

/// Rename, or copy and remove when the target is free but rename fails
/// (e.g. across filesystems)
fn move_entry(source: &Path, target: &Path) -> io::Result<()> {
    match fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(_) if fs::symlink_metadata(target).is_err() => {
            copy_recursive(source, target)?;
            if fs::symlink_metadata(source)?.is_dir() {
                fs::remove_dir_all(source)
            } else {
                fs::remove_file(source)
            }
        }
        Err(e) => Err(e),
    }
}

fn copy_recursive(source: &Path, target: &Path) -> io::Result<()> {
    let file_type = fs::symlink_metadata(source)?.file_type();

    if file_type.is_symlink() {
        copy_symlink(source, target)
    } else if file_type.is_dir() {
        fs::create_dir(target)?;
        for entry in fs::read_dir(source)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &target.join(entry.file_name()))?;
        }
        Ok(())
    } else {
        fs::copy(source, target).map(|_| ())
    }
}

#[cfg(unix)]
fn copy_symlink(source: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(source)?, target)
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, target: &Path) -> io::Result<()> {
    fs::copy(source, target).map(|_| ())
}

/// Put HEAD on the pinned commit, fetching it when it is not present
fn pin_commit(git: &Git, config: &CheckoutConfig, path: &Path) -> Result<()> {
    let Some(sha) = &config.pin_commit else {
        return Ok(());
    };

    let repo = GitRepo::open(path)?;
    if repo.head_commit()?.as_deref() == Some(sha.as_str()) {
        return Ok(());
    }

    info!("Checking out commit {}", sha);
    if !repo.has_commit(sha) {
        let mut args = vec!["fetch".to_string()];
        if config.fetch_depth != FetchDepth::Full {
            args.push("--depth=1".to_string());
        }
        args.push(REMOTE.to_string());
        args.push(sha.clone());
        git.run(path, args)?;
    }

    git.run(path, ["checkout", sha.as_str()])?;
    Ok(())
}
