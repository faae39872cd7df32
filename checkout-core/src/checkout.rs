//! Checkout orchestration
//!
//! A run is strictly sequential:
//! 1. log the resolved configuration and remote
//! 2. prepare SSH (when a key is configured) and the safe directory
//! 3. clone or update depending on [`WorkdirState`]
//! 4. materialize submodules and LFS content
//! 5. persist or strip credentials
//! 6. report commit and branch

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use crate::config::{CheckoutConfig, CiEnvironment};
use crate::git::Git;
use crate::output::CheckoutOutcome;
use crate::remote::RemoteUrl;
use crate::workdir::{self, WorkdirState};
use crate::{credentials, materialize, ssh, Error, Result};

/// Everything a run needs from its surroundings
///
/// Steps read the workspace, home directory and git runner from here instead
/// of from process-global state; the working directory is never changed.
#[derive(Debug, Clone)]
pub struct CheckoutContext {
    /// Root that relative checkout paths are resolved against
    pub workspace: PathBuf,
    /// Home of the invoking user (`.ssh`, `.git-credentials`)
    pub home: PathBuf,
    /// File receiving `key=value` outputs
    pub output: Option<PathBuf>,
    /// Runner for git commands
    pub git: Git,
}

impl CheckoutContext {
    pub fn new(workspace: impl Into<PathBuf>, home: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            home: home.into(),
            output: None,
            git: Git::new(),
        }
    }

    /// Context for the current process: CI workspace (or cwd) and user home
    pub fn from_environment(env: &CiEnvironment) -> Result<Self> {
        let workspace = match &env.workspace {
            Some(workspace) => workspace.clone(),
            None => std::env::current_dir()?,
        };
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

        Ok(Self::new(workspace, home).with_output(env.output.clone()))
    }

    pub fn with_output(mut self, output: Option<PathBuf>) -> Self {
        self.output = output;
        self
    }

    pub fn with_git(mut self, git: Git) -> Self {
        self.git = git;
        self
    }

    /// Absolute checkout path for a configured (possibly relative) path
    pub fn checkout_path(&self, path: &Path) -> PathBuf {
        self.workspace
            .join(path)
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect()
    }
}

/// One checkout run
#[derive(Debug)]
pub struct Checkout {
    ctx: CheckoutContext,
    config: CheckoutConfig,
}

impl Checkout {
    pub fn new(ctx: CheckoutContext, config: CheckoutConfig) -> Self {
        Self { ctx, config }
    }

    /// Absolute path the repository ends up in
    pub fn path(&self) -> PathBuf {
        self.ctx.checkout_path(&self.config.path)
    }

    /// Execute every step and report the result
    pub fn run(mut self) -> Result<CheckoutOutcome> {
        self.config.log_summary();

        let remote = RemoteUrl::resolve(&self.config);
        info!(protocol = %remote.protocol(), "Remote URL: {}", remote.masked());
        if let Some(token) = &self.config.token {
            self.ctx.git.redact(token.clone());
        }

        let path = self.path();
        fs::create_dir_all(&path)
            .map_err(|e| Error::Other(format!("Failed to create {}: {}", path.display(), e)))?;

        if let Some(setup) = ssh::prepare(&self.ctx.home, &self.config)? {
            self.ctx.git.set_env("GIT_SSH_COMMAND", setup.ssh_command());
        }

        if self.config.set_safe_directory {
            add_safe_directory(&self.ctx.git, &path)?;
        }

        let git = &self.ctx.git;
        match WorkdirState::detect(&path) {
            WorkdirState::Existing => workdir::update_existing(git, &self.config, &remote, &path)?,
            WorkdirState::Absent => workdir::clone_fresh(git, &self.config, &remote, &path)?,
        }

        materialize::update_submodules(git, &self.config, &path)?;
        materialize::pull_lfs(git, &self.config, &path)?;

        credentials::finalize(git, &self.ctx.home, &self.config, &remote, &path)?;

        let outcome = CheckoutOutcome::inspect(&path)?;
        outcome.report(self.ctx.output.as_deref());
        Ok(outcome)
    }
}

/// Add `path` to the global `safe.directory` list unless already there
fn add_safe_directory(git: &Git, path: &Path) -> Result<()> {
    let entry = path.display().to_string();

    // `--get-all` exits non-zero when the key is unset
    let existing = match git.run(path, ["config", "--global", "--get-all", "safe.directory"]) {
        Ok(existing) => existing,
        Err(Error::Git { .. }) => String::new(),
        Err(e) => return Err(e),
    };
    if existing.lines().any(|l| l == entry) {
        debug!(path = %entry, "Already a safe directory");
        return Ok(());
    }

    info!(path = %entry, "Marking checkout path as safe directory");
    git.run(path, ["config", "--global", "--add", "safe.directory", entry.as_str()])?;
    Ok(())
}
