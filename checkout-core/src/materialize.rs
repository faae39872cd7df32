//! Submodule and LFS materialization
//!
//! Runs once the tree is on its final commit. Either step can take far longer
//! than the checkout itself; no timeout is applied here.

use std::path::Path;

use tracing::info;

use crate::config::{CheckoutConfig, SubmoduleMode};
use crate::git::Git;
use crate::Result;

/// Arguments for `git submodule`, or `None` when submodules are disabled
pub fn submodule_args(mode: SubmoduleMode) -> Option<Vec<&'static str>> {
    match mode {
        SubmoduleMode::Disabled => None,
        SubmoduleMode::Enabled => Some(vec!["submodule", "update", "--init"]),
        SubmoduleMode::Recursive => Some(vec!["submodule", "update", "--init", "--recursive"]),
    }
}

/// Initialize and update submodules according to the configured mode
pub fn update_submodules(git: &Git, config: &CheckoutConfig, path: &Path) -> Result<()> {
    let Some(args) = submodule_args(config.submodules) else {
        return Ok(());
    };

    info!(mode = %config.submodules, "Updating submodules");
    git.run(path, args)?;
    Ok(())
}

/// Install LFS hooks for this checkout and pull all tracked content
pub fn pull_lfs(git: &Git, config: &CheckoutConfig, path: &Path) -> Result<()> {
    if !config.lfs {
        return Ok(());
    }

    info!("Installing LFS hooks");
    git.run(path, ["lfs", "install", "--local"])?;

    info!("Pulling LFS content");
    git.run(path, ["lfs", "pull"])?;
    Ok(())
}
