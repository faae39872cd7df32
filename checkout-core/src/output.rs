//! Result reporting: commit and branch outputs

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use tracing::{debug, info};

use crate::error::best_effort;
use crate::git::{GitRepo, DETACHED_BRANCH};
use crate::{Error, Result};

/// Final state of the checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutOutcome {
    /// Full hash of the checked-out commit
    pub commit: String,
    /// Current branch, or `HEAD` when detached
    pub branch: String,
}

impl CheckoutOutcome {
    /// Read commit and branch from the repository at `path`
    pub fn inspect(path: &Path) -> Result<Self> {
        let repo = GitRepo::open(path)?;

        let commit = repo.head_commit()?.ok_or_else(|| {
            Error::Other(format!("No commit checked out in {}", path.display()))
        })?;
        let branch = repo
            .current_branch()?
            .unwrap_or_else(|| DETACHED_BRANCH.to_string());

        Ok(Self { commit, branch })
    }

    /// `key=value` lines for the output sink
    pub fn to_output_lines(&self) -> String {
        format!("commit-sha={}\nbranch={}\n", self.commit, self.branch)
    }

    /// Log the outcome and append it to the output sink, if there is one
    ///
    /// Never fails: a missing sink is a no-op and write errors are logged.
    pub fn report(&self, sink: Option<&Path>) {
        info!(commit = %self.commit, branch = %self.branch, "Checkout complete");

        let Some(sink) = sink else {
            debug!("No output sink configured, skipping outputs");
            return;
        };

        best_effort("Writing outputs", append_outputs(sink, &self.to_output_lines()));
    }
}

fn append_outputs(sink: &Path, lines: &str) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(sink)?;
    file.write_all(lines.as_bytes())?;
    Ok(())
}
