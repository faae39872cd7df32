//! Git operations for ci-checkout
//!
//! Mutations go through the `git` binary ([`Git`]); read-only inspection of the
//! resulting repository goes through libgit2 ([`GitRepo`]).

mod command;
mod repo;

pub use command::{mask_secrets, Git};
pub use repo::{GitRepo, DETACHED_BRANCH};
