//! Checkout Core - Core library for ci-checkout
//!
//! This crate produces a working copy of a Git repository inside a CI job:
//! it resolves inputs against the runner environment, clones or updates the
//! checkout path through the `git` binary, optionally materializes submodules
//! and LFS content, and reports the resulting commit and branch.

pub mod checkout;
pub mod config;
pub mod credentials;
pub mod error;
pub mod git;
pub mod materialize;
pub mod output;
pub mod remote;
pub mod ssh;
pub mod workdir;

pub use checkout::{Checkout, CheckoutContext};
pub use config::{CheckoutConfig, CiEnvironment, FetchDepth, Inputs, SubmoduleMode};
pub use error::{Error, Result};
pub use git::{Git, GitRepo};
pub use output::CheckoutOutcome;
pub use remote::{mask_url, Protocol, RemoteUrl};
pub use workdir::WorkdirState;
