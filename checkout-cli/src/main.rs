//! ci-checkout - Check out a Git repository inside a CI job
//!
//! Inputs come from flags or `INPUT_*` variables, fall back to an optional
//! TOML inputs file, then to the `GITHUB_*` runner environment.

use std::path::PathBuf;

use anyhow::Context;
use checkout_core::{Checkout, CheckoutConfig, CheckoutContext, CiEnvironment, Inputs};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// ci-checkout: produce a working copy of a repository for a build step
#[derive(Parser, Debug)]
#[command(name = "ci-checkout")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// TOML file with default inputs
    #[arg(long, env = "CHECKOUT_CONFIG")]
    config: Option<PathBuf>,

    /// Repository as owner/name
    #[arg(long, env = "INPUT_REPOSITORY")]
    repository: Option<String>,

    /// Branch, tag or commit to check out
    #[arg(long = "ref", env = "INPUT_REF")]
    git_ref: Option<String>,

    /// Server base URL
    #[arg(long, env = "INPUT_SERVER-URL")]
    server_url: Option<String>,

    /// Token used to authenticate over HTTPS
    #[arg(long, env = "INPUT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Private SSH key used instead of HTTPS
    #[arg(long, env = "INPUT_SSH-KEY", hide_env_values = true)]
    ssh_key: Option<String>,

    /// known_hosts content; host keys are scanned when absent
    #[arg(long, env = "INPUT_SSH-KNOWN-HOSTS")]
    ssh_known_hosts: Option<String>,

    /// Keep the token available to later git commands (true|false)
    #[arg(long, env = "INPUT_PERSIST-CREDENTIALS")]
    persist_credentials: Option<String>,

    /// Checkout path relative to the workspace
    #[arg(long, env = "INPUT_PATH")]
    path: Option<String>,

    /// Remove untracked files and reset before fetching (true|false)
    #[arg(long, env = "INPUT_CLEAN")]
    clean: Option<String>,

    /// Number of commits to fetch, 0 for full history
    #[arg(long, env = "INPUT_FETCH-DEPTH")]
    fetch_depth: Option<String>,

    /// Pull LFS content (true|false)
    #[arg(long, env = "INPUT_LFS")]
    lfs: Option<String>,

    /// Submodule handling (false|true|recursive)
    #[arg(long, env = "INPUT_SUBMODULES")]
    submodules: Option<String>,

    /// Add the checkout path to git's safe.directory (true|false)
    #[arg(long, env = "INPUT_SET-SAFE-DIRECTORY")]
    set_safe_directory: Option<String>,
}

impl Cli {
    fn inputs(&self) -> Inputs {
        Inputs {
            repository: self.repository.clone(),
            git_ref: self.git_ref.clone(),
            server_url: self.server_url.clone(),
            token: self.token.clone(),
            ssh_key: self.ssh_key.clone(),
            ssh_known_hosts: self.ssh_known_hosts.clone(),
            persist_credentials: self.persist_credentials.clone(),
            path: self.path.clone(),
            clean: self.clean.clone(),
            fetch_depth: self.fetch_depth.clone(),
            lfs: self.lfs.clone(),
            submodules: self.submodules.clone(),
            set_safe_directory: self.set_safe_directory.clone(),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let env = CiEnvironment::from_env();

    let file_inputs = match &cli.config {
        Some(path) => Inputs::load_from_file(path)
            .with_context(|| format!("Failed to load inputs from {}", path.display()))?,
        None => Inputs::default(),
    };

    let config = CheckoutConfig::resolve(cli.inputs().or(file_inputs), &env)?;
    let ctx = CheckoutContext::from_environment(&env)?;

    let outcome = Checkout::new(ctx, config).run()?;
    tracing::debug!(?outcome, "Run finished");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_map_to_inputs() {
        let cli = Cli::try_parse_from([
            "ci-checkout",
            "--repository",
            "octocat/hello-world",
            "--ref",
            "main",
            "--fetch-depth",
            "0",
            "--submodules",
            "recursive",
        ])
        .unwrap();

        let inputs = cli.inputs();
        assert_eq!(inputs.repository.as_deref(), Some("octocat/hello-world"));
        assert_eq!(inputs.git_ref.as_deref(), Some("main"));
        assert_eq!(inputs.fetch_depth.as_deref(), Some("0"));
        assert_eq!(inputs.submodules.as_deref(), Some("recursive"));
    }
}
