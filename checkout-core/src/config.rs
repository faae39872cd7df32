//! Configuration resolution for a checkout run
//!
//! Every input is resolved with the following priority (highest to lowest):
//! 1. Explicit input (CLI flag or `INPUT_*` environment variable)
//! 2. Inputs file (`--config`, TOML)
//! 3. CI environment (`GITHUB_*` variables)
//! 4. Default values
//!
//! Flags are parsed into typed values here so that the rest of the run never
//! compares raw strings.

use std::fmt;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{Error, Result};

/// Server used when none is configured
pub const DEFAULT_SERVER_URL: &str = "https://github.com";

/// Ref used when neither the input nor the environment names one
pub const DEFAULT_REF: &str = "main";

/// Marker printed in place of secret values
pub const REDACTED: &str = "***";

/// Raw, unvalidated inputs as supplied by the caller
///
/// Field names follow the kebab-case input names (`fetch-depth`, `ssh-key`, ...).
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Inputs {
    pub repository: Option<String>,
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    pub server_url: Option<String>,
    pub token: Option<String>,
    pub ssh_key: Option<String>,
    pub ssh_known_hosts: Option<String>,
    pub persist_credentials: Option<String>,
    pub path: Option<String>,
    pub clean: Option<String>,
    pub fetch_depth: Option<String>,
    pub lfs: Option<String>,
    pub submodules: Option<String>,
    pub set_safe_directory: Option<String>,
}

impl fmt::Debug for Inputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inputs")
            .field("repository", &self.repository)
            .field("ref", &self.git_ref)
            .field("server_url", &self.server_url)
            .field("token", &self.token.as_ref().map(|_| REDACTED))
            .field("ssh_key", &self.ssh_key.as_ref().map(|_| REDACTED))
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Inputs {
    /// Load inputs from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&contents).map_err(|e| {
            Error::Config(format!("Failed to parse inputs file {}: {}", path.display(), e))
        })
    }

    /// Fill every absent (or empty) field from `lower`
    pub fn or(self, lower: Inputs) -> Self {
        fn pick(high: Option<String>, low: Option<String>) -> Option<String> {
            non_empty(high).or_else(|| non_empty(low))
        }

        Self {
            repository: pick(self.repository, lower.repository),
            git_ref: pick(self.git_ref, lower.git_ref),
            server_url: pick(self.server_url, lower.server_url),
            token: pick(self.token, lower.token),
            ssh_key: pick(self.ssh_key, lower.ssh_key),
            ssh_known_hosts: pick(self.ssh_known_hosts, lower.ssh_known_hosts),
            persist_credentials: pick(self.persist_credentials, lower.persist_credentials),
            path: pick(self.path, lower.path),
            clean: pick(self.clean, lower.clean),
            fetch_depth: pick(self.fetch_depth, lower.fetch_depth),
            lfs: pick(self.lfs, lower.lfs),
            submodules: pick(self.submodules, lower.submodules),
            set_safe_directory: pick(self.set_safe_directory, lower.set_safe_directory),
        }
    }
}

/// Snapshot of the variables the CI runner injects
#[derive(Debug, Clone, Default)]
pub struct CiEnvironment {
    /// `GITHUB_REPOSITORY`
    pub repository: Option<String>,
    /// `GITHUB_SERVER_URL`
    pub server_url: Option<String>,
    /// `GITHUB_REF_NAME`
    pub ref_name: Option<String>,
    /// `GITHUB_SHA`
    pub sha: Option<String>,
    /// `GITHUB_WORKSPACE`
    pub workspace: Option<PathBuf>,
    /// `GITHUB_OUTPUT`
    pub output: Option<PathBuf>,
}

impl CiEnvironment {
    /// Capture the runner environment of the current process
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Capture the runner environment through an arbitrary lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| non_empty(lookup(key));

        Self {
            repository: get("GITHUB_REPOSITORY"),
            server_url: get("GITHUB_SERVER_URL"),
            ref_name: get("GITHUB_REF_NAME"),
            sha: get("GITHUB_SHA"),
            workspace: get("GITHUB_WORKSPACE").map(PathBuf::from),
            output: get("GITHUB_OUTPUT").map(PathBuf::from),
        }
    }
}

/// How submodules are materialized after checkout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubmoduleMode {
    /// Submodules are left alone
    #[default]
    Disabled,
    /// Top-level submodules only
    Enabled,
    /// Submodules of submodules as well
    Recursive,
}

impl SubmoduleMode {
    fn parse(value: &str) -> Result<Self> {
        match value.trim() {
            "false" => Ok(Self::Disabled),
            "true" => Ok(Self::Enabled),
            "recursive" => Ok(Self::Recursive),
            other => Err(Error::InvalidInput {
                field: "submodules",
                value: other.to_string(),
                expected: "false, true, recursive",
            }),
        }
    }
}

impl fmt::Display for SubmoduleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("false"),
            Self::Enabled => f.write_str("true"),
            Self::Recursive => f.write_str("recursive"),
        }
    }
}

/// How much history to retrieve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDepth {
    /// Complete history (input `0`)
    Full,
    /// At most this many commits
    Shallow(NonZeroU32),
}

impl Default for FetchDepth {
    fn default() -> Self {
        Self::Shallow(NonZeroU32::MIN)
    }
}

impl FetchDepth {
    fn parse(value: &str) -> Result<Self> {
        let depth: u32 = value.trim().parse().map_err(|_| Error::InvalidInput {
            field: "fetch-depth",
            value: value.to_string(),
            expected: "a non-negative integer (0 for full history)",
        })?;

        Ok(NonZeroU32::new(depth).map_or(Self::Full, Self::Shallow))
    }

    /// The `--depth` argument for clone/fetch, if history is limited
    pub fn arg(&self) -> Option<String> {
        match self {
            Self::Full => None,
            Self::Shallow(n) => Some(format!("--depth={}", n)),
        }
    }
}

impl fmt::Display for FetchDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => f.write_str("0 (full history)"),
            Self::Shallow(n) => write!(f, "{}", n),
        }
    }
}

/// Fully resolved, validated configuration for one run
#[derive(Clone)]
pub struct CheckoutConfig {
    /// `owner/name` repository identifier
    pub repository: String,
    /// Server base URL, e.g. `https://github.com`
    pub server_url: String,
    /// Branch or tag to check out
    pub ref_name: Option<String>,
    /// Commit the checkout must end up on
    pub pin_commit: Option<String>,
    pub token: Option<String>,
    pub ssh_key: Option<String>,
    pub ssh_known_hosts: Option<String>,
    pub persist_credentials: bool,
    /// Checkout path, relative to the workspace unless absolute
    pub path: PathBuf,
    pub clean: bool,
    pub fetch_depth: FetchDepth,
    pub lfs: bool,
    pub submodules: SubmoduleMode,
    pub set_safe_directory: bool,
}

impl fmt::Debug for CheckoutConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckoutConfig")
            .field("repository", &self.repository)
            .field("server_url", &self.server_url)
            .field("ref_name", &self.ref_name)
            .field("pin_commit", &self.pin_commit)
            .field("token", &self.token.as_ref().map(|_| REDACTED))
            .field("ssh_key", &self.ssh_key.as_ref().map(|_| REDACTED))
            .field("persist_credentials", &self.persist_credentials)
            .field("path", &self.path)
            .field("clean", &self.clean)
            .field("fetch_depth", &self.fetch_depth)
            .field("lfs", &self.lfs)
            .field("submodules", &self.submodules)
            .field("set_safe_directory", &self.set_safe_directory)
            .finish_non_exhaustive()
    }
}

impl CheckoutConfig {
    /// Resolve inputs against the CI environment
    ///
    /// Fails on a missing or unresolved repository and on malformed flags.
    /// A missing or unresolved server URL falls back to [`DEFAULT_SERVER_URL`]
    /// with a warning.
    pub fn resolve(inputs: Inputs, env: &CiEnvironment) -> Result<Self> {
        let repository = non_empty(inputs.repository)
            .or_else(|| env.repository.clone())
            .ok_or(Error::MissingInput("repository"))?;
        if has_placeholder(&repository) {
            return Err(Error::UnresolvedPlaceholder {
                field: "repository",
                value: repository,
            });
        }

        let server_url = match non_empty(inputs.server_url).or_else(|| env.server_url.clone()) {
            Some(url) if !has_placeholder(&url) => url,
            Some(url) => {
                warn!(
                    server_url = %url,
                    "Server URL contains an unresolved placeholder, using {}", DEFAULT_SERVER_URL
                );
                DEFAULT_SERVER_URL.to_string()
            }
            None => {
                warn!("Server URL not set, using {}", DEFAULT_SERVER_URL);
                DEFAULT_SERVER_URL.to_string()
            }
        };

        let (ref_name, pin_commit) = match non_empty(inputs.git_ref) {
            Some(commit) if is_commit_id(&commit) => (None, Some(commit.to_ascii_lowercase())),
            Some(explicit) => (Some(explicit), None),
            None => (
                Some(env.ref_name.clone().unwrap_or_else(|| DEFAULT_REF.to_string())),
                env.sha.as_deref().map(str::to_ascii_lowercase),
            ),
        };

        let token = non_empty(inputs.token).filter(|t| t != "null");

        Ok(Self {
            repository,
            server_url,
            ref_name,
            pin_commit,
            token,
            ssh_key: non_empty(inputs.ssh_key),
            ssh_known_hosts: non_empty(inputs.ssh_known_hosts),
            persist_credentials: parse_flag(
                "persist-credentials",
                inputs.persist_credentials.as_deref(),
                true,
            )?,
            path: PathBuf::from(non_empty(inputs.path).unwrap_or_else(|| ".".to_string())),
            clean: parse_flag("clean", inputs.clean.as_deref(), true)?,
            fetch_depth: match non_empty(inputs.fetch_depth) {
                Some(value) => FetchDepth::parse(&value)?,
                None => FetchDepth::default(),
            },
            lfs: parse_flag("lfs", inputs.lfs.as_deref(), false)?,
            submodules: match non_empty(inputs.submodules) {
                Some(value) => SubmoduleMode::parse(&value)?,
                None => SubmoduleMode::default(),
            },
            set_safe_directory: parse_flag(
                "set-safe-directory",
                inputs.set_safe_directory.as_deref(),
                true,
            )?,
        })
    }

    /// Log every resolved field, secrets redacted
    pub fn log_summary(&self) {
        let secret = |value: &Option<String>| if value.is_some() { REDACTED } else { "(none)" };

        info!("Resolved checkout configuration:");
        info!("  repository: {}", self.repository);
        info!("  server-url: {}", self.server_url);
        info!("  ref: {}", self.ref_name.as_deref().unwrap_or("(none)"));
        info!("  commit: {}", self.pin_commit.as_deref().unwrap_or("(none)"));
        info!("  token: {}", secret(&self.token));
        info!("  ssh-key: {}", secret(&self.ssh_key));
        info!(
            "  ssh-known-hosts: {}",
            if self.ssh_known_hosts.is_some() { "(provided)" } else { "(none)" }
        );
        info!("  persist-credentials: {}", self.persist_credentials);
        info!("  path: {}", self.path.display());
        info!("  clean: {}", self.clean);
        info!("  fetch-depth: {}", self.fetch_depth);
        info!("  lfs: {}", self.lfs);
        info!("  submodules: {}", self.submodules);
        info!("  set-safe-directory: {}", self.set_safe_directory);
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn has_placeholder(value: &str) -> bool {
    value.contains("${")
}

fn parse_flag(field: &'static str, value: Option<&str>, default: bool) -> Result<bool> {
    match value.map(str::trim) {
        None | Some("") => Ok(default),
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        Some(other) => Err(Error::InvalidInput {
            field,
            value: other.to_string(),
            expected: "true, false",
        }),
    }
}

/// Whether `value` is a full SHA-1 or SHA-256 object id
pub fn is_commit_id(value: &str) -> bool {
    matches!(value.len(), 40 | 64) && value.chars().all(|c| c.is_ascii_hexdigit())
}
