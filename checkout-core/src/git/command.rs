//! Invocation of the `git` binary

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::debug;

use crate::config::REDACTED;
use crate::{Error, Result};

/// Runner for `git` subcommands
///
/// Carries everything a command needs besides its arguments: the program,
/// extra environment (e.g. `GIT_SSH_COMMAND`, an isolated `HOME`) and the
/// secrets that must never show up in logs or error messages.
#[derive(Clone)]
pub struct Git {
    program: PathBuf,
    envs: Vec<(OsString, OsString)>,
    removed_envs: Vec<OsString>,
    secrets: Vec<String>,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git")
            .field("program", &self.program)
            .field("secrets", &self.secrets.len())
            .finish_non_exhaustive()
    }
}

impl Default for Git {
    fn default() -> Self {
        Self::new()
    }
}

impl Git {
    /// Runner for `git` from `PATH`, with interactive prompts disabled
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("git"),
            envs: vec![("GIT_TERMINAL_PROMPT".into(), "0".into())],
            removed_envs: Vec::new(),
            secrets: Vec::new(),
        }
    }

    /// Use a specific git executable
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Run every command with `HOME` pointing at `home`
    ///
    /// Global configuration (`safe.directory`, `credential.helper`) is then read
    /// from and written to `home/.gitconfig`.
    pub fn with_home(mut self, home: &Path) -> Self {
        self.set_env("HOME", home);
        self.removed_envs.push("GIT_CONFIG_GLOBAL".into());
        self
    }

    /// Set an environment variable for every subsequent command
    pub fn set_env(&mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) {
        let key = key.as_ref().to_os_string();
        self.envs.retain(|(k, _)| *k != key);
        self.envs.push((key, value.as_ref().to_os_string()));
    }

    /// Register a value to be masked in logs and errors
    pub fn redact(&mut self, secret: impl Into<String>) {
        let secret = secret.into();
        if !secret.is_empty() && !self.secrets.contains(&secret) {
            self.secrets.push(secret);
        }
    }

    /// Mask every registered secret in `text`
    pub fn mask(&self, text: &str) -> String {
        mask_secrets(text, &self.secrets)
    }

    /// Run a git command in `dir`, returning trimmed stdout
    ///
    /// A non-zero exit becomes [`Error::Git`] carrying the masked stderr.
    pub fn run<I, S>(&self, dir: &Path, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
        let output = self.output(dir, &args)?;

        if !output.status.success() {
            return Err(Error::Git {
                command: self.command_line(&args),
                status: output.status.to_string(),
                stderr: self.mask(String::from_utf8_lossy(&output.stderr).trim()),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run a git command in `dir` and report whether it exited successfully
    ///
    /// Only a failure to launch git at all is an error.
    pub fn succeeds<I, S>(&self, dir: &Path, args: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
        let output = self.output(dir, &args)?;

        if !output.status.success() {
            debug!(
                command = %self.command_line(&args),
                stderr = %self.mask(String::from_utf8_lossy(&output.stderr).trim()),
                "git command did not succeed"
            );
        }

        Ok(output.status.success())
    }

    fn output(&self, dir: &Path, args: &[OsString]) -> Result<Output> {
        debug!(dir = %dir.display(), "Running {}", self.command_line(args));

        let mut cmd = Command::new(&self.program);
        cmd.args(args).current_dir(dir);
        for key in &self.removed_envs {
            cmd.env_remove(key);
        }
        cmd.envs(self.envs.iter().map(|(k, v)| (k, v)));

        cmd.output().map_err(|e| {
            Error::Other(format!(
                "Failed to run {}: {}",
                self.program.display(),
                e
            ))
        })
    }

    fn command_line(&self, args: &[OsString]) -> String {
        let mut line = String::from("git");
        for arg in args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        self.mask(&crate::remote::mask_url(&line))
    }
}

/// Replace every occurrence of each secret with `***`
pub fn mask_secrets(text: &str, secrets: &[String]) -> String {
    secrets
        .iter()
        .filter(|s| !s.is_empty())
        .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), REDACTED))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mask_secrets() {
        let secrets = vec!["abc123".to_string(), String::new()];
        assert_eq!(
            mask_secrets("fatal: https://abc123@host/x.git abc123", &secrets),
            "fatal: https://***@host/x.git ***"
        );
        assert_eq!(mask_secrets("nothing here", &secrets), "nothing here");
    }

    #[test]
    fn test_redact_ignores_duplicates_and_empty() {
        let mut git = Git::new();
        git.redact("abc123");
        git.redact("abc123");
        git.redact("");
        assert_eq!(git.secrets.len(), 1);
    }

    #[test]
    fn test_set_env_replaces() {
        let mut git = Git::new();
        git.set_env("GIT_SSH_COMMAND", "ssh -i a");
        git.set_env("GIT_SSH_COMMAND", "ssh -i b");
        let values: Vec<_> = git
            .envs
            .iter()
            .filter(|(k, _)| k == "GIT_SSH_COMMAND")
            .collect();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].1, "ssh -i b");
    }

    #[test]
    fn test_missing_program_is_error() {
        let dir = TempDir::new().unwrap();
        let git = Git::new().with_program("/nonexistent/git-binary");
        assert!(git.run(dir.path(), ["--version"]).is_err());
        assert!(git.succeeds(dir.path(), ["--version"]).is_err());
    }

    #[test]
    fn test_failure_masks_secret() {
        if Command::new("git").arg("--version").output().is_err() {
            return;
        }

        let dir = TempDir::new().unwrap();
        let mut git = Git::new();
        git.redact("s3cr3t");

        let err = git
            .run(dir.path(), ["rev-parse", "--verify", "s3cr3t"])
            .unwrap_err();
        let message = err.to_string();
        assert!(!message.contains("s3cr3t"));
        assert!(message.contains("***"));
    }
}
