//! Credential persistence or stripping after checkout
//!
//! Only applies when the remote was reached with a token. Persisting keeps the
//! token available to later steps of the same job through a credential-store
//! file; stripping rewrites `origin` to its token-free URL.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::CheckoutConfig;
use crate::git::Git;
use crate::remote::{server_host, Protocol, RemoteUrl};
use crate::ssh::write_private;
use crate::Result;

/// Credential-store file under the user's home
pub fn credentials_path(home: &Path) -> PathBuf {
    home.join(".git-credentials")
}

/// A `protocol://token@host` credential-store line for the server
pub fn credential_line(server_url: &str, token: &str) -> String {
    let with_scheme = if server_url.contains("://") {
        server_url.to_string()
    } else {
        format!("https://{}", server_url)
    };

    match url::Url::parse(&with_scheme) {
        Ok(url) if url.host_str().is_some() => {
            let host = url.host_str().unwrap_or_default();
            match url.port() {
                Some(port) => format!("{}://{}@{}:{}", url.scheme(), token, host, port),
                None => format!("{}://{}@{}", url.scheme(), token, host),
            }
        }
        _ => format!("https://{}@{}", token, server_host(server_url.trim_end_matches('/'))),
    }
}

/// Append the token to the credential store and point git at it
pub fn persist(git: &Git, home: &Path, config: &CheckoutConfig, cwd: &Path) -> Result<PathBuf> {
    let Some(token) = &config.token else {
        return Ok(credentials_path(home));
    };

    let path = credentials_path(home);
    let line = credential_line(&config.server_url, token);

    let existing = fs::read_to_string(&path).unwrap_or_default();
    if !existing.lines().any(|l| l == line) {
        write_private(&path, format!("{}\n", line).as_bytes(), true)?;
    }

    let helper = format!("store --file={}", path.display());
    git.run(cwd, ["config", "--global", "credential.helper", helper.as_str()])?;

    info!(path = %path.display(), "Persisted credentials");
    Ok(path)
}

/// Point `origin` back at the token-free URL
pub fn strip(git: &Git, remote: &RemoteUrl, path: &Path) -> Result<()> {
    git.run(path, ["remote", "set-url", "origin", remote.anonymous()])?;
    info!("Removed credentials from remote URL");
    Ok(())
}

/// Persist or strip, depending on `persist-credentials`
pub fn finalize(
    git: &Git,
    home: &Path,
    config: &CheckoutConfig,
    remote: &RemoteUrl,
    path: &Path,
) -> Result<()> {
    if remote.protocol() != Protocol::HttpsToken {
        return Ok(());
    }

    if config.persist_credentials {
        persist(git, home, config, path)?;
    } else {
        strip(git, remote, path)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CiEnvironment, Inputs};
    use std::process::Command;
    use tempfile::TempDir;

    fn git_available() -> bool {
        Command::new("git").arg("--version").output().is_ok()
    }

    fn config(token: &str, persist: bool) -> CheckoutConfig {
        let inputs = Inputs {
            repository: Some("octocat/hello-world".to_string()),
            token: Some(token.to_string()),
            persist_credentials: Some(persist.to_string()),
            ..Default::default()
        };
        CheckoutConfig::resolve(inputs, &CiEnvironment::default()).unwrap()
    }

    #[test]
    fn test_credential_line() {
        assert_eq!(
            credential_line("https://github.com", "abc123"),
            "https://abc123@github.com"
        );
        assert_eq!(
            credential_line("http://git.local:3000/", "abc123"),
            "http://abc123@git.local:3000"
        );
        assert_eq!(
            credential_line("ghe.example.com", "abc123"),
            "https://abc123@ghe.example.com"
        );
    }

    #[test]
    fn test_persist_writes_private_file_once() {
        if !git_available() {
            return;
        }

        let home = TempDir::new().unwrap();
        let git = Git::new().with_home(home.path());
        let config = config("abc123", true);

        let path = persist(&git, home.path(), &config, home.path()).unwrap();
        persist(&git, home.path(), &config, home.path()).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "https://abc123@github.com\n");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        let helper = git
            .run(home.path(), ["config", "--global", "--get", "credential.helper"])
            .unwrap();
        assert_eq!(helper, format!("store --file={}", path.display()));
    }

    #[test]
    fn test_strip_rewrites_origin() {
        if !git_available() {
            return;
        }

        let home = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        let git = Git::new().with_home(home.path());
        let config = config("abc123", false);
        let remote = RemoteUrl::resolve(&config);

        git.run(repo.path(), ["init", "-q"]).unwrap();
        git.run(repo.path(), ["remote", "add", "origin", remote.as_str()])
            .unwrap();

        finalize(&git, home.path(), &config, &remote, repo.path()).unwrap();

        let url = git.run(repo.path(), ["remote", "get-url", "origin"]).unwrap();
        assert_eq!(url, "https://github.com/octocat/hello-world.git");
        assert!(!credentials_path(home.path()).exists());
    }
}
