//! SSH key and known-hosts preparation
//!
//! Only runs when an SSH key is configured. The key is written under the
//! invoking user's `~/.ssh` with owner-only permissions so later steps of the
//! same job can reuse it. Without explicit known-hosts content the well-known
//! providers (and the custom server, if any) are probed with `ssh-keyscan`;
//! probing is best-effort.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::config::CheckoutConfig;
use crate::error::best_effort;
use crate::remote::server_host;
use crate::{Error, Result};

/// Hosts always probed when no known-hosts content is supplied
pub const WELL_KNOWN_HOSTS: [&str; 2] = ["github.com", "gitlab.com"];

const SSH_PORT: u16 = 22;

/// Files written for SSH access
#[derive(Debug, Clone)]
pub struct SshSetup {
    /// Private key file (mode 0600)
    pub key_path: PathBuf,
    /// Known-hosts file used for host verification
    pub known_hosts_path: PathBuf,
}

impl SshSetup {
    /// Value for `GIT_SSH_COMMAND` pinning git to the written files
    pub fn ssh_command(&self) -> String {
        format!(
            "ssh -i {} -o UserKnownHostsFile={} -o IdentitiesOnly=yes",
            shell_quote(&self.key_path),
            shell_quote(&self.known_hosts_path)
        )
    }
}

/// Write the SSH key and known hosts under `home/.ssh`
///
/// Returns `None` when no key is configured.
pub fn prepare(home: &Path, config: &CheckoutConfig) -> Result<Option<SshSetup>> {
    let Some(key) = &config.ssh_key else {
        return Ok(None);
    };

    info!("Setting up SSH key");

    let ssh_dir = home.join(".ssh");
    fs::create_dir_all(&ssh_dir)
        .map_err(|e| Error::Other(format!("Failed to create {}: {}", ssh_dir.display(), e)))?;
    set_mode(&ssh_dir, 0o700)?;

    let key_path = ssh_dir.join("id_rsa");
    let mut contents = key.trim_end().to_string();
    contents.push('\n');
    write_private(&key_path, contents.as_bytes(), false)?;

    let known_hosts_path = ssh_dir.join("known_hosts");
    match &config.ssh_known_hosts {
        Some(known_hosts) => {
            info!("Writing supplied known hosts");
            fs::write(&known_hosts_path, known_hosts)?;
        }
        None => {
            let hosts = probe_targets(&config.server_url);
            info!(hosts = ?hosts, "No known hosts supplied, scanning host keys");
            for host in hosts {
                best_effort(
                    &format!("ssh-keyscan {}", host),
                    scan_host(&host).and_then(|keys| append(&known_hosts_path, &keys)),
                );
            }
        }
    }

    Ok(Some(SshSetup {
        key_path,
        known_hosts_path,
    }))
}

/// Hosts to scan: the well-known providers plus the custom server host
pub fn probe_targets(server_url: &str) -> Vec<String> {
    let mut hosts: Vec<String> = WELL_KNOWN_HOSTS.iter().map(|h| h.to_string()).collect();

    let custom = server_host(server_url.trim_end_matches('/'));
    let custom = custom.split(':').next().unwrap_or(custom);
    if !custom.is_empty() && !WELL_KNOWN_HOSTS.contains(&custom) {
        hosts.push(custom.to_string());
    }

    hosts
}

fn scan_host(host: &str) -> Result<String> {
    let output = Command::new("ssh-keyscan")
        .arg("-p")
        .arg(SSH_PORT.to_string())
        .arg(host)
        .output()
        .map_err(|e| Error::Other(format!("Failed to run ssh-keyscan: {}", e)))?;

    if !output.status.success() {
        return Err(Error::Other(format!(
            "exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let keys = String::from_utf8_lossy(&output.stdout).to_string();
    debug!(host, lines = keys.lines().count(), "Scanned host keys");
    Ok(keys)
}

fn append(path: &Path, contents: &str) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(contents.as_bytes())?;
    Ok(())
}

/// Write (or append to) a file readable by its owner only
pub(crate) fn write_private(path: &Path, contents: &[u8], append: bool) -> Result<()> {
    let mut options = OpenOptions::new();
    options.create(true).write(true);
    if append {
        options.append(true);
    } else {
        options.truncate(true);
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .map_err(|e| Error::Other(format!("Failed to open {}: {}", path.display(), e)))?;
    file.write_all(contents)?;

    // The mode only applies on creation
    set_mode(path, 0o600)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(Error::Io)
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

fn shell_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CiEnvironment, Inputs};
    use tempfile::TempDir;

    fn config(ssh_key: Option<&str>, known_hosts: Option<&str>) -> CheckoutConfig {
        let inputs = Inputs {
            repository: Some("octocat/hello-world".to_string()),
            ssh_key: ssh_key.map(String::from),
            ssh_known_hosts: known_hosts.map(String::from),
            ..Default::default()
        };
        CheckoutConfig::resolve(inputs, &CiEnvironment::default()).unwrap()
    }

    #[test]
    fn test_no_key_no_setup() {
        let home = TempDir::new().unwrap();
        assert!(prepare(home.path(), &config(None, None)).unwrap().is_none());
        assert!(!home.path().join(".ssh").exists());
    }

    #[test]
    fn test_key_and_known_hosts_written() {
        let home = TempDir::new().unwrap();
        let known = "github.com ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl\n";
        let setup = prepare(home.path(), &config(Some("PRIVATE KEY"), Some(known)))
            .unwrap()
            .unwrap();

        assert_eq!(fs::read_to_string(&setup.key_path).unwrap(), "PRIVATE KEY\n");
        assert_eq!(fs::read_to_string(&setup.known_hosts_path).unwrap(), known);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&setup.key_path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_probe_targets() {
        assert_eq!(probe_targets("https://github.com"), vec!["github.com", "gitlab.com"]);
        assert_eq!(
            probe_targets("https://git.example.com:8443/"),
            vec!["github.com", "gitlab.com", "git.example.com"]
        );
    }

    #[test]
    fn test_ssh_command_quotes_paths() {
        let setup = SshSetup {
            key_path: PathBuf::from("/home/o'brien/.ssh/id_rsa"),
            known_hosts_path: PathBuf::from("/home/ci/.ssh/known_hosts"),
        };
        assert_eq!(
            setup.ssh_command(),
            r"ssh -i '/home/o'\''brien/.ssh/id_rsa' -o UserKnownHostsFile='/home/ci/.ssh/known_hosts' -o IdentitiesOnly=yes"
        );
    }
}
