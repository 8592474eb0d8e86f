//! Owns one [`SshSession`] per live, reachable node and keeps that set in
//! sync with whatever the scheduler currently considers "real" nodes
//! (spec.md §4.B, grounded on `ssh_connect` in the original scheduler pass).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::{Result, ShellError};
use crate::session::{CommandOutput, SshSession};

/// A node the manager should hold (or be holding) a session for.
pub struct NodeRef<'a> {
    pub ip: &'a str,
    pub user: &'a str,
}

pub struct ShellManager {
    keys_dir: PathBuf,
    sessions: HashMap<String, SshSession>,
}

impl ShellManager {
    pub fn new(keys_dir: impl Into<PathBuf>) -> Self {
        Self {
            keys_dir: keys_dir.into(),
            sessions: HashMap::new(),
        }
    }

    pub fn is_connected(&self, ip: &str) -> bool {
        self.sessions.contains_key(ip)
    }

    /// Reconcile held sessions against the current set of real nodes:
    /// drop sessions for nodes no longer present, open sessions for nodes
    /// that are new. Failures to open a session for a given node are
    /// logged and skipped rather than aborting the whole pass.
    pub fn reconcile(&mut self, nodes: &[NodeRef<'_>]) {
        let wanted: HashMap<&str, &str> = nodes.iter().map(|n| (n.ip, n.user)).collect();

        self.sessions.retain(|ip, _| {
            let keep = wanted.contains_key(ip.as_str());
            if !keep {
                info!("closing ssh session to departed node {}", ip);
            }
            keep
        });

        for (ip, user) in &wanted {
            if self.sessions.contains_key(*ip) {
                continue;
            }
            match SshSession::connect(ip, user, &self.keys_dir) {
                Ok(session) => {
                    info!("opened ssh session to {}", ip);
                    self.sessions.insert(ip.to_string(), session);
                }
                Err(e) => {
                    warn!("failed to open ssh session to {}: {}", ip, e);
                }
            }
        }
    }

    fn get(&self, ip: &str) -> Result<&SshSession> {
        self.sessions
            .get(ip)
            .ok_or_else(|| ShellError::NoSession(ip.to_string()))
    }

    pub fn exec(&self, ip: &str, cmd: &str) -> Result<CommandOutput> {
        self.get(ip)?.exec(cmd)
    }

    pub fn spawn_detached(&self, ip: &str, cmd: &str, cwd: &str) -> Result<()> {
        self.get(ip)?.spawn_detached(cmd, cwd)
    }

    pub fn mkdir_p(&self, ip: &str, remote: &str) -> Result<()> {
        self.get(ip)?.mkdir_p(remote)
    }

    pub fn exists(&self, ip: &str, remote: &str) -> Result<bool> {
        self.get(ip)?.exists(remote)
    }

    pub fn remove(&self, ip: &str, remote: &str) -> Result<()> {
        self.get(ip)?.remove(remote)
    }

    pub fn write_file(&self, ip: &str, remote: &str, contents: &str) -> Result<()> {
        self.get(ip)?.write_file(remote, contents)
    }

    pub fn chmod_exec(&self, ip: &str, remote: &str) -> Result<()> {
        self.get(ip)?.chmod_exec(remote)
    }

    pub fn upload(&self, ip: &str, local: &Path, remote: &str) -> Result<()> {
        self.get(ip)?.upload(local, remote)
    }

    pub fn download(&self, ip: &str, remote: &str, local: &Path) -> Result<()> {
        self.get(ip)?.download(remote, local)
    }

    pub fn is_process_running(&self, ip: &str, pname: &str) -> Result<bool> {
        self.get(ip)?.pgrep(pname)
    }
}

/// Poll `host` with exponential backoff until an SSH session can be
/// opened, or give up after `timeout`. Grounded on `upcloud.py`'s
/// `_run_ssh_cmd_with_backoff`, which retries a trivial remote command
/// after newly creating a cloud node until the instance finishes booting.
pub fn wait_until_reachable(
    host: &str,
    user: &str,
    keys_dir: &Path,
    timeout: Duration,
) -> Result<SshSession> {
    let deadline = Instant::now() + timeout;
    let mut delay = Duration::from_secs(2);
    loop {
        match SshSession::connect(host, user, keys_dir) {
            Ok(session) => return Ok(session),
            Err(e) => {
                if Instant::now() >= deadline {
                    warn!("giving up waiting for {} to become reachable: {}", host, e);
                    return Err(ShellError::Unreachable(host.to_string()));
                }
                sleep(delay.min(deadline.saturating_duration_since(Instant::now())));
                delay = (delay * 2).min(Duration::from_secs(30));
            }
        }
    }
}
