//! A single authenticated SSH session to one node, and the handful of
//! capabilities the rest of the system relies on (spec.md §4.B).

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ssh2::Session;
use tracing::trace;

use crate::error::{Result, ShellError};

/// Output of a synchronous command execution.
#[derive(Clone, Debug)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

pub struct SshSession {
    host: String,
    session: Session,
}

impl SshSession {
    /// Open a session authenticating with a private key named
    /// `{keys_dir}/{user}` (matching the original's per-user key layout).
    #[tracing::instrument(skip(keys_dir))]
    pub fn connect(host: &str, user: &str, keys_dir: &Path) -> Result<Self> {
        let tcp = TcpStream::connect((host, 22)).map_err(|e| ShellError::Io(host.into(), e))?;
        tcp.set_read_timeout(Some(Duration::from_secs(30)))
            .map_err(|e| ShellError::Io(host.into(), e))?;

        let mut session = Session::new().map_err(|e| ShellError::Ssh(host.into(), e))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| ShellError::Ssh(host.into(), e))?;

        let key_path: PathBuf = keys_dir.join(user);
        session
            .userauth_pubkey_file(user, None, &key_path, None)
            .map_err(|e| ShellError::Ssh(host.into(), e))?;

        Ok(Self {
            host: host.to_string(),
            session,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Execute a command synchronously and collect its exit code, stdout
    /// and stderr.
    #[tracing::instrument(skip(self))]
    pub fn exec(&self, cmd: &str) -> Result<CommandOutput> {
        trace!("exec on {}: {}", self.host, cmd);
        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| ShellError::Ssh(self.host.clone(), e))?;
        channel
            .exec(cmd)
            .map_err(|e| ShellError::Ssh(self.host.clone(), e))?;

        let mut stdout = String::new();
        channel
            .read_to_string(&mut stdout)
            .map_err(|e| ShellError::Io(self.host.clone(), e))?;
        let mut stderr = String::new();
        channel
            .stderr()
            .read_to_string(&mut stderr)
            .map_err(|e| ShellError::Io(self.host.clone(), e))?;

        channel
            .wait_close()
            .map_err(|e| ShellError::Ssh(self.host.clone(), e))?;
        let exit_code = channel
            .exit_status()
            .map_err(|e| ShellError::Ssh(self.host.clone(), e))?;

        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
        })
    }

    /// Run `cmd` detached under `cwd`, surviving this session — equivalent
    /// to `nohup sh -c '<cmd>' >/dev/null 2>&1 &` run from `cwd`.
    #[tracing::instrument(skip(self))]
    pub fn spawn_detached(&self, cmd: &str, cwd: &str) -> Result<()> {
        let escaped = cmd.replace('\'', "'\\''");
        let wrapped = format!(
            "cd '{}' && nohup sh -c '{}' > /dev/null 2>&1 < /dev/null &",
            cwd, escaped
        );
        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| ShellError::Ssh(self.host.clone(), e))?;
        channel
            .exec(&wrapped)
            .map_err(|e| ShellError::Ssh(self.host.clone(), e))?;
        channel
            .wait_close()
            .map_err(|e| ShellError::Ssh(self.host.clone(), e))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn mkdir_p(&self, remote: &str) -> Result<()> {
        let out = self.exec(&format!("mkdir -p '{}'", remote))?;
        if !out.success() {
            return Err(ShellError::CommandFailed(
                self.host.clone(),
                out.exit_code,
                out.stderr,
            ));
        }
        Ok(())
    }

    pub fn exists(&self, remote: &str) -> Result<bool> {
        let out = self.exec(&format!("test -e '{}'", remote))?;
        Ok(out.success())
    }

    /// Delete a remote file or directory (recursively).
    #[tracing::instrument(skip(self))]
    pub fn remove(&self, remote: &str) -> Result<()> {
        let out = self.exec(&format!("rm -rf '{}'", remote))?;
        if !out.success() {
            return Err(ShellError::CommandFailed(
                self.host.clone(),
                out.exit_code,
                out.stderr,
            ));
        }
        Ok(())
    }

    pub fn chmod_exec(&self, remote: &str) -> Result<()> {
        let out = self.exec(&format!("chmod +x '{}'", remote))?;
        if !out.success() {
            return Err(ShellError::CommandFailed(
                self.host.clone(),
                out.exit_code,
                out.stderr,
            ));
        }
        Ok(())
    }

    /// Write `contents` to a remote file.
    #[tracing::instrument(skip(self, contents))]
    pub fn write_file(&self, remote: &str, contents: &str) -> Result<()> {
        let bytes = contents.as_bytes();
        let mut remote_file = self
            .session
            .scp_send(Path::new(remote), 0o644, bytes.len() as u64, None)
            .map_err(|e| ShellError::Ssh(self.host.clone(), e))?;
        remote_file
            .write_all(bytes)
            .map_err(|e| ShellError::Io(self.host.clone(), e))?;
        finish_scp_send(&mut remote_file, &self.host)
    }

    /// Upload a local file to a remote path.
    #[tracing::instrument(skip(self))]
    pub fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        let data = std::fs::read(local).map_err(|e| ShellError::Io(self.host.clone(), e))?;
        let mut remote_file = self
            .session
            .scp_send(Path::new(remote), 0o644, data.len() as u64, None)
            .map_err(|e| ShellError::Ssh(self.host.clone(), e))?;
        remote_file
            .write_all(&data)
            .map_err(|e| ShellError::Io(self.host.clone(), e))?;
        finish_scp_send(&mut remote_file, &self.host)
    }

    /// Download a remote file to a local path.
    #[tracing::instrument(skip(self))]
    pub fn download(&self, remote: &str, local: &Path) -> Result<()> {
        let (mut remote_file, _stat) = self
            .session
            .scp_recv(Path::new(remote))
            .map_err(|e| ShellError::Ssh(self.host.clone(), e))?;
        let mut contents = Vec::new();
        remote_file
            .read_to_end(&mut contents)
            .map_err(|e| ShellError::Io(self.host.clone(), e))?;
        remote_file
            .send_eof()
            .map_err(|e| ShellError::Ssh(self.host.clone(), e))?;
        remote_file
            .wait_eof()
            .map_err(|e| ShellError::Ssh(self.host.clone(), e))?;
        remote_file
            .close()
            .map_err(|e| ShellError::Ssh(self.host.clone(), e))?;
        remote_file
            .wait_close()
            .map_err(|e| ShellError::Ssh(self.host.clone(), e))?;
        std::fs::write(local, contents).map_err(|e| ShellError::Io(self.host.clone(), e))
    }

    /// Query whether any process matching `pname` is running.
    pub fn pgrep(&self, pname: &str) -> Result<bool> {
        let out = self.exec(&format!("pgrep -x '{}'", pname))?;
        Ok(out.success())
    }
}

fn finish_scp_send(remote_file: &mut ssh2::Channel, host: &str) -> Result<()> {
    remote_file
        .send_eof()
        .map_err(|e| ShellError::Ssh(host.into(), e))?;
    remote_file
        .wait_eof()
        .map_err(|e| ShellError::Ssh(host.into(), e))?;
    remote_file
        .close()
        .map_err(|e| ShellError::Ssh(host.into(), e))?;
    remote_file
        .wait_close()
        .map_err(|e| ShellError::Ssh(host.into(), e))
}
