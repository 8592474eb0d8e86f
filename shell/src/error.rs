use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("io error talking to {0}: {1}")]
    Io(String, std::io::Error),
    #[error("ssh error talking to {0}: {1}")]
    Ssh(String, ssh2::Error),
    #[error("no session open for node {0}")]
    NoSession(String),
    #[error("timed out waiting for {0} to become reachable")]
    Unreachable(String),
    #[error("remote command on {0} exited with status {1}: {2}")]
    CommandFailed(String, i32, String),
}

pub type Result<T> = std::result::Result<T, ShellError>;
