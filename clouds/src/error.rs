use thiserror::Error;

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("cloud provider {0} returned an error: {1}")]
    Provider(String, String),
    #[error("node {0} did not become reachable before provisioning timed out")]
    Unreachable(String),
    #[error("unknown cloud provider {0}")]
    UnknownProvider(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
