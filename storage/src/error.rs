use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database connection error: {0}")]
    Connection(#[from] postgres::Error),
    #[error("no such task {0}")]
    NoSuchTask(i32),
    #[error("no such node {0}")]
    NoSuchNode(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;
