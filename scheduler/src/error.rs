use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("unknown engine {0}")]
    UnknownEngine(String),
    #[error("input file {0} was not provided for engine {1}")]
    MissingInputFile(String, String),
    #[error(transparent)]
    Storage(#[from] yascheduler_storage::StorageError),
    #[error(transparent)]
    Shell(#[from] yascheduler_shell::ShellError),
    #[error(transparent)]
    Engine(#[from] yascheduler_engines::EngineError),
    #[error(transparent)]
    Provision(#[from] yascheduler_provisioner::ProvisionError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
