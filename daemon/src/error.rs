use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Config(#[from] yascheduler_common::ConfigError),
    #[error(transparent)]
    Storage(#[from] yascheduler_storage::StorageError),
    #[error(transparent)]
    Engine(#[from] yascheduler_engines::EngineError),
    #[error(transparent)]
    Scheduler(#[from] yascheduler_scheduler::SchedulerError),
    #[error("no cloud provider section named {0} is supported")]
    UnsupportedCloudProvider(String),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
