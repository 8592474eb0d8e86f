use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("no engines support platform {0}")]
    NoSupportedEngines(String),
    #[error(transparent)]
    Shell(#[from] yascheduler_shell::ShellError),
    #[error(transparent)]
    Engine(#[from] yascheduler_engines::EngineError),
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
