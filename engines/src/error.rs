use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no engines were configured")]
    NoEngines,
    #[error("engine [{0}] is missing required key '{1}'")]
    MissingKey(String, String),
    #[error("engine [{0}] has an invalid value for '{1}': {2}")]
    InvalidValue(String, String, String),
    #[error("engine '{0}' is unknown")]
    UnknownEngine(String),
    #[error("spawn template references unknown placeholder '{0}'")]
    UnknownPlaceholder(String),
}
