use db_api::EngineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("malformed migration url: {0}")]
    MalformedUrl(String),

    #[error("missing required query parameter '{0}'")]
    MissingParameter(&'static str),

    #[error("unknown migration phase '{0}'")]
    UnknownPhase(String),
}

#[derive(Error, Debug)]
pub enum BackfillJobError {
    #[error("backfill job is already active")]
    AlreadyActive,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("failed to save checkpoint: {0}")]
    Save(String),

    #[error("failed to load checkpoint: {0}")]
    Load(String),
}
