use std::error::Error as StdError;
use thiserror::Error;

/// An error surfaced by one of the wrapped engines. The core never inspects
/// the inner cause — it only needs to know which engine produced it and
/// whether the operation was simply unsupported.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{engine} engine error: {source}")]
    Failed {
        engine: &'static str,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("{operation} is not supported by the {engine} engine")]
    Unsupported {
        engine: &'static str,
        operation: &'static str,
    },
}

impl EngineError {
    pub fn failed(engine: &'static str, source: impl StdError + Send + Sync + 'static) -> Self {
        EngineError::Failed {
            engine,
            source: Box::new(source),
        }
    }

    pub fn unsupported(engine: &'static str, operation: &'static str) -> Self {
        EngineError::Unsupported { engine, operation }
    }
}
