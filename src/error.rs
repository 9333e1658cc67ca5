use thiserror::Error;

/// Errors surfaced by the detection engine.
///
/// `InvalidConfiguration` is fatal at startup. The other two are recoverable:
/// an unknown zone is rejected without touching engine state, and an
/// unavailable source only costs the current tick.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("unknown zone: {0}")]
    UnknownZone(String),

    #[error("reading source '{source_name}' unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },
}

impl EngineError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidConfiguration(msg.into())
    }
}
