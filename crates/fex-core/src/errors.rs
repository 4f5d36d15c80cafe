use std::path::PathBuf;

/// Unified error type for the fex engine.
#[derive(Debug, thiserror::Error)]
pub enum FexError {
    #[error("config not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ConfigParse(String),

    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("stop {0} not found on route")]
    StopNotFound(u32),

    #[error("activity not found: {0}")]
    ActivityNotFound(String),

    #[error("activity is locked: {0}")]
    ActivityLocked(String),

    #[error("mandatory activity cannot be skipped: {0}")]
    MandatorySkip(String),

    #[error("visit already has recorded progress")]
    ProgressExists,

    #[error("validation failed: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
