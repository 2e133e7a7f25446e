use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("Process exited with code {code}: {context}")]
    Process { code: i32, context: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Item {0} is currently downloading")]
    ItemActive(String),

    #[error("Queue is busy: {0}")]
    QueueBusy(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Why a metadata fetch produced nothing. Callers treat every variant the same.
#[derive(Error, Debug)]
pub enum FetchFailure {
    #[error("could not start metadata fetch: {0}")]
    Spawn(String),

    #[error("metadata fetch exited with code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("metadata output could not be decoded: {0}")]
    Parse(String),

    #[error("metadata fetch timed out after {0:?}")]
    Timeout(std::time::Duration),
}
