use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse failed: {0}")]
    Parse(String),

    #[error("Coverage mapper failed: {0}")]
    Mapper(String),

    #[error("Worker pool has been terminated")]
    PoolTerminated,

    #[error("Worker crashed while converting '{0}'")]
    WorkerCrashed(String),

    #[error("Invalid coverage for '{path}': {reason}")]
    InvalidCoverage { path: String, reason: String },

    #[error("No coverage inputs: {0}")]
    NoInputs(String),
}

impl Error {
    pub(crate) fn invalid(path: &str, reason: impl Into<String>) -> Self {
        Error::InvalidCoverage {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}
