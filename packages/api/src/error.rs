//! API error types.

use dispatch::{DispatchError, JobError};
use stream_core::ConfigError;

/// Errors returned to clients of the request boundary.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Illegal Argument: {0}")]
    InvalidRequest(String),

    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Job failed: {0}")]
    Job(#[from] JobError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}
