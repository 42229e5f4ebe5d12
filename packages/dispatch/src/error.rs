//! Error types for the dispatch engine.

use stream_core::{ConfigError, JobId};

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors surfaced to callers registering streams or submitting jobs.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Job {0} is already registered")]
    DuplicateJob(JobId),

    #[error("Stream '{0}' is already registered")]
    DuplicateStream(String),

    #[error("Serializer '{0}' is already registered")]
    DuplicateSerializer(String),

    #[error("Plugin '{0}' is already loaded")]
    DuplicatePlugin(String),

    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    #[error("Stream '{0}' is not accepting jobs")]
    StreamClosed(String),

    #[error("Stream '{0}' has no live workers")]
    StreamDegraded(String),

    #[error("Stream '{0}' was already shut down")]
    AlreadyShutdown(String),

    #[error("Failed to build stream '{name}': {reason}")]
    StreamConstruction { name: String, reason: String },

    #[error("Plugin '{name}' failed to enable: {reason}")]
    Plugin { name: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Failure value delivered to a job's pending result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("Stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },

    #[error("Stage '{stage}' panicked: {message}")]
    Panicked { stage: String, message: String },

    #[error("Job was abandoned before it produced a result")]
    Abandoned,
}

impl From<StageError> for JobError {
    fn from(err: StageError) -> Self {
        JobError::Stage {
            stage: err.stage,
            message: err.message,
        }
    }
}

/// Error returned by a pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{stage}: {message}")]
pub struct StageError {
    pub stage: String,
    pub message: String,
}

impl StageError {
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// Failures of a whole pipeline run that cannot be pinned on one job.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Pipeline construction failed: {0}")]
    Construction(StageError),

    #[error("Reader has no staged job")]
    NoStagedJob,

    #[error("Collection completion failed: {0}")]
    Completion(StageError),

    #[error("Pipeline context poisoned by panic in '{stage}': {message}")]
    Poisoned { stage: String, message: String },
}

/// Errors from the job queue lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Queue is already closed")]
    AlreadyClosed,
}

/// Render a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
