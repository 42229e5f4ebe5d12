//! Job domain types for documents waiting in a stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single document submitted to a stream for processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Name of the stream this job was submitted to.
    pub stream: String,
    /// Document text fed to the pipeline.
    pub document: String,
    /// Free-form metadata that stages may read and rewrite.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    /// When the job was submitted.
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Create a job with a fresh identifier.
    pub fn new(stream: impl Into<String>, document: impl Into<String>) -> Self {
        Self::with_id(JobId::new(), stream, document)
    }

    /// Create a job under a caller-chosen identifier.
    pub fn with_id(id: JobId, stream: impl Into<String>, document: impl Into<String>) -> Self {
        Self {
            id,
            stream: stream.into(),
            document: document.into(),
            metadata: None,
            created_at: Utc::now(),
        }
    }

    /// Attach metadata to this job.
    pub fn with_metadata(mut self, metadata: Option<String>) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_round_trips_through_display() {
        let id = JobId::new();
        let parsed = JobId::parse(&id.to_string()).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn job_ids_are_unique() {
        assert_ne!(JobId::new(), JobId::new());
    }

    #[test]
    fn job_builder_keeps_metadata() {
        let job = Job::new("echo", "hello").with_metadata(Some("m1".into()));
        assert_eq!(job.stream, "echo");
        assert_eq!(job.document, "hello");
        assert_eq!(job.metadata.as_deref(), Some("m1"));
    }
}
