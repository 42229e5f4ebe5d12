//! The per-run work buffer shared by pipeline stages and its owned snapshot.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Job, JobId};

/// Mutable state for the document currently moving through a pipeline.
///
/// A worker keeps one buffer for its whole run and resets it between
/// documents, so nothing may hold on to it past the current document.
/// Use [`WorkBuffer::snapshot`] to hand results across threads.
#[derive(Debug, Default)]
pub struct WorkBuffer {
    job_id: Option<JobId>,
    document: String,
    metadata: Option<String>,
    submitted_at: Option<DateTime<Utc>>,
    annotations: BTreeMap<String, serde_json::Value>,
}

impl WorkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a job into the buffer, replacing whatever was there.
    pub fn load(&mut self, job: Job) {
        self.reset();
        self.job_id = Some(job.id);
        self.document = job.document;
        self.metadata = job.metadata;
        self.submitted_at = Some(job.created_at);
    }

    /// Clear the buffer for the next document.
    pub fn reset(&mut self) {
        self.job_id = None;
        self.document.clear();
        self.metadata = None;
        self.submitted_at = None;
        self.annotations.clear();
    }

    pub fn job_id(&self) -> Option<JobId> {
        self.job_id
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn set_document(&mut self, document: impl Into<String>) {
        self.document = document.into();
    }

    pub fn metadata(&self) -> Option<&str> {
        self.metadata.as_deref()
    }

    pub fn set_metadata(&mut self, metadata: Option<String>) {
        self.metadata = metadata;
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    /// Record a stage output under `key`, replacing any previous value.
    pub fn annotate(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.annotations.insert(key.into(), value);
    }

    pub fn annotation(&self, key: &str) -> Option<&serde_json::Value> {
        self.annotations.get(key)
    }

    /// Deep copy of the buffer that stays valid after the buffer is reset.
    pub fn snapshot(&self) -> Option<Snapshot> {
        Some(Snapshot {
            job_id: self.job_id?,
            document: self.document.clone(),
            metadata: self.metadata.clone(),
            submitted_at: self.submitted_at.unwrap_or_else(Utc::now),
            completed_at: Utc::now(),
            annotations: self.annotations.clone(),
        })
    }
}

/// Owned, immutable result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub job_id: JobId,
    pub document: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, serde_json::Value>,
}

impl Snapshot {
    pub fn annotation(&self, key: &str) -> Option<&serde_json::Value> {
        self.annotations.get(key)
    }

    /// Time between submission and completion in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        (self.completed_at - self.submitted_at)
            .num_milliseconds()
            .max(0) as u64
    }
}
