//! Event types for observing the dispatch engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::JobId;

/// Events emitted by streams and their worker pools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DispatchEvent {
    // Stream events
    /// A stream was registered and its workers started.
    StreamRegistered {
        stream: String,
        workers: usize,
        timestamp: DateTime<Utc>,
    },
    /// A stream stopped accepting jobs.
    StreamShutdown {
        stream: String,
        forced: bool,
        timestamp: DateTime<Utc>,
    },
    /// A worker slot exhausted its restart budget.
    StreamDegraded {
        stream: String,
        slot: usize,
        live_workers: usize,
        timestamp: DateTime<Utc>,
    },

    // Job events
    /// A job was accepted into a stream's queue.
    JobSubmitted {
        job_id: JobId,
        stream: String,
        timestamp: DateTime<Utc>,
    },
    /// A job's pipeline run finished and its result was delivered.
    JobCompleted {
        job_id: JobId,
        stream: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// A job's pipeline run failed.
    JobFailed {
        job_id: JobId,
        stream: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// A job was dropped without a result.
    JobAbandoned {
        job_id: JobId,
        stream: String,
        timestamp: DateTime<Utc>,
    },

    // Worker events
    /// A crashed worker is about to be rebuilt.
    WorkerRestarting {
        stream: String,
        slot: usize,
        attempt: u32,
        backoff_ms: u64,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl DispatchEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            DispatchEvent::StreamRegistered { timestamp, .. } => *timestamp,
            DispatchEvent::StreamShutdown { timestamp, .. } => *timestamp,
            DispatchEvent::StreamDegraded { timestamp, .. } => *timestamp,
            DispatchEvent::JobSubmitted { timestamp, .. } => *timestamp,
            DispatchEvent::JobCompleted { timestamp, .. } => *timestamp,
            DispatchEvent::JobFailed { timestamp, .. } => *timestamp,
            DispatchEvent::JobAbandoned { timestamp, .. } => *timestamp,
            DispatchEvent::WorkerRestarting { timestamp, .. } => *timestamp,
        }
    }

    /// Get the stream this event belongs to.
    pub fn stream(&self) -> &str {
        match self {
            DispatchEvent::StreamRegistered { stream, .. }
            | DispatchEvent::StreamShutdown { stream, .. }
            | DispatchEvent::StreamDegraded { stream, .. }
            | DispatchEvent::JobSubmitted { stream, .. }
            | DispatchEvent::JobCompleted { stream, .. }
            | DispatchEvent::JobFailed { stream, .. }
            | DispatchEvent::JobAbandoned { stream, .. }
            | DispatchEvent::WorkerRestarting { stream, .. } => stream,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            DispatchEvent::JobSubmitted { job_id, .. } => Some(*job_id),
            DispatchEvent::JobCompleted { job_id, .. } => Some(*job_id),
            DispatchEvent::JobFailed { job_id, .. } => Some(*job_id),
            DispatchEvent::JobAbandoned { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            DispatchEvent::StreamRegistered {
                stream, workers, ..
            } => format!("Stream '{}' registered with {} workers", stream, workers),
            DispatchEvent::StreamShutdown { stream, forced, .. } => {
                let how = if *forced { "forcefully" } else { "gracefully" };
                format!("Stream '{}' shut down {}", stream, how)
            }
            DispatchEvent::StreamDegraded {
                stream,
                slot,
                live_workers,
                ..
            } => format!(
                "Stream '{}' degraded: slot {} given up, {} workers left",
                stream, slot, live_workers
            ),
            DispatchEvent::JobSubmitted { job_id, stream, .. } => {
                format!("Job {} submitted to '{}'", job_id, stream)
            }
            DispatchEvent::JobCompleted {
                job_id,
                duration_ms,
                ..
            } => format!("Job {} completed in {}ms", job_id, duration_ms),
            DispatchEvent::JobFailed { job_id, error, .. } => {
                format!("Job {} failed: {}", job_id, error)
            }
            DispatchEvent::JobAbandoned { job_id, .. } => format!("Job {} abandoned", job_id),
            DispatchEvent::WorkerRestarting {
                stream,
                slot,
                attempt,
                backoff_ms,
                ..
            } => format!(
                "Worker {}-{} restarting (attempt {}) in {}ms",
                stream, slot, attempt, backoff_ms
            ),
        }
    }
}
