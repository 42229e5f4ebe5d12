//! Terminal pipeline stage that hands finished documents back to callers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use stream_core::{DispatchEvent, JobId, WorkBuffer};

use crate::context::DispatchContext;
use crate::engine::Stage;
use crate::error::{JobError, StageError};

/// Resolves job outcomes for one stream.
///
/// Shared by every worker of the stream. Once the stream is aborted, jobs
/// reaching the sink are abandoned instead of resolved.
#[derive(Debug, Clone)]
pub struct ResultSink {
    stream: String,
    ctx: DispatchContext,
    aborted: Arc<AtomicBool>,
}

impl ResultSink {
    pub fn new(stream: impl Into<String>, ctx: DispatchContext, aborted: Arc<AtomicBool>) -> Self {
        Self {
            stream: stream.into(),
            ctx,
            aborted,
        }
    }

    /// A sink with its own abort flag, for running pipelines outside a stream.
    pub fn detached(stream: impl Into<String>, ctx: DispatchContext) -> Self {
        Self::new(stream, ctx, Arc::new(AtomicBool::new(false)))
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Deliver the buffer's current contents as the job's result.
    ///
    /// A job with no pending entry (already resolved, or never registered)
    /// is ignored.
    pub fn complete(&self, buffer: &WorkBuffer) -> Result<(), StageError> {
        let snapshot = buffer
            .snapshot()
            .ok_or_else(|| StageError::new(ResultHandler::NAME, "buffer holds no job"))?;
        let job_id = snapshot.job_id;

        let Some(completion) = self.ctx.correlator().resolve(job_id) else {
            tracing::warn!("No pending result for job {} on stream {}", job_id, self.stream);
            return Ok(());
        };

        if self.is_aborted() {
            drop(completion);
            self.emit_abandoned(job_id);
            return Ok(());
        }

        let duration_ms = snapshot.duration_ms();
        if !completion.succeed(snapshot) {
            tracing::debug!("Caller stopped waiting for job {}", job_id);
        }
        self.ctx.emit(DispatchEvent::JobCompleted {
            job_id,
            stream: self.stream.clone(),
            duration_ms,
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }

    /// Fail a job with `error`. Does nothing without a job id or pending entry.
    pub fn fail(&self, job_id: Option<JobId>, error: JobError) {
        let Some(job_id) = job_id else {
            tracing::warn!("Stream {} failed a document with no job: {}", self.stream, error);
            return;
        };
        let Some(completion) = self.ctx.correlator().resolve(job_id) else {
            return;
        };
        if self.is_aborted() {
            drop(completion);
            self.emit_abandoned(job_id);
            return;
        }

        tracing::warn!("Job {} on stream {} failed: {}", job_id, self.stream, error);
        let message = error.to_string();
        completion.fail(error);
        self.ctx.emit(DispatchEvent::JobFailed {
            job_id,
            stream: self.stream.clone(),
            error: message,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Drop a job's pending entry so its caller sees it as abandoned.
    pub fn abandon(&self, job_id: JobId) {
        if self.ctx.correlator().resolve(job_id).is_some() {
            self.emit_abandoned(job_id);
        }
    }

    fn emit_abandoned(&self, job_id: JobId) {
        tracing::warn!("Abandoning job {} on stream {}", job_id, self.stream);
        self.ctx.emit(DispatchEvent::JobAbandoned {
            job_id,
            stream: self.stream.clone(),
            timestamp: chrono::Utc::now(),
        });
    }
}

/// Last stage of every stream pipeline.
pub struct ResultHandler {
    sink: ResultSink,
}

impl ResultHandler {
    pub const NAME: &'static str = "result-handler";

    pub fn new(sink: ResultSink) -> Self {
        Self { sink }
    }
}

impl Stage for ResultHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn process(&mut self, buffer: &mut WorkBuffer) -> Result<(), StageError> {
        self.sink.complete(buffer)
    }
}
