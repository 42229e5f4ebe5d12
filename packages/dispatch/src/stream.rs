//! A named stream: queue, worker pool and submission front end.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use ractor::{Actor, ActorRef};
use stream_core::{DispatchEvent, Job, JobId, StreamConfig};
use tokio::task::JoinHandle;

use crate::context::DispatchContext;
use crate::correlator::PendingResult;
use crate::engine::PipelineDescriptor;
use crate::error::{DispatchError, DispatchResult};
use crate::messages::{PoolMessage, SlotStatus};
use crate::queue::{JobQueue, Offer};
use crate::sink::ResultSink;
use crate::supervisor::{PoolArgs, PoolSupervisor};
use crate::worker::{PoolHealth, PoolState, WorkerShared};

struct StreamInner {
    name: String,
    config: StreamConfig,
    shared: Arc<WorkerShared>,
    ctx: DispatchContext,
    supervisor: ActorRef<PoolMessage>,
}

/// Handle to a running stream. Clones share the same stream.
///
/// Jobs submitted here are queued and picked up by a fixed set of worker
/// threads, each running its own instance of the stream's pipeline.
#[derive(Clone)]
pub struct Stream {
    inner: Arc<StreamInner>,
}

impl Stream {
    /// Build the stream's queue and start its workers.
    ///
    /// The name is normalized to lowercase. Must be called from within a
    /// Tokio runtime.
    pub async fn start(
        name: &str,
        config: StreamConfig,
        descriptor: PipelineDescriptor,
        ctx: DispatchContext,
    ) -> DispatchResult<Stream> {
        let name = name.to_lowercase();
        let construction = |reason: String| DispatchError::StreamConstruction {
            name: name.clone(),
            reason,
        };

        config.validate().map_err(|e| construction(e.to_string()))?;
        descriptor.validate().map_err(|e| construction(e.to_string()))?;

        let queue = Arc::new(JobQueue::new(
            name.clone(),
            config.queue_capacity,
            config.poll_interval(),
        ));
        let aborted = Arc::new(AtomicBool::new(false));
        let shared = Arc::new(WorkerShared {
            stream: name.clone(),
            queue: queue.clone(),
            descriptor,
            sink: ResultSink::new(name.clone(), ctx.clone(), aborted.clone()),
            ctx: ctx.clone(),
            aborted: aborted.clone(),
            pool: Arc::new(PoolState::new(config.workers)),
        });

        let args = PoolArgs {
            shared: shared.clone(),
            workers: config.workers,
            restart: config.restart.clone(),
        };
        let supervisor = match Actor::spawn(None, PoolSupervisor, args).await {
            Ok((actor, _handle)) => actor,
            Err(e) => {
                aborted.store(true, Ordering::SeqCst);
                queue.abort();
                return Err(construction(e.to_string()));
            }
        };

        tracing::info!("Started stream {} with {} workers", name, config.workers);
        Ok(Stream {
            inner: Arc::new(StreamInner {
                name,
                config,
                shared,
                ctx,
                supervisor,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }

    /// Submit a document with a fresh job id.
    ///
    /// Blocks while the queue is full. Fails once the stream is shut down
    /// or has no workers left.
    pub fn submit(
        &self,
        document: impl Into<String>,
        metadata: Option<String>,
    ) -> DispatchResult<PendingResult> {
        self.submit_job(Job::new(self.name(), document).with_metadata(metadata))
    }

    /// Submit a document under a caller-chosen job id.
    pub fn submit_with_id(
        &self,
        job_id: JobId,
        document: impl Into<String>,
        metadata: Option<String>,
    ) -> DispatchResult<PendingResult> {
        self.submit_job(Job::with_id(job_id, self.name(), document).with_metadata(metadata))
    }

    fn submit_job(&self, mut job: Job) -> DispatchResult<PendingResult> {
        let shared = &self.inner.shared;
        if shared.queue.is_closed() {
            return Err(DispatchError::StreamClosed(self.inner.name.clone()));
        }
        if shared.pool.is_degraded() {
            return Err(DispatchError::StreamDegraded(self.inner.name.clone()));
        }

        let job_id = job.id;
        let correlator = self.inner.ctx.correlator();
        let pending = correlator.register(job_id)?;

        loop {
            match shared.queue.offer(job, self.inner.config.enqueue_timeout()) {
                Offer::Accepted => break,
                Offer::TimedOut(returned) => {
                    if shared.pool.is_degraded() {
                        correlator.resolve(job_id);
                        return Err(DispatchError::StreamDegraded(self.inner.name.clone()));
                    }
                    tracing::debug!(
                        "Queue for stream {} is full; retrying job {}",
                        self.inner.name,
                        job_id
                    );
                    job = returned;
                }
                Offer::Closed(_) => {
                    correlator.resolve(job_id);
                    return Err(DispatchError::StreamClosed(self.inner.name.clone()));
                }
            }
        }

        self.inner.ctx.emit(DispatchEvent::JobSubmitted {
            job_id,
            stream: self.inner.name.clone(),
            timestamp: Utc::now(),
        });

        // The last worker may have been given up while we were enqueueing.
        if shared.pool.is_degraded() {
            shared.abandon_queued();
        }
        Ok(pending)
    }

    /// Stop accepting jobs and block until every queued job has been processed.
    pub fn shutdown(&self) -> DispatchResult<()> {
        self.begin_shutdown()?;
        self.inner.await_termination();
        Ok(())
    }

    /// Stop accepting jobs and wait for the workers on a blocking task.
    ///
    /// Returns immediately; the handle completes once the stream has
    /// drained. Must be called from within a Tokio runtime.
    pub fn shutdown_async(&self) -> DispatchResult<JoinHandle<()>> {
        self.begin_shutdown()?;
        let inner = self.inner.clone();
        Ok(tokio::task::spawn_blocking(move || inner.await_termination()))
    }

    /// Stop immediately. Queued and in-flight jobs are abandoned.
    ///
    /// An abandoned job never gets a snapshot or a processing error: its
    /// pending result completes with [`crate::JobError::Abandoned`]. Callers that
    /// only wait for success will see that error instead. An in-flight job
    /// still runs its remaining stages before it is abandoned, because a
    /// running stage cannot be interrupted.
    ///
    /// Returns the number of queued jobs that were dropped.
    pub fn shutdown_now(&self) -> usize {
        self.inner.abort()
    }

    fn begin_shutdown(&self) -> DispatchResult<()> {
        self.inner
            .shared
            .queue
            .close()
            .map_err(|_| DispatchError::AlreadyShutdown(self.inner.name.clone()))?;
        tracing::info!(
            "Shutting down stream {} ({} jobs queued)",
            self.inner.name,
            self.queued()
        );
        self.inner.ctx.emit(DispatchEvent::StreamShutdown {
            stream: self.inner.name.clone(),
            forced: false,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Number of jobs waiting in the queue.
    pub fn queued(&self) -> usize {
        self.inner.shared.queue.len()
    }

    pub fn health(&self) -> PoolHealth {
        self.inner.shared.pool.health()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shared.queue.is_closed()
    }

    pub fn is_degraded(&self) -> bool {
        self.inner.shared.pool.is_degraded()
    }

    /// Per-slot worker states, or an empty list once the pool has stopped.
    pub async fn slot_statuses(&self) -> Vec<SlotStatus> {
        let result = ractor::rpc::call(
            &self.inner.supervisor,
            |reply| PoolMessage::GetSlots { reply },
            Some(Duration::from_secs(5)),
        )
        .await;
        match result {
            Ok(ractor::rpc::CallResult::Success(statuses)) => statuses,
            _ => Vec::new(),
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("name", &self.inner.name)
            .field("queued", &self.queued())
            .field("health", &self.health())
            .finish()
    }
}

impl StreamInner {
    fn await_termination(&self) {
        let pool = &self.shared.pool;
        while !pool.wait_terminated(self.config.shutdown_poll()) {
            tracing::info!(
                "Waiting for stream {} to finish: {} workers live, {} jobs queued",
                self.name,
                pool.live(),
                self.shared.queue.len()
            );
        }

        // Jobs stranded by given-up workers never get a result otherwise.
        let abandoned = self.shared.abandon_queued();
        if abandoned > 0 {
            tracing::warn!("Stream {} abandoned {} unprocessed jobs", self.name, abandoned);
        }
        tracing::info!("Stream {} shut down", self.name);
    }

    fn abort(&self) -> usize {
        if self.shared.aborted.swap(true, Ordering::SeqCst) {
            return 0;
        }
        let drained = self.shared.queue.abort();
        for job in &drained {
            self.shared.sink.abandon(job.id);
        }
        tracing::warn!(
            "Stream {} stopped forcefully; {} queued jobs abandoned",
            self.name,
            drained.len()
        );
        self.ctx.emit(DispatchEvent::StreamShutdown {
            stream: self.name.clone(),
            forced: true,
            timestamp: Utc::now(),
        });
        drained.len()
    }
}

impl Drop for StreamInner {
    fn drop(&mut self) {
        if !self.shared.queue.is_closed() {
            self.abort();
        }
    }
}
