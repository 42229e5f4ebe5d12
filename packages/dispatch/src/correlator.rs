//! Correlates submitted jobs with the results their pipeline run produces.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use stream_core::{JobId, Snapshot};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::error::{DispatchError, JobError};

/// Final value of a job: the output snapshot or the reason it failed.
pub type JobOutcome = Result<Snapshot, JobError>;

/// Caller-side handle to a job's eventual result.
///
/// Await it from async code or call [`PendingResult::wait`] from a plain
/// thread. If the resolving side is dropped without a value (forceful
/// shutdown) the handle yields [`JobError::Abandoned`].
#[derive(Debug)]
pub struct PendingResult {
    job_id: JobId,
    rx: oneshot::Receiver<JobOutcome>,
}

impl PendingResult {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Take the outcome if it has arrived. Returns `None` while pending.
    pub fn try_result(&mut self) -> Option<JobOutcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(JobError::Abandoned)),
        }
    }

    /// Block the current thread until the outcome arrives.
    ///
    /// Must not be called from inside an async runtime worker.
    pub fn wait(self) -> JobOutcome {
        self.rx.blocking_recv().unwrap_or(Err(JobError::Abandoned))
    }
}

impl Future for PendingResult {
    type Output = JobOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(JobError::Abandoned)))
    }
}

/// Resolving half of a pending result. Consumed by the first resolution.
#[derive(Debug)]
pub struct Completion {
    job_id: JobId,
    tx: oneshot::Sender<JobOutcome>,
}

impl Completion {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Deliver a successful result. Returns false if the caller stopped waiting.
    pub fn succeed(self, snapshot: Snapshot) -> bool {
        self.tx.send(Ok(snapshot)).is_ok()
    }

    /// Deliver a failure. Returns false if the caller stopped waiting.
    pub fn fail(self, error: JobError) -> bool {
        self.tx.send(Err(error)).is_ok()
    }
}

/// Shared map from job identifier to the completion waiting for it.
///
/// The submission path registers entries; the terminal pipeline stage (or
/// the worker, on failure) removes them exactly once.
#[derive(Debug, Default)]
pub struct JobCorrelator {
    pending: Mutex<HashMap<JobId, Completion>>,
}

impl JobCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, Completion>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a job and return the handle its submitter will wait on.
    ///
    /// Fails with [`DispatchError::DuplicateJob`] if the identifier is
    /// already pending; the existing entry is left untouched.
    pub fn register(&self, job_id: JobId) -> Result<PendingResult, DispatchError> {
        match self.lock().entry(job_id) {
            Entry::Occupied(_) => Err(DispatchError::DuplicateJob(job_id)),
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(Completion { job_id, tx });
                Ok(PendingResult { job_id, rx })
            }
        }
    }

    /// Remove and return the completion for `job_id`, if still pending.
    pub fn resolve(&self, job_id: JobId) -> Option<Completion> {
        self.lock().remove(&job_id)
    }

    pub fn contains(&self, job_id: JobId) -> bool {
        self.lock().contains_key(&job_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
