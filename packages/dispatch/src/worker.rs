//! Worker threads that run a stream's pipeline.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use ractor::ActorRef;
use serde::Serialize;

use crate::context::DispatchContext;
use crate::engine::{PipelineDescriptor, run_pipeline};
use crate::error::{EngineError, panic_message};
use crate::messages::PoolMessage;
use crate::queue::JobQueue;
use crate::reader::StreamReader;
use crate::sink::ResultSink;

#[derive(Debug)]
struct PoolCounts {
    workers: usize,
    live: usize,
    restarts: u64,
    rebuilds: u64,
    given_up: usize,
}

/// Live-worker accounting shared by a stream, its supervisor and its workers.
///
/// A slot counts as live from spawn until it exits for good or is given
/// up; restarts keep it live.
#[derive(Debug)]
pub struct PoolState {
    counts: Mutex<PoolCounts>,
    terminated: Condvar,
}

impl PoolState {
    pub fn new(workers: usize) -> Self {
        Self {
            counts: Mutex::new(PoolCounts {
                workers,
                live: workers,
                restarts: 0,
                rebuilds: 0,
                given_up: 0,
            }),
            terminated: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolCounts> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark a slot as finished. Returns the remaining live count.
    pub fn slot_terminated(&self) -> usize {
        let live = {
            let mut counts = self.lock();
            counts.live = counts.live.saturating_sub(1);
            counts.live
        };
        self.terminated.notify_all();
        live
    }

    /// Mark a slot as given up. Returns the remaining live count.
    pub fn slot_given_up(&self) -> usize {
        let live = {
            let mut counts = self.lock();
            counts.live = counts.live.saturating_sub(1);
            counts.given_up += 1;
            counts.live
        };
        self.terminated.notify_all();
        live
    }

    pub fn record_restart(&self) {
        self.lock().restarts += 1;
    }

    /// Count an in-thread pipeline rebuild after a job's stage panicked.
    pub fn record_rebuild(&self) {
        self.lock().rebuilds += 1;
    }

    pub fn live(&self) -> usize {
        self.lock().live
    }

    /// True when slots were given up and none are left running.
    pub fn is_degraded(&self) -> bool {
        let counts = self.lock();
        counts.given_up > 0 && counts.live == 0
    }

    /// Wait up to `timeout` for every slot to finish. Returns true if they have.
    pub fn wait_terminated(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut counts = self.lock();
        while counts.live > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            counts = self
                .terminated
                .wait_timeout(counts, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    pub fn health(&self) -> PoolHealth {
        let counts = self.lock();
        PoolHealth {
            workers: counts.workers,
            live_workers: counts.live,
            restarts: counts.restarts,
            rebuilds: counts.rebuilds,
            given_up: counts.given_up,
            degraded: counts.given_up > 0 && counts.live == 0,
        }
    }
}

/// Point-in-time view of a worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolHealth {
    pub workers: usize,
    pub live_workers: usize,
    /// Supervisor restarts after failures not tied to a job.
    pub restarts: u64,
    /// Pipelines rebuilt in place after a stage panicked on a job.
    pub rebuilds: u64,
    pub given_up: usize,
    pub degraded: bool,
}

/// Everything a worker needs to build and run its pipeline.
#[derive(Debug)]
pub struct WorkerShared {
    pub stream: String,
    pub queue: Arc<JobQueue>,
    pub descriptor: PipelineDescriptor,
    pub sink: ResultSink,
    pub ctx: DispatchContext,
    pub aborted: Arc<AtomicBool>,
    pub pool: Arc<PoolState>,
}

impl WorkerShared {
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Abandon every queued job. Used when no worker is left to run them.
    pub fn abandon_queued(&self) -> usize {
        let drained = self.queue.drain();
        for job in &drained {
            self.sink.abandon(job.id);
        }
        drained.len()
    }
}

/// Start a named worker thread for `slot`.
pub fn spawn_worker(
    slot: usize,
    shared: Arc<WorkerShared>,
    supervisor: ActorRef<PoolMessage>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("{}-worker-{}", shared.stream, slot))
        .spawn(move || run_worker(slot, shared, supervisor))
}

fn run_worker(slot: usize, shared: Arc<WorkerShared>, supervisor: ActorRef<PoolMessage>) {
    tracing::debug!("Starting worker {} of stream {}", slot, shared.stream);

    let error = match panic::catch_unwind(AssertUnwindSafe(|| drive(slot, &shared))) {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(err.to_string()),
        Err(payload) => Some(format!("worker panicked: {}", panic_message(payload.as_ref()))),
    };

    match error {
        None => {
            tracing::debug!("Worker {} of stream {} finished", slot, shared.stream);
            shared.pool.slot_terminated();
            let _ = supervisor.send_message(PoolMessage::WorkerExited { slot });
        }
        Some(error) => {
            tracing::error!("Worker {} of stream {} failed: {}", slot, shared.stream, error);
            if supervisor
                .send_message(PoolMessage::WorkerFailed { slot, error })
                .is_err()
            {
                shared.pool.slot_terminated();
            }
        }
    }
}

/// Build and run the pipeline until the reader is exhausted.
///
/// A stage panic has already failed its job, so the stages are rebuilt in
/// place and the loop carries on without touching the restart budget. Any
/// other error ends the run and goes to the supervisor.
fn drive(slot: usize, shared: &WorkerShared) -> Result<(), EngineError> {
    loop {
        let mut pipeline = shared
            .descriptor
            .build(shared.sink.clone())
            .map_err(EngineError::Construction)?;
        let mut reader = StreamReader::new(shared.queue.clone(), shared.aborted.clone());
        match run_pipeline(&mut reader, &mut pipeline, &shared.sink) {
            Err(EngineError::Poisoned { stage, message }) => {
                tracing::warn!(
                    "Rebuilding pipeline of worker {} in stream {} after stage {} panicked: {}",
                    slot,
                    shared.stream,
                    stage,
                    message
                );
                shared.pool.record_rebuild();
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_count_tracks_exits_and_give_ups() {
        let pool = PoolState::new(2);
        assert_eq!(pool.live(), 2);
        assert!(!pool.is_degraded());

        assert_eq!(pool.slot_given_up(), 1);
        assert!(!pool.is_degraded());
        assert_eq!(pool.slot_terminated(), 0);
        assert!(pool.is_degraded());

        let health = pool.health();
        assert_eq!(health.given_up, 1);
        assert_eq!(health.live_workers, 0);
    }

    #[test]
    fn wait_terminated_times_out_while_live() {
        let pool = PoolState::new(1);
        assert!(!pool.wait_terminated(Duration::from_millis(20)));
    }

    #[test]
    fn wait_terminated_wakes_on_exit() {
        let pool = Arc::new(PoolState::new(1));
        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.wait_terminated(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        pool.slot_terminated();
        assert!(waiter.join().unwrap());
    }
}
