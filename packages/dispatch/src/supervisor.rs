//! Supervisor actor that keeps a stream's worker pool at strength.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use chrono::Utc;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use stream_core::{DispatchEvent, RestartPolicy};

use crate::messages::{PoolMessage, SlotStatus};
use crate::worker::{WorkerShared, spawn_worker};

/// Arguments for starting a pool supervisor.
pub struct PoolArgs {
    pub shared: Arc<WorkerShared>,
    pub workers: usize,
    pub restart: RestartPolicy,
}

struct Slot {
    status: SlotStatus,
    /// Restarts since the slot last ran long enough to count as stable.
    consecutive: u32,
    started_at: Instant,
    _handle: Option<JoinHandle<()>>,
}

/// State for the pool supervisor.
pub struct PoolSupervisorState {
    shared: Arc<WorkerShared>,
    restart: RestartPolicy,
    slots: Vec<Slot>,
}

impl PoolSupervisorState {
    fn stream(&self) -> &str {
        &self.shared.stream
    }

    fn set_status(&mut self, slot: usize, status: SlotStatus) {
        if let Some(s) = self.slots.get_mut(slot) {
            s.status = status;
        }
    }

    /// Retire a slot without restarting it; stops the actor once none are live.
    fn retire(&mut self, myself: &ActorRef<PoolMessage>, slot: usize) {
        self.set_status(slot, SlotStatus::Terminated);
        if self.shared.pool.slot_terminated() == 0 {
            myself.stop(None);
        }
    }

    fn give_up(&mut self, myself: &ActorRef<PoolMessage>, slot: usize) {
        self.set_status(slot, SlotStatus::GivenUp);
        let live = self.shared.pool.slot_given_up();
        tracing::error!(
            "Worker {} of stream {} exceeded {} restarts; giving up ({} workers left)",
            slot,
            self.stream(),
            self.restart.max_restarts,
            live
        );
        self.shared.ctx.emit(DispatchEvent::StreamDegraded {
            stream: self.stream().to_string(),
            slot,
            live_workers: live,
            timestamp: Utc::now(),
        });

        if live == 0 {
            let abandoned = self.shared.abandon_queued();
            if abandoned > 0 {
                tracing::warn!(
                    "Stream {} has no workers left; abandoned {} queued jobs",
                    self.stream(),
                    abandoned
                );
            }
            myself.stop(None);
        }
    }
}

/// Supervisor actor owning the worker threads of one stream.
///
/// Workers report failures here. A failed slot is respawned after an
/// exponential backoff until its consecutive restart budget runs out, at
/// which point the slot is given up.
pub struct PoolSupervisor;

impl Actor for PoolSupervisor {
    type Msg = PoolMessage;
    type State = PoolSupervisorState;
    type Arguments = PoolArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            "Starting worker pool for stream {} with {} workers",
            args.shared.stream,
            args.workers
        );

        let mut slots = Vec::with_capacity(args.workers);
        for slot in 0..args.workers {
            let handle = spawn_worker(slot, args.shared.clone(), myself.clone()).map_err(|e| {
                ActorProcessingErr::from(format!("Failed to spawn worker {}: {}", slot, e))
            })?;
            slots.push(Slot {
                status: SlotStatus::Running,
                consecutive: 0,
                started_at: Instant::now(),
                _handle: Some(handle),
            });
        }

        Ok(PoolSupervisorState {
            shared: args.shared,
            restart: args.restart,
            slots,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            PoolMessage::WorkerExited { slot } => {
                // The worker already released its live count.
                state.set_status(slot, SlotStatus::Terminated);
                if state.shared.pool.live() == 0 {
                    myself.stop(None);
                }
            }

            PoolMessage::WorkerFailed { slot, error } => {
                if state.shared.is_aborted() {
                    state.retire(&myself, slot);
                    return Ok(());
                }

                let stable_after = state.restart.stable_after();
                let max_restarts = state.restart.max_restarts;
                let Some(entry) = state.slots.get_mut(slot) else {
                    tracing::warn!("Failure reported for unknown slot {}", slot);
                    return Ok(());
                };
                if entry.started_at.elapsed() >= stable_after {
                    entry.consecutive = 0;
                }
                if entry.consecutive >= max_restarts {
                    state.give_up(&myself, slot);
                    return Ok(());
                }

                entry.consecutive += 1;
                entry.status = SlotStatus::Restarting;
                let attempt = entry.consecutive;
                let backoff = state.restart.backoff(attempt);
                state.shared.pool.record_restart();

                tracing::warn!(
                    "Restarting worker {} of stream {} in {:?} (attempt {}/{})",
                    slot,
                    state.stream(),
                    backoff,
                    attempt,
                    max_restarts
                );
                state.shared.ctx.emit(DispatchEvent::WorkerRestarting {
                    stream: state.stream().to_string(),
                    slot,
                    attempt,
                    backoff_ms: backoff.as_millis() as u64,
                    error,
                    timestamp: Utc::now(),
                });

                let myself_clone = myself.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(backoff).await;
                    let _ = myself_clone.send_message(PoolMessage::Respawn { slot });
                });
            }

            PoolMessage::Respawn { slot } => {
                if state.shared.is_aborted() {
                    state.retire(&myself, slot);
                    return Ok(());
                }

                match spawn_worker(slot, state.shared.clone(), myself.clone()) {
                    Ok(handle) => {
                        if let Some(entry) = state.slots.get_mut(slot) {
                            entry.status = SlotStatus::Running;
                            entry.started_at = Instant::now();
                            entry._handle = Some(handle);
                        }
                    }
                    Err(e) => {
                        if let Some(entry) = state.slots.get_mut(slot) {
                            entry.started_at = Instant::now();
                        }
                        myself.send_message(PoolMessage::WorkerFailed {
                            slot,
                            error: format!("Failed to spawn worker: {}", e),
                        })?;
                    }
                }
            }

            PoolMessage::GetSlots { reply } => {
                let statuses = state.slots.iter().map(|s| s.status).collect();
                let _ = reply.send(statuses);
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!("Worker pool for stream {} stopped", state.stream());
        Ok(())
    }
}
