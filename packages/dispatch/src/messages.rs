//! Message types for the worker pool supervisor.

use ractor::RpcReplyPort;
use serde::Serialize;

/// Messages handled by a stream's pool supervisor.
#[derive(Debug)]
pub enum PoolMessage {
    /// A worker's pipeline context failed and needs rebuilding.
    WorkerFailed { slot: usize, error: String },
    /// A worker ran out of jobs and exited normally.
    WorkerExited { slot: usize },
    /// Backoff elapsed; start a fresh worker in the slot.
    Respawn { slot: usize },
    /// Report the state of every slot.
    GetSlots { reply: RpcReplyPort<Vec<SlotStatus>> },
}

/// Lifecycle state of a worker slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Running,
    /// Waiting out the backoff before a respawn.
    Restarting,
    Terminated,
    /// Restart budget exhausted.
    GivenUp,
}
