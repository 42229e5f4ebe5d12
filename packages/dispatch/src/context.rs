//! Process-wide state shared by every stream.

use std::sync::Arc;

use stream_core::DispatchEvent;
use tokio::sync::broadcast;

use crate::correlator::JobCorrelator;

/// Shared state handed to each stream at construction.
///
/// Owns the job correlator and the event channel. Clones share the same
/// underlying state.
#[derive(Clone)]
pub struct DispatchContext {
    correlator: Arc<JobCorrelator>,
    event_tx: broadcast::Sender<DispatchEvent>,
}

impl DispatchContext {
    /// Create a context whose event channel buffers `event_capacity` events.
    pub fn new(event_capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(event_capacity.max(1));
        Self {
            correlator: Arc::new(JobCorrelator::new()),
            event_tx,
        }
    }

    pub fn correlator(&self) -> &Arc<JobCorrelator> {
        &self.correlator
    }

    /// Subscribe to dispatch events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.event_tx.subscribe()
    }

    /// Broadcast an event. Having no subscribers is not an error.
    pub fn emit(&self, event: DispatchEvent) {
        tracing::trace!("{}", event.description());
        let _ = self.event_tx.send(event);
    }
}

impl Default for DispatchContext {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl std::fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchContext")
            .field("pending_jobs", &self.correlator.len())
            .field("subscribers", &self.event_tx.receiver_count())
            .finish()
    }
}
