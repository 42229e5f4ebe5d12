//! Collection reader that pulls jobs from a stream's queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use stream_core::{Job, WorkBuffer};

use crate::engine::CollectionReader;
use crate::error::EngineError;
use crate::queue::{JobQueue, Take};

/// Adapts a [`JobQueue`] to the pull interface of the pipeline engine.
///
/// `has_next` blocks on the queue and stages the job it takes; `get_next`
/// loads that job into the work buffer. The reader reports exhaustion once
/// the queue is closed and drained, or immediately after an abort.
pub struct StreamReader {
    queue: Arc<JobQueue>,
    aborted: Arc<AtomicBool>,
    current: Option<Job>,
}

impl StreamReader {
    pub fn new(queue: Arc<JobQueue>, aborted: Arc<AtomicBool>) -> Self {
        Self {
            queue,
            aborted,
            current: None,
        }
    }

    /// True once no more jobs can arrive.
    pub fn should_terminate(&self) -> bool {
        self.aborted.load(Ordering::SeqCst) || (self.queue.is_closed() && self.queue.is_empty())
    }
}

impl CollectionReader for StreamReader {
    fn has_next(&mut self) -> bool {
        if self.current.is_some() {
            return true;
        }
        if self.aborted.load(Ordering::SeqCst) {
            return false;
        }
        match self.queue.take() {
            Take::Job(job) => {
                self.current = Some(job);
                true
            }
            Take::Closed => false,
        }
    }

    fn get_next(&mut self, buffer: &mut WorkBuffer) -> Result<(), EngineError> {
        let job = self.current.take().ok_or(EngineError::NoStagedJob)?;
        tracing::trace!("Loading job {} from {}", job.id, self.queue.name());
        buffer.load(job);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::queue::Offer;

    fn setup() -> (Arc<JobQueue>, Arc<AtomicBool>, StreamReader) {
        let queue = Arc::new(JobQueue::new("r", 4, Duration::from_millis(20)));
        let aborted = Arc::new(AtomicBool::new(false));
        let reader = StreamReader::new(queue.clone(), aborted.clone());
        (queue, aborted, reader)
    }

    #[test]
    fn stages_then_loads_job() {
        let (queue, _aborted, mut reader) = setup();
        let job = Job::new("r", "hello");
        let id = job.id;
        assert!(matches!(queue.offer(job, Duration::ZERO), Offer::Accepted));

        assert!(reader.has_next());
        // Repeated calls keep the same staged job.
        assert!(reader.has_next());
        let mut buffer = WorkBuffer::new();
        reader.get_next(&mut buffer).unwrap();
        assert_eq!(buffer.job_id(), Some(id));
        assert_eq!(buffer.document(), "hello");
    }

    #[test]
    fn get_next_without_staged_job_fails() {
        let (_queue, _aborted, mut reader) = setup();
        let mut buffer = WorkBuffer::new();
        assert!(matches!(
            reader.get_next(&mut buffer),
            Err(EngineError::NoStagedJob)
        ));
    }

    #[test]
    fn closed_and_drained_queue_terminates() {
        let (queue, _aborted, mut reader) = setup();
        assert!(!reader.should_terminate());
        queue.close().unwrap();
        assert!(reader.should_terminate());
        assert!(!reader.has_next());
    }

    #[test]
    fn abort_stops_reading_even_with_queued_jobs() {
        let (queue, aborted, mut reader) = setup();
        assert!(matches!(
            queue.offer(Job::new("r", "x"), Duration::ZERO),
            Offer::Accepted
        ));
        aborted.store(true, Ordering::SeqCst);
        assert!(reader.should_terminate());
        assert!(!reader.has_next());
    }
}
