//! Bounded blocking job queue for a single stream.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use stream_core::Job;

use crate::error::QueueError;

/// Outcome of offering a job to the queue.
#[derive(Debug)]
pub enum Offer {
    /// The job was enqueued.
    Accepted,
    /// The queue stayed full for the whole wait; the job is handed back.
    TimedOut(Job),
    /// The queue is closed; the job is handed back.
    Closed(Job),
}

/// Outcome of taking a job from the queue.
#[derive(Debug)]
pub enum Take {
    Job(Job),
    /// The queue is closed and empty.
    Closed,
}

struct QueueInner {
    items: VecDeque<Job>,
    open: bool,
}

/// Capacity-bounded FIFO of pending jobs with an open/closed lifecycle.
///
/// Closing is one-way. After close, new offers fail immediately but
/// everything already queued can still be taken until the queue is empty.
/// Blocked takers wake every `poll_interval` to re-check the state so a
/// missed notification can only delay them, never strand them.
pub struct JobQueue {
    name: String,
    capacity: usize,
    poll_interval: Duration,
    inner: Mutex<QueueInner>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl JobQueue {
    /// Create an open queue.
    pub fn new(name: impl Into<String>, capacity: usize, poll_interval: Duration) -> Self {
        Self {
            name: name.into(),
            capacity: capacity.max(1),
            poll_interval,
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                open: true,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Try to enqueue `job`, waiting up to `timeout` for free space.
    pub fn offer(&self, job: Job, timeout: Duration) -> Offer {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();
        loop {
            if !inner.open {
                return Offer::Closed(job);
            }
            if inner.items.len() < self.capacity {
                inner.items.push_back(job);
                drop(inner);
                self.not_empty.notify_one();
                return Offer::Accepted;
            }
            let now = Instant::now();
            if now >= deadline {
                return Offer::TimedOut(job);
            }
            let wait = (deadline - now).min(self.poll_interval);
            inner = self
                .not_full
                .wait_timeout(inner, wait)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Block until a job is available or the queue is closed and drained.
    pub fn take(&self) -> Take {
        let mut inner = self.lock();
        loop {
            if let Some(job) = inner.items.pop_front() {
                drop(inner);
                self.not_full.notify_one();
                return Take::Job(job);
            }
            if !inner.open {
                return Take::Closed;
            }
            inner = self
                .not_empty
                .wait_timeout(inner, self.poll_interval)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Stop accepting jobs. Queued jobs remain takeable.
    pub fn close(&self) -> Result<(), QueueError> {
        {
            let mut inner = self.lock();
            if !inner.open {
                return Err(QueueError::AlreadyClosed);
            }
            inner.open = false;
        }
        self.not_empty.notify_all();
        self.not_full.notify_all();
        Ok(())
    }

    /// Close the queue and remove everything still in it.
    pub fn abort(&self) -> Vec<Job> {
        let drained: Vec<Job> = {
            let mut inner = self.lock();
            inner.open = false;
            inner.items.drain(..).collect()
        };
        self.not_empty.notify_all();
        self.not_full.notify_all();
        drained
    }

    /// Remove everything queued without changing the open state.
    pub fn drain(&self) -> Vec<Job> {
        let drained: Vec<Job> = self.lock().items.drain(..).collect();
        self.not_full.notify_all();
        drained
    }

    pub fn is_closed(&self) -> bool {
        !self.lock().open
    }

    /// Number of queued jobs. Advisory only; it may change immediately.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("JobQueue")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("len", &inner.items.len())
            .field("open", &inner.open)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn queue(capacity: usize) -> JobQueue {
        JobQueue::new("test", capacity, Duration::from_millis(20))
    }

    fn job(doc: &str) -> Job {
        Job::new("test", doc)
    }

    fn taken_document(take: Take) -> String {
        match take {
            Take::Job(job) => job.document,
            Take::Closed => panic!("queue unexpectedly closed"),
        }
    }

    #[test]
    fn jobs_come_out_in_fifo_order() {
        let q = queue(8);
        for doc in ["a", "b", "c"] {
            assert!(matches!(q.offer(job(doc), Duration::ZERO), Offer::Accepted));
        }
        assert_eq!(q.len(), 3);
        assert_eq!(taken_document(q.take()), "a");
        assert_eq!(taken_document(q.take()), "b");
        assert_eq!(taken_document(q.take()), "c");
    }

    #[test]
    fn full_queue_times_out_and_returns_job() {
        let q = queue(1);
        assert!(matches!(q.offer(job("a"), Duration::ZERO), Offer::Accepted));

        let started = Instant::now();
        match q.offer(job("b"), Duration::from_millis(50)) {
            Offer::TimedOut(job) => assert_eq!(job.document, "b"),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn waiting_offer_succeeds_when_space_frees_up() {
        let q = Arc::new(queue(1));
        assert!(matches!(q.offer(job("a"), Duration::ZERO), Offer::Accepted));

        let producer = {
            let q = q.clone();
            thread::spawn(move || q.offer(job("b"), Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(30));
        assert_eq!(taken_document(q.take()), "a");

        assert!(matches!(producer.join().unwrap(), Offer::Accepted));
        assert_eq!(taken_document(q.take()), "b");
    }

    #[test]
    fn closed_queue_rejects_but_drains() {
        let q = queue(8);
        assert!(matches!(q.offer(job("a"), Duration::ZERO), Offer::Accepted));
        q.close().unwrap();

        assert!(q.is_closed());
        assert!(matches!(q.offer(job("b"), Duration::from_secs(1)), Offer::Closed(_)));
        assert_eq!(taken_document(q.take()), "a");
        assert!(matches!(q.take(), Take::Closed));
        assert!(matches!(q.offer(job("c"), Duration::ZERO), Offer::Closed(_)));
    }

    #[test]
    fn closing_twice_is_an_error() {
        let q = queue(8);
        q.close().unwrap();
        assert_eq!(q.close(), Err(QueueError::AlreadyClosed));
    }

    #[test]
    fn blocked_take_returns_closed_after_close() {
        let q = Arc::new(queue(8));
        let taker = {
            let q = q.clone();
            thread::spawn(move || q.take())
        };
        thread::sleep(Duration::from_millis(50));
        q.close().unwrap();
        assert!(matches!(taker.join().unwrap(), Take::Closed));
    }

    #[test]
    fn blocked_take_receives_offered_job() {
        let q = Arc::new(queue(8));
        let taker = {
            let q = q.clone();
            thread::spawn(move || q.take())
        };
        thread::sleep(Duration::from_millis(30));
        assert!(matches!(q.offer(job("late"), Duration::ZERO), Offer::Accepted));
        assert_eq!(taken_document(taker.join().unwrap()), "late");
    }

    #[test]
    fn abort_drains_everything() {
        let q = queue(8);
        for doc in ["a", "b"] {
            assert!(matches!(q.offer(job(doc), Duration::ZERO), Offer::Accepted));
        }
        let drained = q.abort();
        assert_eq!(drained.len(), 2);
        assert!(q.is_empty());
        assert!(matches!(q.take(), Take::Closed));
        // Abort after close is allowed and returns nothing new.
        assert!(q.abort().is_empty());
    }

    #[test]
    fn drain_keeps_queue_open() {
        let q = queue(8);
        assert!(matches!(q.offer(job("a"), Duration::ZERO), Offer::Accepted));
        assert_eq!(q.drain().len(), 1);
        assert!(!q.is_closed());
        assert!(matches!(q.offer(job("b"), Duration::ZERO), Offer::Accepted));
    }
}
