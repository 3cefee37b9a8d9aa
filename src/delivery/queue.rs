//! Single-worker FIFO queue serializing hit building and delivery.
//!
//! Every build and send job runs on the same worker thread, one at a time,
//! in submission order. This is what keeps multi-hit fragments and offline
//! replays in order.

use crossbeam_channel::{unbounded, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

/// State handed to a job when it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobState {
    /// The job was cancelled after submission.
    pub cancelled: bool,
}

type Job = Box<dyn FnOnce(JobState) + Send>;

#[derive(Default)]
struct Shared {
    pending: Mutex<usize>,
    idle: Condvar,
    cancel_epoch: AtomicU64,
}

impl Shared {
    fn finish_one(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.idle.notify_all();
        }
    }
}

/// Serial task queue with a single worker thread.
pub struct TrackerQueue {
    sender: Option<Sender<(u64, Job)>>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
}

impl TrackerQueue {
    pub fn new() -> std::io::Result<Self> {
        let (sender, receiver) = unbounded::<(u64, Job)>();
        let shared = Arc::new(Shared::default());
        let worker_shared = shared.clone();

        let worker = thread::Builder::new()
            .name("hit-tracker-queue".to_string())
            .spawn(move || {
                for (epoch, job) in receiver.iter() {
                    let cancelled = worker_shared.cancel_epoch.load(Ordering::SeqCst) > epoch;
                    if catch_unwind(AssertUnwindSafe(|| job(JobState { cancelled }))).is_err() {
                        tracing::error!("Queue job panicked");
                    }
                    worker_shared.finish_one();
                }
            })?;
        let worker_id = worker.thread().id();

        Ok(Self {
            sender: Some(sender),
            shared,
            worker: Some(worker),
            worker_id,
        })
    }

    /// Submit a job to run after every job submitted before it.
    pub fn enqueue<F>(&self, job: F)
    where
        F: FnOnce(JobState) + Send + 'static,
    {
        let Some(ref sender) = self.sender else {
            return;
        };

        *self.shared.pending.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        let epoch = self.shared.cancel_epoch.load(Ordering::SeqCst);
        if sender.send((epoch, Box::new(job))).is_err() {
            tracing::error!("Queue worker is gone, job dropped");
            self.shared.finish_one();
        }
    }

    /// Mark every job submitted so far as cancelled.
    pub fn cancel_all(&self) {
        self.shared.cancel_epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of jobs submitted but not yet finished.
    pub fn pending(&self) -> usize {
        *self.shared.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    /// Block until the queue is drained. Returns immediately on the worker.
    pub fn wait_until_idle(&self) {
        if self.is_worker_thread() {
            return;
        }
        let mut pending = self.shared.pending.lock().unwrap_or_else(|e| e.into_inner());
        while *pending > 0 {
            pending = self
                .shared
                .idle
                .wait(pending)
                .unwrap_or_else(|e| e.into_inner());
        }
    }
}

impl Drop for TrackerQueue {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if !self.is_worker_thread() {
                let _ = worker.join();
            }
        }
    }
}

impl std::fmt::Debug for TrackerQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerQueue")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_jobs_run_in_order() {
        let queue = TrackerQueue::new().unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..20 {
            let order = order.clone();
            queue.enqueue(move |_| order.lock().unwrap().push(i));
        }
        queue.wait_until_idle();

        assert_eq!(*order.lock().unwrap(), (0..20).collect::<Vec<_>>());
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_single_concurrency() {
        let queue = TrackerQueue::new().unwrap();
        let running = Arc::new(Mutex::new(0usize));
        let max_seen = Arc::new(Mutex::new(0usize));

        for _ in 0..10 {
            let running = running.clone();
            let max_seen = max_seen.clone();
            queue.enqueue(move |_| {
                let now = {
                    let mut r = running.lock().unwrap();
                    *r += 1;
                    *r
                };
                {
                    let mut m = max_seen.lock().unwrap();
                    *m = (*m).max(now);
                }
                thread::sleep(Duration::from_millis(2));
                *running.lock().unwrap() -= 1;
            });
        }
        queue.wait_until_idle();
        assert_eq!(*max_seen.lock().unwrap(), 1);
    }

    #[test]
    fn test_cancel_all_marks_queued_jobs() {
        let queue = TrackerQueue::new().unwrap();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let states = Arc::new(Mutex::new(Vec::new()));

        queue.enqueue(move |_| {
            let _ = gate_rx.recv();
        });
        let s = states.clone();
        queue.enqueue(move |state| s.lock().unwrap().push(state.cancelled));

        queue.cancel_all();

        let s = states.clone();
        queue.enqueue(move |state| s.lock().unwrap().push(state.cancelled));

        gate_tx.send(()).unwrap();
        queue.wait_until_idle();
        assert_eq!(*states.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn test_panicking_job_does_not_stall_queue() {
        let queue = TrackerQueue::new().unwrap();
        queue.enqueue(|_| panic!("boom"));
        let done = Arc::new(Mutex::new(false));
        let d = done.clone();
        queue.enqueue(move |_| *d.lock().unwrap() = true);
        queue.wait_until_idle();
        assert!(*done.lock().unwrap());
    }
}
