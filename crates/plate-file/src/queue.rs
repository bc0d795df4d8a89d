use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::config::QueueConfig;
use crate::error::{PlateError, PlateResult};

type Task = Box<dyn FnOnce() -> PlateResult<()> + Send + 'static>;

/// Outcome of every task run by a [`WorkQueue`].
#[derive(Debug, Default)]
pub struct WorkReport {
    /// Tasks that returned `Ok`.
    pub completed: usize,
    /// Errors from tasks that failed or panicked.
    pub failures: Vec<PlateError>,
}

impl WorkReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// The completed count, or the first failure.
    pub fn into_result(self) -> PlateResult<usize> {
        match self.failures.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(self.completed),
        }
    }
}

struct QueueShared {
    completed: AtomicUsize,
    failures: Mutex<Vec<PlateError>>,
}

/// Bounded task queue drained by a fixed set of worker threads.
///
/// `submit` blocks while `capacity` tasks are already waiting. Tasks are
/// independent; a failing task does not stop the others.
pub struct WorkQueue {
    sender: Option<SyncSender<Task>>,
    workers: Vec<JoinHandle<()>>,
    shared: Arc<QueueShared>,
}

impl WorkQueue {
    pub fn new(threads: usize, capacity: usize) -> PlateResult<Self> {
        let threads = threads.max(1);
        let (sender, receiver) = mpsc::sync_channel::<Task>(capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let shared = Arc::new(QueueShared {
            completed: AtomicUsize::new(0),
            failures: Mutex::new(Vec::new()),
        });

        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let receiver = Arc::clone(&receiver);
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("plate-worker-{i}"))
                .spawn(move || worker_loop(&receiver, &shared))?;
            workers.push(handle);
        }
        debug!(threads, capacity, "work queue started");

        Ok(Self {
            sender: Some(sender),
            workers,
            shared,
        })
    }

    pub fn from_config(config: &QueueConfig) -> PlateResult<Self> {
        Self::new(config.threads, config.capacity)
    }

    /// Queue a task, blocking while the queue is full.
    pub fn submit<F>(&self, task: F) -> PlateResult<()>
    where
        F: FnOnce() -> PlateResult<()> + Send + 'static,
    {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| PlateError::Queue("queue is closed".to_string()))?;
        sender
            .send(Box::new(task))
            .map_err(|_| PlateError::Queue("all workers have exited".to_string()))
    }

    /// Tasks finished successfully so far.
    pub fn completed(&self) -> usize {
        self.shared.completed.load(Ordering::SeqCst)
    }

    /// Close the queue, wait for every submitted task, and report.
    pub fn join(mut self) -> WorkReport {
        self.shutdown();
        let failures = std::mem::take(&mut *self.shared.failures.lock().expect("queue mutex poisoned"));
        WorkReport {
            completed: self.shared.completed.load(Ordering::SeqCst),
            failures,
        }
    }

    fn shutdown(&mut self) {
        drop(self.sender.take());
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("work queue worker panicked");
            }
        }
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(receiver: &Mutex<Receiver<Task>>, shared: &QueueShared) {
    loop {
        let task = {
            let rx = receiver.lock().expect("queue mutex poisoned");
            rx.recv()
        };
        let Ok(task) = task else {
            break;
        };
        let outcome = match panic::catch_unwind(AssertUnwindSafe(task)) {
            Ok(result) => result,
            Err(_) => Err(PlateError::Queue("task panicked".to_string())),
        };
        match outcome {
            Ok(()) => {
                shared.completed.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                debug!(error = %e, "task failed");
                shared.failures.lock().expect("queue mutex poisoned").push(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[test]
    fn runs_every_task() {
        let queue = WorkQueue::new(4, 8).unwrap();
        let sum = Arc::new(AtomicUsize::new(0));
        for i in 1..=100 {
            let sum = Arc::clone(&sum);
            queue
                .submit(move || {
                    sum.fetch_add(i, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
        }
        let report = queue.join();
        assert!(report.is_success());
        assert_eq!(report.completed, 100);
        assert_eq!(sum.load(Ordering::SeqCst), 5050);
    }

    #[test]
    fn failures_are_collected_not_fatal() {
        let queue = WorkQueue::new(2, 2).unwrap();
        for i in 0..10 {
            queue
                .submit(move || {
                    if i % 3 == 0 {
                        Err(PlateError::Queue(format!("task {i}")))
                    } else {
                        Ok(())
                    }
                })
                .unwrap();
        }
        let report = queue.join();
        assert_eq!(report.completed, 6);
        assert_eq!(report.failures.len(), 4);
        assert!(report.into_result().is_err());
    }

    #[test]
    fn panicking_task_is_reported() {
        let queue = WorkQueue::new(1, 1).unwrap();
        queue.submit(|| panic!("boom")).unwrap();
        queue.submit(|| Ok(())).unwrap();
        let report = queue.join();
        assert_eq!(report.completed, 1);
        assert_eq!(report.failures.len(), 1);
    }

    #[test]
    fn submit_blocks_when_full() {
        let queue = Arc::new(WorkQueue::new(1, 1).unwrap());
        let gate = Arc::new(AtomicBool::new(false));

        // Occupy the worker, then fill the single queue slot.
        for _ in 0..2 {
            let gate = Arc::clone(&gate);
            queue
                .submit(move || {
                    while !gate.load(Ordering::SeqCst) {
                        thread::sleep(Duration::from_millis(5));
                    }
                    Ok(())
                })
                .unwrap();
        }

        let submitted = Arc::new(AtomicBool::new(false));
        let blocked = {
            let queue = Arc::clone(&queue);
            let submitted = Arc::clone(&submitted);
            thread::spawn(move || {
                queue.submit(|| Ok(())).unwrap();
                submitted.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!submitted.load(Ordering::SeqCst), "submit should wait for room");
        gate.store(true, Ordering::SeqCst);
        blocked.join().unwrap();
        assert!(submitted.load(Ordering::SeqCst));

        let queue = Arc::try_unwrap(queue).ok().unwrap();
        assert_eq!(queue.join().completed, 3);
    }
}
