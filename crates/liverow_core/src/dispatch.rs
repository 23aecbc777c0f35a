//! Handler dispatch worker pool.

use parking_lot::{Mutex, RwLock};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use tracing::debug;

type Job = Box<dyn FnOnce() + Send>;

/// Fixed pool of dispatch workers, sharded by row key.
///
/// Jobs for the same shard run in submission order on one worker, so
/// handlers for a single row's notifications are invoked in order while a
/// slow handler never stalls notifications for unrelated rows.
pub(crate) struct Dispatcher {
    shard_count: usize,
    senders: RwLock<Vec<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Spawns `workers` dispatch threads.
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let (tx, rx) = mpsc::channel::<Job>();
            senders.push(tx);
            let handle = thread::Builder::new()
                .name(format!("liverow-dispatch-{index}"))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        job();
                    }
                    debug!(worker = index, "dispatch worker stopped");
                })
                .unwrap_or_else(|e| panic!("failed to spawn dispatch worker: {e}"));
            handles.push(handle);
        }
        Self {
            shard_count: workers,
            senders: RwLock::new(senders),
            workers: Mutex::new(handles),
        }
    }

    /// Returns the shard count.
    pub fn shards(&self) -> usize {
        self.shard_count
    }

    /// Submits a job to a shard. Jobs submitted after shutdown are dropped.
    pub fn dispatch(&self, shard: usize, job: Job) {
        let senders = self.senders.read();
        if senders.is_empty() {
            return;
        }
        let _ = senders[shard % senders.len()].send(job);
    }

    /// Stops the workers after they drain their queues, and joins them.
    pub fn shutdown(&self) {
        self.senders.write().clear();
        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn same_shard_preserves_order() {
        let dispatcher = Dispatcher::new(2);
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..10 {
            let seen = Arc::clone(&seen);
            dispatcher.dispatch(1, Box::new(move || seen.lock().push(i)));
        }
        dispatcher.shutdown();
        assert_eq!(*seen.lock(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn all_jobs_run_before_shutdown_returns() {
        let dispatcher = Dispatcher::new(4);
        let count = Arc::new(AtomicUsize::new(0));
        for i in 0..100 {
            let count = Arc::clone(&count);
            dispatcher.dispatch(i, Box::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }
        dispatcher.shutdown();
        assert_eq!(count.load(Ordering::SeqCst), 100);
    }
}
