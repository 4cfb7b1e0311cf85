//! Actor executor
//!
//! A fixed pool of worker threads fed by a run queue. An actor is queued at
//! most once at a time; a worker runs one turn of it (at most
//! `MAX_ITEMS_PER_TURN` mailbox items, less if a computation is preempted)
//! and the actor requeues itself if work remains.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::actor::LocalActor;

/// Maximum mailbox items processed per turn
pub const MAX_ITEMS_PER_TURN: usize = 100;

enum Task {
    Run(Arc<LocalActor>),
    Shutdown,
}

/// Executor statistics
#[derive(Debug, Default)]
pub struct ExecutorStats {
    turns: AtomicU64,
    items: AtomicU64,
    preemptions: AtomicU64,
}

/// Point-in-time copy of [`ExecutorStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorSnapshot {
    /// Actor turns run
    pub turns: u64,
    /// Mailbox items processed
    pub items: u64,
    /// Turns cut short by a time-slice preemption
    pub preemptions: u64,
}

impl ExecutorStats {
    pub fn record_turn(&self, items: usize, preempted: bool) {
        self.turns.fetch_add(1, Ordering::Relaxed);
        self.items.fetch_add(items as u64, Ordering::Relaxed);
        if preempted {
            self.preemptions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> ExecutorSnapshot {
        ExecutorSnapshot {
            turns: self.turns.load(Ordering::Relaxed),
            items: self.items.load(Ordering::Relaxed),
            preemptions: self.preemptions.load(Ordering::Relaxed),
        }
    }
}

/// Cloneable submission side of the executor, held by every actor
#[derive(Clone)]
pub struct ExecutorHandle {
    tx: Sender<Task>,
    running: Arc<AtomicBool>,
}

impl ExecutorHandle {
    pub(crate) fn submit(&self, actor: Arc<LocalActor>) -> RuntimeResult<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(RuntimeError::ExecutorShutdown);
        }
        self.tx
            .send(Task::Run(actor))
            .map_err(|_| RuntimeError::ExecutorShutdown)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Fixed-size worker pool
pub struct Executor {
    handle: ExecutorHandle,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stats: Arc<ExecutorStats>,
    worker_count: usize,
}

impl Executor {
    /// Start `worker_count` threads named `<name>-worker-<n>`
    pub fn new(worker_count: usize, name: &str) -> RuntimeResult<Self> {
        let (tx, rx) = unbounded();
        let stats = Arc::new(ExecutorStats::default());
        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let rx = rx.clone();
            let stats = stats.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-worker-{}", name, worker_id))
                .spawn(move || worker_loop(worker_id, rx, stats))
                .map_err(RuntimeError::WorkerSpawn)?;
            workers.push(handle);
        }
        debug!(workers = worker_count, "executor started");
        Ok(Executor {
            handle: ExecutorHandle {
                tx,
                running: Arc::new(AtomicBool::new(true)),
            },
            workers: Mutex::new(workers),
            stats,
            worker_count,
        })
    }

    pub fn handle(&self) -> ExecutorHandle {
        self.handle.clone()
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn stats(&self) -> ExecutorSnapshot {
        self.stats.snapshot()
    }

    /// Refuse new work, let the workers drain what is queued, and join them
    pub fn shutdown(&self) {
        if !self.handle.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let workers = std::mem::take(&mut *self.workers.lock());
        for _ in 0..workers.len() {
            if self.handle.tx.send(Task::Shutdown).is_err() {
                break;
            }
        }
        let current = thread::current().id();
        for worker in workers {
            // A worker can end up dropping the last system handle
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                warn!("executor worker panicked");
            }
        }
        debug!("executor stopped");
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(worker_id: usize, rx: Receiver<Task>, stats: Arc<ExecutorStats>) {
    for task in rx.iter() {
        match task {
            Task::Run(actor) => actor.run_turn(&stats),
            Task::Shutdown => break,
        }
    }
    debug!(worker = worker_id, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_snapshot() {
        let stats = ExecutorStats::default();
        stats.record_turn(3, false);
        stats.record_turn(1, true);
        assert_eq!(
            stats.snapshot(),
            ExecutorSnapshot {
                turns: 2,
                items: 4,
                preemptions: 1
            }
        );
    }

    #[test]
    fn test_shutdown_refuses_work() {
        let executor = Executor::new(2, "test").unwrap();
        assert_eq!(executor.worker_count(), 2);
        let handle = executor.handle();
        assert!(handle.is_running());
        executor.shutdown();
        assert!(!handle.is_running());
        executor.shutdown();
    }
}
