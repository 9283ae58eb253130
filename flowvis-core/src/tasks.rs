//! Background task offload for pending processors.
//!
//! A processor whose `process()` would block (a large load, an expensive
//! filter) submits the work to a [`TaskPool`] and returns
//! [`Progress::Pending`]: it stays invalid and the evaluator moves on.
//!
//! # How completions flow back
//!
//! 1. `process()` captures what it needs, calls [`TaskPool::submit`], and
//!    returns `Pending`.
//! 2. The work runs on a rayon thread; on completion the processor's
//!    identifier is queued on a channel. Nothing touches the network from
//!    the worker thread.
//! 3. The owner of the event loop calls [`TaskPool::drain_completions`]
//!    between passes. Each completion re-invalidates the processor (or, if
//!    it is already invalid, just re-raises the evaluate request) so the
//!    next pass runs its `process()` again, which now finds the result.
//!
//! Completions for processors removed in the meantime are dropped, which is
//! how cancellation works: the result is computed but never applied.
//!
//! [`Progress::Pending`]: crate::processor::Progress::Pending

use std::sync::mpsc::{channel, Receiver, Sender};

use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, trace};

use crate::error::Result;
use crate::network::ProcessorNetwork;
use crate::processor::InvalidationLevel;

/// Worker pool plus the completion queue feeding back into evaluation.
///
/// Shared across threads behind an `Arc`: processors hold a handle so they
/// can submit from inside `process()`. The receiving end of the completion
/// channel sits behind a lock so the pool itself stays `Sync`.
pub struct TaskPool {
    pool: ThreadPool,
    tx: Sender<String>,
    rx: Mutex<Receiver<String>>,
}

impl TaskPool {
    /// Build a pool with `threads` workers (0 lets rayon pick).
    pub fn new(threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("flowvis-task-{i}"))
            .build()?;
        let (tx, rx) = channel();
        debug!(threads = pool.current_num_threads(), "task pool started");
        Ok(Self {
            pool,
            tx,
            rx: Mutex::new(rx),
        })
    }

    /// Run `work` on a worker thread and queue a completion for
    /// `processor` when it finishes.
    pub fn submit(&self, processor: impl Into<String>, work: impl FnOnce() + Send + 'static) {
        let identifier = processor.into();
        let tx = self.tx.clone();
        trace!(%identifier, "task submitted");
        self.pool.spawn(move || {
            work();
            // A closed channel means the pool owner is gone; the result is
            // simply discarded.
            let _ = tx.send(identifier);
        });
    }

    /// Apply all queued completions to `network` without blocking. Returns
    /// how many completions were applied.
    pub fn drain_completions(&self, network: &mut ProcessorNetwork) -> usize {
        let rx = self.rx.lock();
        let mut applied = 0;
        while let Ok(identifier) = rx.try_recv() {
            if !network.contains(&identifier) {
                trace!(%identifier, "completion for removed processor dropped");
                continue;
            }
            let raised = network.invalidate(&identifier, InvalidationLevel::InvalidOutput);
            if raised.is_empty() {
                // Still invalid from the pending pass; re-raise the request
                // so the scheduler revisits it.
                network.request_evaluation(&identifier);
            }
            applied += 1;
        }
        applied
    }

    /// Completions waiting to be drained never block `submit`; this only
    /// reports the pool size for diagnostics.
    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }
}
