//! Bookkeeping for live connection workers.
//!
//! Only the accept loop touches the registry. Workers report back through a
//! [`Completion`] guard that sends the worker's id when dropped, which is the
//! last thing a worker does (also when it panics). The accept loop then
//! joins the task and forgets it.
//!
//! ```text
//! admit -> spawn -> running -> finished (guard dropped) -> reaped
//! ```

use std::collections::{HashMap, TryReserveError};
use std::fmt;
use std::future::Future;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

/// Identifier of a spawned worker, unique per registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// Why a new worker was not admitted.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// The live-worker limit is reached.
    #[error("worker limit of {limit} reached")]
    AtCapacity { limit: usize },

    /// Worker bookkeeping could not be allocated.
    #[error("out of memory: {0}")]
    OutOfMemory(#[from] TryReserveError),
}

/// A reserved registry entry for one worker that has not been spawned yet.
#[derive(Debug)]
#[must_use = "an admitted slot must be passed to WorkerRegistry::spawn"]
pub struct Slot {
    id: WorkerId,
}

/// Marks a worker finished when dropped.
#[derive(Debug)]
pub struct Completion {
    id: WorkerId,
    tx: mpsc::UnboundedSender<WorkerId>,
}

impl Drop for Completion {
    fn drop(&mut self) {
        // The registry outlives its workers unless the process is exiting.
        let _ = self.tx.send(self.id);
    }
}

/// Live workers of one accept loop.
pub struct WorkerRegistry {
    workers: HashMap<WorkerId, JoinHandle<()>>,
    next_id: u64,
    max_workers: Option<usize>,
    done_tx: mpsc::UnboundedSender<WorkerId>,
    done_rx: mpsc::UnboundedReceiver<WorkerId>,
    #[cfg(test)]
    fail_allocation: bool,
}

impl WorkerRegistry {
    /// Create a registry. `max_workers` of `None` means unbounded.
    pub fn new(max_workers: Option<usize>) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            workers: HashMap::new(),
            next_id: 0,
            max_workers,
            done_tx,
            done_rx,
            #[cfg(test)]
            fail_allocation: false,
        }
    }

    /// Number of workers spawned and not yet reaped.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Reserve room for one more worker.
    ///
    /// Fails without side effects when the limit is reached or the
    /// bookkeeping cannot grow.
    pub fn admit(&mut self) -> Result<Slot, AdmissionError> {
        if let Some(limit) = self.max_workers {
            if self.workers.len() >= limit {
                return Err(AdmissionError::AtCapacity { limit });
            }
        }

        self.workers.try_reserve(self.reservation())?;

        let id = WorkerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        Ok(Slot { id })
    }

    #[cfg(not(test))]
    fn reservation(&self) -> usize {
        1
    }

    // An impossible reservation yields a real allocation failure.
    #[cfg(test)]
    fn reservation(&self) -> usize {
        if self.fail_allocation {
            usize::MAX
        } else {
            1
        }
    }

    /// Spawn the worker for an admitted slot.
    ///
    /// `worker` receives the completion guard and must hold it until its
    /// very last action.
    pub fn spawn<F, Fut>(&mut self, slot: Slot, worker: F) -> WorkerId
    where
        F: FnOnce(Completion) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let completion = Completion {
            id: slot.id,
            tx: self.done_tx.clone(),
        };
        let handle = tokio::spawn(worker(completion));
        self.workers.insert(slot.id, handle);
        slot.id
    }

    /// Wait for the next worker to finish.
    ///
    /// Cancel safe; intended for use in `tokio::select!`.
    pub async fn next_finished(&mut self) -> Option<WorkerId> {
        self.done_rx.recv().await
    }

    /// Reap every worker that has already reported completion.
    pub async fn reap(&mut self) -> usize {
        let mut reaped = 0;
        while let Ok(id) = self.done_rx.try_recv() {
            if self.reap_worker(id).await {
                reaped += 1;
            }
        }
        reaped
    }

    /// Join a finished worker and drop its bookkeeping.
    pub async fn reap_worker(&mut self, id: WorkerId) -> bool {
        let Some(handle) = self.workers.remove(&id) else {
            return false;
        };

        if let Err(e) = handle.await {
            if e.is_panic() {
                warn!(worker = %id, "worker panicked");
            }
        }
        true
    }
}

impl fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("live", &self.workers.len())
            .field("max_workers", &self.max_workers)
            .finish()
    }
}
