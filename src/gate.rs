//! Admission gate and error group
//!
//! [`Gate`] caps how many backend calls an operation group (stat, remove,
//! container init) has in flight. [`ErrGroup`] joins the dispatched tasks,
//! letting every one of them finish and keeping the first error.

use crate::error::StorageError;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::error;

/// Default number of concurrent backend calls per operation group
pub const DEFAULT_GATE_LIMIT: usize = 20;

/// Bounded counting semaphore.
#[derive(Clone)]
pub struct Gate {
    semaphore: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    limit: usize,
}

/// A held slot. Dropping it releases the slot.
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Gate {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            limit,
        }
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Result<GatePermit, StorageError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| StorageError::Internal("Gate semaphore closed".into()))?;
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Ok(GatePermit {
            _permit: permit,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Release a slot explicitly. Equivalent to dropping the permit.
    pub fn release(&self, permit: GatePermit) {
        drop(permit);
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of slots currently held.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new(DEFAULT_GATE_LIMIT)
    }
}

/// Group of tasks whose first error wins. Tasks are never cancelled.
pub struct ErrGroup {
    tasks: JoinSet<Result<(), StorageError>>,
}

impl ErrGroup {
    pub fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
        }
    }

    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Result<(), StorageError>> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

    /// Wait for every task and return the first error seen.
    pub async fn wait(mut self) -> Result<(), StorageError> {
        let mut first_err = None;

        while let Some(joined) = self.tasks.join_next().await {
            let result = joined.map_err(|e| StorageError::Internal(format!("Task failed: {}", e)));
            match result.and_then(|r| r) {
                Ok(()) => {}
                Err(e) if first_err.is_none() => first_err = Some(e),
                Err(e) => error!(error = %e, "Additional error in task group"),
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Default for ErrGroup {
    fn default() -> Self {
        Self::new()
    }
}
