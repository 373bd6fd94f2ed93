//! Process-wide admission control for file processing.
//!
//! Every file holds one permit from the [`WorkerGate`] while it is fetched,
//! extracted and uploaded. The gate bounds outbound connections and
//! converter processes across all concurrent requests; a file that cannot
//! get a permit within the wait budget fails with [`BridgeError::Busy`].

use crate::error::BridgeError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Bounded pool of file-processing slots.
#[derive(Debug, Clone)]
pub struct WorkerGate {
    semaphore: Arc<Semaphore>,
    max_wait: Duration,
}

impl WorkerGate {
    pub fn new(workers: usize, max_wait: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
            max_wait,
        }
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait up to the configured budget for a slot.
    pub async fn acquire(&self) -> Result<WorkerPermit, BridgeError> {
        if let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() {
            return Ok(WorkerPermit { _permit: permit });
        }
        if self.max_wait.is_zero() {
            return Err(BridgeError::Busy);
        }

        debug!("All workers busy; waiting up to {:?}", self.max_wait);
        match tokio::time::timeout(self.max_wait, Arc::clone(&self.semaphore).acquire_owned()).await {
            Ok(Ok(permit)) => Ok(WorkerPermit { _permit: permit }),
            // Closed semaphore or elapsed wait.
            Ok(Err(_)) | Err(_) => Err(BridgeError::Busy),
        }
    }
}

/// Releases its slot on drop.
#[must_use]
pub struct WorkerPermit {
    _permit: OwnedSemaphorePermit,
}
