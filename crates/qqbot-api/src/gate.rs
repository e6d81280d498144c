//! Bounded concurrency for outbound API calls.

use crate::error::ApiError;
use crate::Result;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting admission gate: at most `capacity` calls are in flight.
///
/// Waiters are woken when a permit is released instead of polling.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl AdmissionGate {
    /// Create a gate admitting `capacity` concurrent calls.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot. The slot is held until the permit drops.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ApiError::Closed)
    }

    /// Configured ceiling.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Calls currently admitted.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    /// Reject all current and future waiters.
    pub fn close(&self) {
        self.permits.close();
    }
}
