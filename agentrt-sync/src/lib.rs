//! A fixed-capacity counting semaphore with FIFO waiters and a live-resizable
//! capacity.
//!
//! Used both for the Event Queue's global concurrency limit and for
//! per-batch chunk fan-out inside the Tool Pipeline. Resizing swaps in a
//! fresh inner semaphore; permits already handed out from the old one
//! continue to be valid until released, so a capacity change is eventually
//! consistent rather than instantaneous — exactly the trade the autoscaler
//! in the Event Queue relies on when it shrinks or grows concurrency.

#![deny(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{OwnedSemaphorePermit, RwLock};

/// A bounded counting semaphore whose capacity can be changed at runtime.
pub struct Semaphore {
    inner: RwLock<Arc<tokio::sync::Semaphore>>,
    capacity: AtomicUsize,
}

/// A permit held against a [`Semaphore`]. Releases automatically on drop.
pub struct Permit(#[allow(dead_code)] OwnedSemaphorePermit);

impl Semaphore {
    /// Create a semaphore with `capacity` permits available immediately.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Arc::new(tokio::sync::Semaphore::new(capacity))),
            capacity: AtomicUsize::new(capacity),
        }
    }

    /// Acquire one permit, waiting FIFO if none are currently available.
    ///
    /// The permit is drawn from whichever inner semaphore is current at the
    /// moment `acquire` is called; a concurrent `resize` does not affect a
    /// wait already in progress.
    pub async fn acquire(&self) -> Permit {
        let sem = self.inner.read().await.clone();
        let permit = sem
            .acquire_owned()
            .await
            .expect("semaphore is never explicitly closed");
        Permit(permit)
    }

    /// Replace the inner semaphore with a freshly sized one.
    ///
    /// Permits already acquired from the previous semaphore remain valid and
    /// are released back to it, not to the new one; the old semaphore is
    /// dropped once its last permit returns.
    pub async fn resize(&self, new_capacity: usize) {
        let mut guard = self.inner.write().await;
        *guard = Arc::new(tokio::sync::Semaphore::new(new_capacity));
        self.capacity.store(new_capacity, Ordering::SeqCst);
        tracing::debug!(new_capacity, "semaphore resized");
    }

    /// The capacity as of the most recent `resize` (or construction).
    ///
    /// Note this is the *configured* capacity, not necessarily the number of
    /// permits available on the currently-live inner semaphore while a
    /// resize is in flight.
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::SeqCst)
    }

    /// Permits currently available on the live inner semaphore.
    pub async fn available_permits(&self) -> usize {
        self.inner.read().await.available_permits()
    }

    /// Permits currently checked out (`capacity - available`), as of the
    /// live inner semaphore.
    pub async fn in_use(&self) -> usize {
        self.capacity().saturating_sub(self.available_permits().await)
    }
}
