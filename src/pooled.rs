//! Pooled resource handle with lifecycle metadata.

use std::time::{Duration, Instant};

/// A resource plus the bookkeeping the pool keeps about it.
///
/// A `Pooled<T>` is exclusively owned by exactly one place at any instant:
/// the pool's idle queue, the current borrower (inside a
/// [`PoolGuard`](crate::PoolGuard)), or an in-flight handoff to a waiter.
pub struct Pooled<T> {
    pub(crate) resource: T,
    id: u64,
    created_at: Instant,
    pub(crate) last_used: Instant,
    pub(crate) use_count: u64,
}

impl<T> Pooled<T> {
    pub(crate) fn new(id: u64, resource: T) -> Self {
        let now = Instant::now();
        Self {
            resource,
            id,
            created_at: now,
            last_used: now,
            use_count: 0,
        }
    }

    /// Identity of this resource, unique within its pool for the pool's
    /// lifetime.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// When the factory created this resource.
    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Total age of this resource.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// How long this resource has sat since it was last borrowed or
    /// returned.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }

    /// How many times this resource has been borrowed.
    #[must_use]
    pub fn use_count(&self) -> u64 {
        self.use_count
    }

    pub(crate) fn touch(&mut self) {
        self.last_used = Instant::now();
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pooled")
            .field("id", &self.id)
            .field("use_count", &self.use_count)
            .field("resource", &self.resource)
            .finish()
    }
}
