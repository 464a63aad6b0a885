//! RAII guard for borrowed resources.

use std::sync::Arc;
use std::time::Instant;

use crate::factory::Factory;
use crate::pool::PoolInner;
use crate::pooled::Pooled;

/// RAII guard for a borrowed resource.
///
/// Dereferences to the underlying resource. When the guard is dropped, the
/// resource is returned to the pool on a background task; use
/// [`Pool::release`](crate::Pool::release) to return it inline and wait for
/// the pool to finish validating it.
///
/// Ownership of the resource moves into the guard, so a resource can never
/// be returned twice: release is structurally idempotent.
pub struct PoolGuard<F: Factory> {
    entry: Option<Pooled<F::Resource>>,
    inner: Arc<PoolInner<F>>,
    borrowed_at: Instant,
}

impl<F: Factory> PoolGuard<F> {
    pub(crate) fn new(entry: Pooled<F::Resource>, inner: Arc<PoolInner<F>>) -> Self {
        Self {
            entry: Some(entry),
            inner,
            borrowed_at: Instant::now(),
        }
    }

    /// Identity of the borrowed resource.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.pooled().id()
    }

    /// How many times this resource has been borrowed, including this
    /// borrow.
    #[must_use]
    pub fn use_count(&self) -> u64 {
        self.pooled().use_count()
    }

    /// When the factory created this resource.
    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.pooled().created_at()
    }

    /// Return the resource to the pool and wait for the return to complete.
    pub(crate) async fn release_inline(mut self) {
        if let Some(entry) = self.entry.take() {
            let held = self.borrowed_at.elapsed();
            self.inner.release(entry, held).await;
        }
    }

    fn pooled(&self) -> &Pooled<F::Resource> {
        self.entry.as_ref().expect("guard used after release")
    }
}

impl<F: Factory> std::ops::Deref for PoolGuard<F> {
    type Target = F::Resource;

    fn deref(&self) -> &F::Resource {
        &self.pooled().resource
    }
}

impl<F: Factory> std::ops::DerefMut for PoolGuard<F> {
    fn deref_mut(&mut self) -> &mut F::Resource {
        &mut self.entry.as_mut().expect("guard used after release").resource
    }
}

impl<F: Factory> Drop for PoolGuard<F> {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            let inner = Arc::clone(&self.inner);
            let held = self.borrowed_at.elapsed();
            // Return runs on a background task: Drop cannot await.
            drop(tokio::spawn(async move {
                inner.release(entry, held).await;
            }));
        }
    }
}

impl<F: Factory> std::fmt::Debug for PoolGuard<F>
where
    F::Resource: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolGuard")
            .field("entry", &self.entry)
            .finish()
    }
}
