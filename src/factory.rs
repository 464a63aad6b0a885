//! The injected resource lifecycle contract.
//!
//! The `Factory` trait defines how to create, validate, and destroy the
//! resources a [`Pool`](crate::Pool) manages, plus optional transaction
//! hooks used by [`Pool::transaction`](crate::Pool::transaction).

use async_trait::async_trait;

use crate::error::Result;

/// Lifecycle contract for pooled resources.
///
/// Implemented by the caller and injected into the pool. The pool never
/// knows what a resource *is* — only how to ask the factory for one.
#[async_trait]
pub trait Factory: Send + Sync + 'static {
    /// The resource type produced by this factory.
    type Resource: Send + 'static;

    /// Create a new resource. May fail; failures propagate to the caller
    /// that triggered the creation (background creations are only logged).
    async fn create(&self) -> Result<Self::Resource>;

    /// Check whether an existing resource is still usable.
    ///
    /// Called before handing out an idle resource (when `validate_on_borrow`
    /// is set) and on every return to the pool. Returning `false` destroys
    /// the resource.
    async fn validate(&self, _resource: &Self::Resource) -> bool {
        true
    }

    /// Tear down a resource that is being permanently removed.
    ///
    /// Best-effort: errors are logged by the pool and never propagate.
    async fn destroy(&self, resource: Self::Resource) -> Result<()> {
        drop(resource);
        Ok(())
    }

    /// Begin a unit of work on a borrowed resource.
    async fn begin(&self, _resource: &mut Self::Resource) -> Result<()> {
        Ok(())
    }

    /// Commit the unit of work after the callback succeeded.
    async fn commit(&self, _resource: &mut Self::Resource) -> Result<()> {
        Ok(())
    }

    /// Roll back the unit of work after the callback failed.
    async fn rollback(&self, _resource: &mut Self::Resource) -> Result<()> {
        Ok(())
    }
}
