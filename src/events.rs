//! Event broadcasting for pool lifecycle observability.
//!
//! Provides [`PoolEvent`] variants emitted as resources move through the
//! pool and an [`EventBus`] backed by `tokio::sync::broadcast`. Events are
//! non-authoritative — they exist for logging and metrics collaborators,
//! never for pool correctness.

use std::time::Duration;

use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// PoolEvent
// ---------------------------------------------------------------------------

/// Events emitted during pool lifecycle operations.
///
/// All variants carry the `resource_id` of the resource involved (except
/// [`PoolEvent::Exhausted`], which describes the pool as a whole).
/// Subscribers receive cloned copies via [`EventBus::subscribe`].
#[derive(Debug, Clone)]
pub enum PoolEvent {
    /// The factory produced a new resource.
    Created {
        /// The resource identity.
        resource_id: u64,
    },
    /// A resource was handed to a borrower.
    Acquired {
        /// The resource identity.
        resource_id: u64,
    },
    /// A resource was returned to the pool.
    Released {
        /// The resource identity.
        resource_id: u64,
        /// How long the borrower held it.
        held_for: Duration,
    },
    /// A resource was permanently removed.
    Destroyed {
        /// The resource identity.
        resource_id: u64,
        /// Why it was removed.
        reason: DestroyReason,
    },
    /// The pool was at capacity and a caller joined the wait queue.
    Exhausted {
        /// Number of callers now waiting for a resource.
        pending: usize,
    },
}

// ---------------------------------------------------------------------------
// DestroyReason
// ---------------------------------------------------------------------------

/// Reason a resource was permanently removed from the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyReason {
    /// The resource failed validation at borrow or return time.
    ValidationFailed,
    /// The resource was idle longer than the configured timeout.
    IdleTimeout,
    /// The resource exceeded its maximum lifetime.
    Expired,
    /// The pool is draining.
    Drained,
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast-based event bus for pool lifecycle events.
///
/// Uses `tokio::sync::broadcast` under the hood. Emission is fire-and-forget:
/// if no subscribers are listening, events are silently dropped (no
/// backpressure on the emitter).
pub struct EventBus {
    sender: broadcast::Sender<PoolEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer size.
    ///
    /// The buffer size determines how many events can be queued before
    /// slow subscribers start lagging (and losing events).
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// Non-blocking. If there are no subscribers, the event is dropped.
    pub fn emit(&self, event: PoolEvent) {
        // Ignore the error — it just means there are no active receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events.
    ///
    /// Returns a receiver that will get all events emitted after this
    /// call. If the subscriber falls behind by more than `buffer_size`
    /// events, it will receive a `Lagged` error and skip to the latest.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.sender.receiver_count())
            .finish()
    }
}
