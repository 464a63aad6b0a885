//! Bounded asynchronous resource pool.
//!
//! `Pool<F>` owns every live resource produced by its [`Factory`] and
//! partitions them between an idle queue and the current borrowers. When
//! the pool is at capacity, callers queue up and are served strictly in
//! arrival order as resources come back.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{PoolConfig, Strategy};
use crate::error::{Error, Result};
use crate::events::{DestroyReason, EventBus, PoolEvent};
use crate::factory::Factory;
use crate::guard::PoolGuard;
use crate::pooled::Pooled;

// ---------------------------------------------------------------------------
// PoolStats
// ---------------------------------------------------------------------------

/// Snapshot of pool counters and gauges.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Total resources ever created.
    pub created: u64,
    /// Total resources ever destroyed.
    pub destroyed: u64,
    /// Total successful acquisitions.
    pub total_acquisitions: u64,
    /// Total returns to the pool.
    pub total_releases: u64,
    /// Acquisitions that timed out in the wait queue.
    pub acquire_timeouts: u64,
    /// Resources destroyed because they failed validation.
    pub validation_failures: u64,
    /// Current number of live resources (idle + borrowed + being created).
    pub total: usize,
    /// Current number of idle resources.
    pub idle: usize,
    /// Current number of borrowed resources.
    pub active: usize,
    /// Current number of callers waiting for a resource.
    pub pending: usize,
}

// ---------------------------------------------------------------------------
// Pool internals
// ---------------------------------------------------------------------------

/// A caller parked in the wait queue.
///
/// The per-waiter timer lives on the acquiring side: `acquire()` wraps the
/// receiver in `tokio::time::timeout` and removes this entry by `id` if the
/// timer fires first.
struct Waiter<T> {
    id: u64,
    tx: oneshot::Sender<Pooled<T>>,
    enqueued_at: Instant,
}

/// Mutable pool state. Every transition of the idle/borrowed partition
/// happens under this one lock, which is never held across an await.
pub(crate) struct PoolState<T> {
    idle: VecDeque<Pooled<T>>,
    waiters: VecDeque<Waiter<T>>,
    /// Live resources, counting reserved in-flight creations.
    /// Invariant: `idle.len() + borrowed + in-flight = total <= max_size`.
    total: usize,
    borrowed: usize,
    draining: bool,
    next_waiter_id: u64,
    stats: PoolStats,
}

impl<T> PoolState<T> {
    fn pop_idle(&mut self, strategy: Strategy) -> Option<Pooled<T>> {
        match strategy {
            Strategy::Fifo => self.idle.pop_front(),
            Strategy::Lifo => self.idle.pop_back(),
        }
    }

    /// Remove the waiter with the given id. Returns false if it was already
    /// served (or cleared by a drain).
    fn remove_waiter(&mut self, id: u64) -> bool {
        let before = self.waiters.len();
        self.waiters.retain(|w| w.id != id);
        self.waiters.len() != before
    }
}

/// Shared pool state behind the cloneable [`Pool`] handle.
pub(crate) struct PoolInner<F: Factory> {
    pub(crate) factory: F,
    pub(crate) config: PoolConfig,
    pub(crate) state: Mutex<PoolState<F::Resource>>,
    pub(crate) events: EventBus,
    pub(crate) shutdown: CancellationToken,
    reaper: Mutex<Option<JoinHandle<()>>>,
    next_resource_id: AtomicU64,
}

/// What `acquire()` decided to do while holding the state lock.
enum Plan<T> {
    Borrow(Pooled<T>),
    Create,
    Wait {
        rx: oneshot::Receiver<Pooled<T>>,
        id: u64,
        pending: usize,
    },
}

impl<F: Factory> PoolInner<F> {
    /// Create one resource via the factory, bounded by `create_timeout`.
    ///
    /// Does not touch `total` — callers reserve a slot before calling and
    /// give it back on failure.
    pub(crate) async fn create_resource(&self) -> Result<Pooled<F::Resource>> {
        let resource =
            match tokio::time::timeout(self.config.create_timeout, self.factory.create()).await {
                Ok(Ok(resource)) => resource,
                Ok(Err(err)) => {
                    tracing::warn!(error = %err, "factory create failed");
                    return Err(err);
                }
                Err(_) => {
                    return Err(Error::factory(
                        "create",
                        format!("timed out after {}ms", self.config.create_timeout.as_millis()),
                    ));
                }
            };
        let id = self.next_resource_id.fetch_add(1, Ordering::Relaxed);
        self.state.lock().stats.created += 1;
        self.events.emit(PoolEvent::Created { resource_id: id });
        Ok(Pooled::new(id, resource))
    }

    /// Mark an entry borrowed and wrap it in a guard.
    fn check_out(self: &Arc<Self>, mut entry: Pooled<F::Resource>) -> PoolGuard<F> {
        entry.use_count += 1;
        entry.touch();
        {
            let mut state = self.state.lock();
            state.borrowed += 1;
            state.stats.total_acquisitions += 1;
        }
        self.events.emit(PoolEvent::Acquired {
            resource_id: entry.id(),
        });
        PoolGuard::new(entry, Arc::clone(self))
    }

    /// Put a valid entry back into circulation: the oldest waiter gets it
    /// before it becomes visible to any new `acquire()`; with no waiters it
    /// joins the idle queue.
    ///
    /// Returns the entry with a destroy reason if it could not be kept
    /// (pool draining); the caller must destroy it.
    fn hand_back(
        &self,
        mut entry: Pooled<F::Resource>,
    ) -> Option<(Pooled<F::Resource>, DestroyReason)> {
        let mut state = self.state.lock();
        if state.draining {
            state.total -= 1;
            return Some((entry, DestroyReason::Drained));
        }
        while let Some(waiter) = state.waiters.pop_front() {
            let id = entry.id();
            let waited = waiter.enqueued_at.elapsed();
            entry.use_count += 1;
            entry.touch();
            match waiter.tx.send(entry) {
                Ok(()) => {
                    state.borrowed += 1;
                    state.stats.total_acquisitions += 1;
                    tracing::debug!(
                        resource_id = id,
                        waited_ms = waited.as_millis() as u64,
                        "handed resource to queued waiter"
                    );
                    self.events.emit(PoolEvent::Acquired { resource_id: id });
                    return None;
                }
                // Receiver gone (timed out or aborted); try the next waiter.
                Err(back) => {
                    entry = back;
                    entry.use_count -= 1;
                }
            }
        }
        state.idle.push_back(entry);
        None
    }

    /// Return a borrowed entry to the pool. Invalid resources are destroyed
    /// and, when the pool is below `min_size`, replaced in the background.
    pub(crate) async fn release(self: &Arc<Self>, entry: Pooled<F::Resource>, held: Duration) {
        let id = entry.id();
        {
            let mut state = self.state.lock();
            state.borrowed = state.borrowed.saturating_sub(1);
            state.stats.total_releases += 1;
        }
        self.events.emit(PoolEvent::Released {
            resource_id: id,
            held_for: held,
        });

        if self.factory.validate(&entry.resource).await {
            let mut entry = entry;
            entry.touch();
            if let Some((entry, reason)) = self.hand_back(entry) {
                self.destroy_resource(entry, reason).await;
            }
        } else {
            {
                let mut state = self.state.lock();
                state.total -= 1;
                state.stats.validation_failures += 1;
            }
            self.destroy_resource(entry, DestroyReason::ValidationFailed)
                .await;
            self.replace_if_below_min();
        }
    }

    /// Destroy a borrow candidate that failed validation, giving back its
    /// `total` slot.
    async fn discard_invalid(&self, entry: Pooled<F::Resource>) {
        {
            let mut state = self.state.lock();
            state.total -= 1;
            state.stats.validation_failures += 1;
        }
        self.destroy_resource(entry, DestroyReason::ValidationFailed)
            .await;
    }

    /// Tear down a resource that has already been unlinked from the pool
    /// (its `total` slot given back by the caller). Destroy errors are
    /// logged, never propagated.
    pub(crate) async fn destroy_resource(&self, entry: Pooled<F::Resource>, reason: DestroyReason) {
        let id = entry.id();
        if let Err(err) = self.factory.destroy(entry.resource).await {
            tracing::warn!(resource_id = id, error = %err, "factory destroy failed");
        }
        self.state.lock().stats.destroyed += 1;
        self.events.emit(PoolEvent::Destroyed {
            resource_id: id,
            reason,
        });
    }

    /// Best-effort background replacement after a destroy left the pool
    /// below `min_size`.
    fn replace_if_below_min(self: &Arc<Self>) {
        let needed = {
            let mut state = self.state.lock();
            if !state.draining && state.total < self.config.min_size {
                state.total += 1;
                true
            } else {
                false
            }
        };
        if !needed {
            return;
        }
        let inner = Arc::clone(self);
        drop(tokio::spawn(async move {
            match inner.create_resource().await {
                Ok(entry) => {
                    if let Some((entry, reason)) = inner.hand_back(entry) {
                        inner.destroy_resource(entry, reason).await;
                    }
                }
                Err(err) => {
                    inner.state.lock().total -= 1;
                    tracing::warn!(error = %err, "replacement create failed");
                }
            }
        }));
    }

    /// Create resources until `total` reaches `min_size`. Individual
    /// failures are logged and stop the loop; the next reaper run retries.
    pub(crate) async fn top_up(&self) {
        loop {
            let needed = {
                let mut state = self.state.lock();
                if !state.draining && state.total < self.config.min_size {
                    state.total += 1;
                    true
                } else {
                    false
                }
            };
            if !needed {
                break;
            }
            match self.create_resource().await {
                Ok(entry) => {
                    if let Some((entry, reason)) = self.hand_back(entry) {
                        self.destroy_resource(entry, reason).await;
                    }
                }
                Err(err) => {
                    self.state.lock().total -= 1;
                    tracing::warn!(error = %err, "warm-up create failed");
                    break;
                }
            }
        }
    }

    /// Evict idle resources past their idle timeout or lifetime, never
    /// dropping `total` below `min_size`. Selection and unlinking happen
    /// under one lock so a concurrent borrow can never observe a victim.
    pub(crate) async fn reap_idle(&self) {
        let min = self.config.min_size;
        let victims: Vec<(Pooled<F::Resource>, DestroyReason)> = {
            let mut state = self.state.lock();
            let mut kept = VecDeque::with_capacity(state.idle.len());
            let mut victims = Vec::new();
            while let Some(entry) = state.idle.pop_front() {
                let reason = if entry.age() >= self.config.max_lifetime {
                    Some(DestroyReason::Expired)
                } else if entry.idle_for() >= self.config.idle_timeout {
                    Some(DestroyReason::IdleTimeout)
                } else {
                    None
                };
                match reason {
                    Some(reason) if state.total - victims.len() - 1 >= min => {
                        victims.push((entry, reason));
                    }
                    _ => kept.push_back(entry),
                }
            }
            state.idle = kept;
            state.total -= victims.len();
            victims
        };
        if !victims.is_empty() {
            tracing::debug!(evicted = victims.len(), "reaped idle resources");
        }
        for (entry, reason) in victims {
            self.destroy_resource(entry, reason).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Pool<F>
// ---------------------------------------------------------------------------

/// Bounded asynchronous resource pool.
///
/// Cheaply cloneable handle; all clones share the same state. Construct
/// with [`Pool::new`], then call [`Pool::initialize`] to warm the pool and
/// start background maintenance.
pub struct Pool<F: Factory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: Factory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: Factory> std::fmt::Debug for Pool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool").field("stats", &self.stats()).finish()
    }
}

impl<F: Factory> Pool<F> {
    /// Create a new pool around the given factory.
    ///
    /// # Errors
    /// Returns an error if `config` is invalid (e.g. `max_size == 0`).
    pub fn new(factory: F, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let max = config.max_size;
        Ok(Self {
            inner: Arc::new(PoolInner {
                factory,
                config,
                state: Mutex::new(PoolState {
                    idle: VecDeque::with_capacity(max),
                    waiters: VecDeque::new(),
                    total: 0,
                    borrowed: 0,
                    draining: false,
                    next_waiter_id: 0,
                    stats: PoolStats::default(),
                }),
                events: EventBus::default(),
                shutdown: CancellationToken::new(),
                reaper: Mutex::new(None),
                next_resource_id: AtomicU64::new(0),
            }),
        })
    }

    /// Warm the pool up to `min_size` and start the reaper.
    ///
    /// Individual create failures are logged, not fatal — the reaper keeps
    /// retrying on its interval. Idempotent: the reaper is started once.
    pub async fn initialize(&self) {
        self.inner.top_up().await;
        let mut reaper = self.inner.reaper.lock();
        if reaper.is_none() {
            *reaper = Some(crate::reaper::spawn(Arc::clone(&self.inner)));
        }
    }

    /// Acquire a resource.
    ///
    /// Takes an idle resource if one exists (validated first when
    /// `validate_on_borrow` is set), creates a new one while below
    /// `max_size`, and otherwise queues behind earlier callers. Fails with
    /// [`Error::AcquireTimeout`] after `acquire_timeout`, or with
    /// [`Error::ValidationFailed`] once `max_size` candidates in a row
    /// failed validation.
    pub async fn acquire(&self) -> Result<PoolGuard<F>> {
        let inner = &self.inner;
        let config = &inner.config;
        let mut attempts = 0usize;

        loop {
            let plan = {
                let mut state = inner.state.lock();
                if state.draining {
                    return Err(Error::Draining);
                }
                if let Some(entry) = state.pop_idle(config.strategy) {
                    Plan::Borrow(entry)
                } else if state.total < config.max_size {
                    state.total += 1;
                    Plan::Create
                } else {
                    let (tx, rx) = oneshot::channel();
                    let id = state.next_waiter_id;
                    state.next_waiter_id += 1;
                    state.waiters.push_back(Waiter {
                        id,
                        tx,
                        enqueued_at: Instant::now(),
                    });
                    let pending = state.waiters.len();
                    Plan::Wait { rx, id, pending }
                }
            };

            // Both the idle and the freshly created candidate go through the
            // same validate-or-discard step; the retry is capped so an
            // always-invalid factory cannot loop forever.
            let candidate = match plan {
                Plan::Borrow(entry) => entry,
                Plan::Create => match inner.create_resource().await {
                    Ok(entry) => entry,
                    Err(err) => {
                        inner.state.lock().total -= 1;
                        return Err(err);
                    }
                },
                Plan::Wait {
                    mut rx,
                    id,
                    pending,
                } => {
                    inner.events.emit(PoolEvent::Exhausted { pending });
                    tracing::debug!(pending, "pool at capacity, queueing caller");
                    match tokio::time::timeout(config.acquire_timeout, &mut rx).await {
                        Ok(Ok(entry)) => return Ok(PoolGuard::new(entry, Arc::clone(inner))),
                        // Senders are only dropped unsent by drain().
                        Ok(Err(_)) => return Err(Error::Draining),
                        Err(_) => {
                            let (removed, pending) = {
                                let mut state = inner.state.lock();
                                let removed = state.remove_waiter(id);
                                if removed {
                                    state.stats.acquire_timeouts += 1;
                                }
                                (removed, state.waiters.len())
                            };
                            if removed {
                                return Err(Error::AcquireTimeout {
                                    timeout_ms: config.acquire_timeout.as_millis() as u64,
                                    pending,
                                });
                            }
                            // A release handed us the resource just as the
                            // timer fired; honor the handoff.
                            match rx.try_recv() {
                                Ok(entry) => {
                                    return Ok(PoolGuard::new(entry, Arc::clone(inner)));
                                }
                                Err(_) => return Err(Error::Draining),
                            }
                        }
                    }
                }
            };

            if config.validate_on_borrow && !inner.factory.validate(&candidate.resource).await {
                inner.discard_invalid(candidate).await;
                attempts += 1;
                if attempts >= config.max_size {
                    return Err(Error::ValidationFailed { attempts });
                }
                continue;
            }
            return Ok(inner.check_out(candidate));
        }
    }

    /// Return a borrowed resource and wait for the pool to finish
    /// validating and re-queueing it.
    ///
    /// Dropping the guard has the same effect, but runs the return on a
    /// background task.
    pub async fn release(&self, guard: PoolGuard<F>) {
        guard.release_inline().await;
    }

    /// Explicitly create one resource and add it to the pool, out of band.
    ///
    /// # Errors
    /// Fails with [`Error::PoolExhausted`] when the pool is already at
    /// `max_size`; only this call fails, the pool is unaffected.
    pub async fn grow(&self) -> Result<()> {
        let inner = &self.inner;
        {
            let mut state = inner.state.lock();
            if state.draining {
                return Err(Error::Draining);
            }
            if state.total >= inner.config.max_size {
                return Err(Error::PoolExhausted {
                    total: state.total,
                    max: inner.config.max_size,
                });
            }
            state.total += 1;
        }
        match inner.create_resource().await {
            Ok(entry) => {
                if let Some((entry, reason)) = inner.hand_back(entry) {
                    inner.destroy_resource(entry, reason).await;
                }
                Ok(())
            }
            Err(err) => {
                inner.state.lock().total -= 1;
                Err(err)
            }
        }
    }

    /// Run a unit of work inside a transaction scope.
    ///
    /// Acquires a resource, calls [`Factory::begin`], runs `work`, then
    /// [`Factory::commit`] on success or [`Factory::rollback`] on error.
    /// The resource is released exactly once on every exit path, including
    /// failures of the hooks themselves.
    ///
    /// ```ignore
    /// use futures::FutureExt;
    ///
    /// let rows = pool
    ///     .transaction(|conn| async move { conn.execute("...").await }.boxed())
    ///     .await?;
    /// ```
    pub async fn transaction<T, E, W>(&self, work: W) -> std::result::Result<T, E>
    where
        E: From<Error>,
        W: for<'a> FnOnce(&'a mut F::Resource) -> BoxFuture<'a, std::result::Result<T, E>>,
    {
        let mut guard = self.acquire().await.map_err(E::from)?;
        self.inner
            .factory
            .begin(&mut *guard)
            .await
            .map_err(E::from)?;
        match work(&mut *guard).await {
            Ok(value) => {
                self.inner
                    .factory
                    .commit(&mut *guard)
                    .await
                    .map_err(E::from)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rb) = self.inner.factory.rollback(&mut *guard).await {
                    tracing::warn!(error = %rb, "rollback failed after unit-of-work error");
                }
                Err(err)
            }
        }
    }

    /// Drain the pool: reject new acquisitions, stop the reaper, wait up to
    /// `drain_timeout` for borrows to come back, and destroy every idle
    /// resource. Idempotent.
    ///
    /// # Errors
    /// Returns [`Error::DrainTimeout`] if outstanding borrows did not
    /// return in time; idle teardown still completes, and stragglers are
    /// destroyed as their guards drop.
    pub async fn drain(&self) -> Result<()> {
        let inner = &self.inner;
        {
            let mut state = inner.state.lock();
            if state.draining {
                return Ok(());
            }
            state.draining = true;
            // Dropping the senders wakes every waiter with Error::Draining.
            state.waiters.clear();
        }
        inner.shutdown.cancel();
        let reaper = inner.reaper.lock().take();
        if let Some(handle) = reaper {
            let _ = handle.await;
        }

        let deadline = Instant::now() + inner.config.drain_timeout;
        let mut timed_out = false;
        loop {
            let outstanding = inner.state.lock().borrowed;
            if outstanding == 0 {
                break;
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    outstanding,
                    "drain deadline expired with resources still borrowed"
                );
                timed_out = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let idle: Vec<_> = {
            let mut state = inner.state.lock();
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.total -= drained.len();
            drained
        };
        for entry in idle {
            inner.destroy_resource(entry, DestroyReason::Drained).await;
        }

        if timed_out {
            let outstanding = inner.state.lock().borrowed;
            return Err(Error::DrainTimeout {
                timeout_ms: inner.config.drain_timeout.as_millis() as u64,
                outstanding,
            });
        }
        Ok(())
    }

    /// Get a snapshot of pool counters and gauges.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        let mut stats = state.stats.clone();
        stats.total = state.total;
        stats.idle = state.idle.len();
        stats.active = state.borrowed;
        stats.pending = state.waiters.len();
        stats
    }

    /// Subscribe to lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.inner.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU64;

    struct StringFactory {
        counter: AtomicU64,
    }

    impl StringFactory {
        fn new() -> Self {
            Self {
                counter: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl Factory for StringFactory {
        type Resource = String;

        async fn create(&self) -> Result<String> {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(format!("conn-{n}"))
        }
    }

    fn small_config() -> PoolConfig {
        PoolConfig {
            min_size: 0,
            max_size: 2,
            acquire_timeout: Duration::from_millis(100),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn acquire_returns_resource() {
        let pool = Pool::new(StringFactory::new(), small_config()).unwrap();
        let guard = pool.acquire().await.unwrap();
        assert_eq!(*guard, "conn-0");
        assert_eq!(guard.use_count(), 1);
    }

    #[tokio::test]
    async fn pool_reuses_resources() {
        let pool = Pool::new(StringFactory::new(), small_config()).unwrap();

        let guard = pool.acquire().await.unwrap();
        pool.release(guard).await;

        let guard = pool.acquire().await.unwrap();
        assert_eq!(*guard, "conn-0", "idle resource should be reused");
        assert_eq!(guard.use_count(), 2);

        let stats = pool.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.total_acquisitions, 2);
    }

    #[tokio::test]
    async fn lifo_strategy_reuses_most_recent() {
        let config = PoolConfig {
            strategy: Strategy::Lifo,
            ..small_config()
        };
        let pool = Pool::new(StringFactory::new(), config).unwrap();

        let g0 = pool.acquire().await.unwrap();
        let g1 = pool.acquire().await.unwrap();
        pool.release(g0).await;
        pool.release(g1).await;

        // Idle queue is [conn-0, conn-1]; LIFO takes the back.
        let guard = pool.acquire().await.unwrap();
        assert_eq!(*guard, "conn-1");
    }

    #[tokio::test]
    async fn acquire_times_out_when_exhausted() {
        let pool = Pool::new(StringFactory::new(), small_config()).unwrap();

        let _g1 = pool.acquire().await.unwrap();
        let _g2 = pool.acquire().await.unwrap();

        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, Error::AcquireTimeout { .. }));
        assert_eq!(pool.stats().pending, 0, "timed-out waiter must be removed");
    }

    #[tokio::test]
    async fn grow_fails_at_capacity() {
        let pool = Pool::new(StringFactory::new(), small_config()).unwrap();
        pool.grow().await.unwrap();
        pool.grow().await.unwrap();

        let err = pool.grow().await.unwrap_err();
        assert!(matches!(err, Error::PoolExhausted { total: 2, max: 2 }));
        // Only that call failed; the pool still serves.
        let _guard = pool.acquire().await.unwrap();
    }
}
