//! Drain and shutdown tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tidepool::{Error, Factory, Pool, PoolConfig, Result};

#[derive(Clone)]
struct CountingFactory {
    counter: Arc<AtomicU64>,
    destroyed: Arc<AtomicU64>,
}

impl CountingFactory {
    fn new() -> Self {
        Self {
            counter: Arc::new(AtomicU64::new(0)),
            destroyed: Arc::new(AtomicU64::new(0)),
        }
    }
}

#[async_trait]
impl Factory for CountingFactory {
    type Resource = u64;

    async fn create(&self) -> Result<u64> {
        Ok(self.counter.fetch_add(1, Ordering::SeqCst))
    }

    async fn destroy(&self, _resource: u64) -> Result<()> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn pool_config() -> PoolConfig {
    PoolConfig {
        min_size: 0,
        max_size: 4,
        acquire_timeout: Duration::from_secs(1),
        drain_timeout: Duration::from_millis(100),
        ..Default::default()
    }
}

#[tokio::test]
async fn drain_destroys_idle_and_is_idempotent() {
    let factory = CountingFactory::new();
    let pool = Pool::new(factory.clone(), pool_config()).unwrap();
    pool.initialize().await;

    let g0 = pool.acquire().await.unwrap();
    let g1 = pool.acquire().await.unwrap();
    pool.release(g0).await;
    pool.release(g1).await;
    assert_eq!(pool.stats().idle, 2);

    pool.drain().await.expect("drain with no borrows succeeds");

    let stats = pool.stats();
    assert_eq!(stats.idle, 0);
    assert_eq!(stats.total, 0);
    assert_eq!(stats.destroyed, 2);

    assert_eq!(factory.destroyed.load(Ordering::SeqCst), 2);

    // Idempotent.
    pool.drain().await.expect("second drain is a no-op");
    assert_eq!(pool.stats().destroyed, 2);
}

#[tokio::test]
async fn acquire_after_drain_is_rejected() {
    let pool = Pool::new(CountingFactory::new(), pool_config()).unwrap();
    pool.drain().await.unwrap();

    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, Error::Draining));

    let err = pool.grow().await.unwrap_err();
    assert!(matches!(err, Error::Draining));
}

#[tokio::test(flavor = "multi_thread")]
async fn drain_times_out_on_outstanding_borrow() {
    let pool = Pool::new(CountingFactory::new(), pool_config()).unwrap();

    let guard = pool.acquire().await.unwrap();

    let start = std::time::Instant::now();
    let err = pool.drain().await.unwrap_err();
    assert!(start.elapsed() >= Duration::from_millis(100));
    assert!(
        matches!(err, Error::DrainTimeout { outstanding: 1, .. }),
        "expected DrainTimeout, got: {err:?}"
    );

    // The straggler is destroyed as its guard comes back.
    pool.release(guard).await;
    let stats = pool.stats();
    assert_eq!(stats.total, 0);
    assert_eq!(stats.destroyed, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn drain_wakes_queued_waiters() {
    let config = PoolConfig {
        max_size: 1,
        ..pool_config()
    };
    let pool = Pool::new(CountingFactory::new(), config).unwrap();

    let guard = pool.acquire().await.unwrap();

    let waiter_pool = pool.clone();
    let waiter = tokio::spawn(async move { waiter_pool.acquire().await });
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(pool.stats().pending, 1);

    // Drain clears the queue; the waiter fails fast with Draining instead
    // of waiting out its own timer.
    let drain_pool = pool.clone();
    let drain = tokio::spawn(async move { drain_pool.drain().await });

    let result = waiter.await.unwrap();
    assert!(matches!(result.unwrap_err(), Error::Draining));

    pool.release(guard).await;
    drain.await.unwrap().expect("drain completes once the borrow returns");
    assert_eq!(pool.stats().total, 0);
}
