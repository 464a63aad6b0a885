//! Waiter queue fairness tests.
//!
//! Waiters are served strictly in enqueue order, and a freed resource goes
//! to the oldest waiter before any newcomer can see it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tidepool::{Error, Factory, Pool, PoolConfig, Result};

struct CountingFactory {
    counter: AtomicU64,
}

impl CountingFactory {
    fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Factory for CountingFactory {
    type Resource = u64;

    async fn create(&self) -> Result<u64> {
        Ok(self.counter.fetch_add(1, Ordering::SeqCst))
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn waiters_are_served_in_enqueue_order() {
    let config = PoolConfig {
        min_size: 0,
        max_size: 1,
        acquire_timeout: Duration::from_secs(5),
        ..Default::default()
    };
    let pool = Pool::new(CountingFactory::new(), config).unwrap();

    let held = pool.acquire().await.unwrap();

    let (order_tx, mut order_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut tasks = Vec::new();
    for i in 0..3u32 {
        let pool = pool.clone();
        let order_tx = order_tx.clone();
        tasks.push(tokio::spawn(async move {
            let guard = pool.acquire().await.expect("queued acquire should be served");
            order_tx.send(i).unwrap();
            // Hold briefly so the next waiter is served after us.
            tokio::time::sleep(Duration::from_millis(10)).await;
            pool.release(guard).await;
        }));
        // Ensure enqueue order matches spawn order.
        tokio::time::sleep(Duration::from_millis(30)).await;
    }
    assert_eq!(pool.stats().pending, 3);

    pool.release(held).await;
    for task in tasks {
        task.await.unwrap();
    }

    let mut order = Vec::new();
    while let Ok(i) = order_rx.try_recv() {
        order.push(i);
    }
    assert_eq!(order, vec![0, 1, 2], "i-th release must satisfy i-th waiter");
}

#[tokio::test(flavor = "multi_thread")]
async fn freed_resource_goes_to_waiter_before_newcomer() {
    let config = PoolConfig {
        min_size: 0,
        max_size: 1,
        acquire_timeout: Duration::from_millis(150),
        ..Default::default()
    };
    let pool = Pool::new(CountingFactory::new(), config).unwrap();

    let held = pool.acquire().await.unwrap();

    // Queue a waiter that will hold the resource well past the newcomer's
    // acquire timeout.
    let (served_tx, served_rx) = tokio::sync::oneshot::channel();
    let waiter_pool = pool.clone();
    let waiter = tokio::spawn(async move {
        let guard = waiter_pool.acquire().await.expect("waiter should be served");
        served_tx.send(guard.id()).unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        waiter_pool.release(guard).await;
    });
    tokio::time::sleep(Duration::from_millis(30)).await;

    // Free the resource: it must be handed to the queued waiter.
    pool.release(held).await;
    let served_id = served_rx.await.unwrap();
    assert_eq!(served_id, 0);

    // A newcomer cannot jump the queue; with the waiter still holding the
    // resource it times out.
    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, Error::AcquireTimeout { .. }));

    waiter.await.unwrap();
}
