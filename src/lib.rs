//! # tidepool
//!
//! A bounded asynchronous resource pool: manages a capped set of
//! expensive-to-create handles (connections, sessions, clients), arbitrates
//! concurrent borrow/return requests with FIFO fairness, enforces
//! backpressure through acquire timeouts, and keeps itself warm via a
//! background reaper.
//!
//! Resource semantics are injected through the [`Factory`] trait; the pool
//! itself never knows what it is pooling.

pub mod config;
pub mod error;
pub mod events;
pub mod factory;
pub mod guard;
pub mod pool;
pub mod pooled;

mod reaper;

pub use config::{PoolConfig, Strategy};
pub use error::{Error, Result};
pub use events::{DestroyReason, EventBus, PoolEvent};
pub use factory::Factory;
pub use guard::PoolGuard;
pub use pool::{Pool, PoolStats};
pub use pooled::Pooled;
