//! Pool configuration types

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Order in which idle resources are handed back out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Strategy {
    /// Oldest idle resource is reused first (round-robins usage evenly).
    #[default]
    Fifo,
    /// Most recently returned resource is reused first (lets the tail go idle
    /// and get reaped).
    Lifo,
}

/// Configuration for the resource pool
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolConfig {
    /// Minimum number of resources the pool tries to keep alive
    pub min_size: usize,
    /// Maximum number of resources in the pool
    pub max_size: usize,
    /// Timeout for acquiring a resource from the pool
    pub acquire_timeout: Duration,
    /// Timeout for a single factory create call
    pub create_timeout: Duration,
    /// Time after which idle resources are removed
    pub idle_timeout: Duration,
    /// Maximum lifetime of a resource before the reaper retires it
    pub max_lifetime: Duration,
    /// Interval between reaper runs
    pub reap_interval: Duration,
    /// How long `drain()` waits for outstanding borrows to return
    pub drain_timeout: Duration,
    /// Whether idle resources are validated before being handed out
    pub validate_on_borrow: bool,
    /// Reuse order for the idle queue
    pub strategy: Strategy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 2,
            max_size: 10,
            acquire_timeout: Duration::from_secs(30),
            create_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
            max_lifetime: Duration::from_secs(3600),
            reap_interval: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(30),
            validate_on_borrow: true,
            strategy: Strategy::Fifo,
        }
    }
}

impl PoolConfig {
    /// Validate the configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::configuration("max_size must be greater than 0"));
        }
        if self.min_size > self.max_size {
            return Err(Error::configuration(format!(
                "min_size ({}) must not exceed max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if self.acquire_timeout.is_zero() {
            return Err(Error::configuration(
                "acquire_timeout must be greater than zero",
            ));
        }
        if self.create_timeout.is_zero() {
            return Err(Error::configuration(
                "create_timeout must be greater than zero",
            ));
        }
        if self.reap_interval.is_zero() {
            return Err(Error::configuration(
                "reap_interval must be greater than zero",
            ));
        }
        Ok(())
    }
}
