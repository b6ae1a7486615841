//! The seen registry: durable record of which transaction hashes were already
//! forwarded. The only operation the filter relies on is an atomic
//! create-if-absent with an expiry timestamp.
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::RegistryError;

mod dynamodb;
mod memory;

pub use dynamodb::DynamoRegistry;
pub use memory::MemoryRegistry;

/// Outcome of a claim attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Created,
    AlreadyExists,
}

#[async_trait]
pub trait SeenRegistry: Send + Sync {
    /// Atomically creates an entry for `key` expiring at `expires_at` (epoch seconds),
    /// unless one already exists.
    async fn create_if_absent(&self, key: &str, expires_at: i64) -> Result<Claim, RegistryError>;
}

#[async_trait]
impl<R: SeenRegistry + ?Sized> SeenRegistry for Arc<R> {
    async fn create_if_absent(&self, key: &str, expires_at: i64) -> Result<Claim, RegistryError> {
        (**self).create_if_absent(key, expires_at).await
    }
}

pub trait Clock: Send + Sync {
    fn now_epoch_seconds(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_seconds(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        ManualClock {
            now: Arc::new(AtomicI64::new(now)),
        }
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_epoch_seconds(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
