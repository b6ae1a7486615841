use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Claim, Clock, ManualClock, SeenRegistry};
use crate::error::RegistryError;

/// In-process registry with TTL emulation driven by a [`ManualClock`].
///
/// An entry whose expiry is at or before the clock's current time is treated as
/// absent, matching the `#ttl <= :now` clause of the DynamoDB conditional put.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    entries: Mutex<HashMap<String, i64>>,
    clock: ManualClock,
    unavailable: Mutex<Option<String>>,
}

impl MemoryRegistry {
    pub fn new(clock: ManualClock) -> Self {
        MemoryRegistry {
            clock,
            ..Default::default()
        }
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Whether a live entry exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now_epoch_seconds();
        self.lock_entries()
            .get(key)
            .map_or(false, |expires_at| *expires_at > now)
    }

    pub fn expires_at(&self, key: &str) -> Option<i64> {
        self.lock_entries().get(key).copied()
    }

    /// Drops expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_epoch_seconds();
        let mut entries = self.lock_entries();
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        before - entries.len()
    }

    /// Makes subsequent calls fail with [`RegistryError::Unavailable`] until cleared.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        *self
            .unavailable
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = reason.map(str::to_string);
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, i64>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SeenRegistry for MemoryRegistry {
    async fn create_if_absent(&self, key: &str, expires_at: i64) -> Result<Claim, RegistryError> {
        if let Some(reason) = self
            .unavailable
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            return Err(RegistryError::Unavailable(reason));
        }

        let now = self.clock.now_epoch_seconds();
        let mut entries = self.lock_entries();
        match entries.get(key) {
            Some(existing) if *existing > now => Ok(Claim::AlreadyExists),
            _ => {
                entries.insert(key.to_string(), expires_at);
                Ok(Claim::Created)
            }
        }
    }
}
