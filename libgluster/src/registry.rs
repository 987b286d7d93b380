//! Volume registry: the single store of lifecycle records.
//!
//! The map itself is private.  Callers take the registry lock with
//! [`VolumeRegistry::lock`] and mutate state only through the operations on
//! [`RegistryGuard`], which keeps the reference-count rules in one place:
//! counts start at one on the first mount, move by exactly one per call, and
//! never drop below zero.
//!
//! The lock is a [`tokio::sync::Mutex`] so a guard may be held across the
//! awaited attach/detach call that accompanies a state transition.

use std::collections::HashMap;

use tokio::sync::{Mutex, MutexGuard};

use crate::types::VolumeRecord;

/// Synchronized name → reference count map.
#[derive(Debug, Default)]
pub struct VolumeRegistry {
    volumes: Mutex<HashMap<String, u32>>,
}

impl VolumeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire exclusive access.  Every lifecycle operation holds the
    /// returned guard for its whole body.
    pub async fn lock(&self) -> RegistryGuard<'_> {
        RegistryGuard {
            volumes: self.volumes.lock().await,
        }
    }
}

/// Exclusive view of the registry.
pub struct RegistryGuard<'a> {
    volumes: MutexGuard<'a, HashMap<String, u32>>,
}

impl RegistryGuard<'_> {
    /// Look up a record without side effects.
    pub fn get(&self, name: &str) -> Option<VolumeRecord> {
        self.volumes.get(name).map(|&count| record(name, count))
    }

    /// Count one more mount, creating the record with a count of one if it
    /// does not exist yet.
    pub fn upsert_increment(&mut self, name: &str) -> VolumeRecord {
        let count = self.volumes.entry(name.to_owned()).or_insert(0);
        *count = count.saturating_add(1);
        record(name, *count)
    }

    /// Count one less mount.
    ///
    /// Returns `None` when there is nothing to decrement: the record is
    /// missing or its count is already zero.  The count is left untouched in
    /// that case.
    pub fn decrement(&mut self, name: &str) -> Option<VolumeRecord> {
        let count = self.volumes.get_mut(name)?;
        if *count == 0 {
            return None;
        }
        *count -= 1;
        Some(record(name, *count))
    }

    /// Drop the record.  The caller decides when this is safe.
    pub fn remove(&mut self, name: &str) -> Option<VolumeRecord> {
        self.volumes
            .remove(name)
            .map(|count| record(name, count))
    }

    /// Snapshot of all records, in no particular order.
    pub fn list(&self) -> Vec<VolumeRecord> {
        self.volumes
            .iter()
            .map(|(name, &count)| record(name, count))
            .collect()
    }

    /// Records whose remote filesystem is still attached.
    pub fn attached(&self) -> Vec<VolumeRecord> {
        self.volumes
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(name, &count)| record(name, count))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }
}

fn record(name: &str, reference_count: u32) -> VolumeRecord {
    VolumeRecord {
        name: name.to_owned(),
        reference_count,
    }
}
