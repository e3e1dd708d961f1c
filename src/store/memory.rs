//! In-process envelope store.
//!
//! Holds envelopes as serialized bytes behind an `Arc<Mutex<..>>`, so
//! clones share one backing map.  That is how tests model two sessions
//! against the same remote.  A few fault-injection hooks simulate a
//! misbehaving network or a tampering store.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{check_expected, RemoteStore, StoreError};
use crate::crypto::Envelope;
use crate::vault::EntryMeta;

#[derive(Debug, Default)]
struct Inner {
    blobs: BTreeMap<String, Vec<u8>>,
    meta: BTreeMap<String, EntryMeta>,
    transient_failures: u32,
    lost_acks: u32,
}

/// Shared in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls fail with `StoreError::Transient`.
    pub fn inject_transient_failures(&self, n: u32) {
        self.lock().transient_failures = n;
    }

    /// Make the next `n` puts store their envelope and then fail with
    /// `StoreError::Transient`, as if the reply was lost on the way back.
    pub fn drop_next_acks(&self, n: u32) {
        self.lock().lost_acks = n;
    }

    /// Raw stored bytes for `id`, exactly as the store holds them.
    pub fn raw_blob(&self, id: &str) -> Option<Vec<u8>> {
        self.lock().blobs.get(id).cloned()
    }

    /// Overwrite the stored bytes for `id` without touching its metadata.
    pub fn replace_raw_blob(&self, id: &str, bytes: Vec<u8>) {
        self.lock().blobs.insert(id.to_string(), bytes);
    }

    /// Overwrite the metadata version for `id`, leaving the blob alone.
    /// Simulates a torn write where metadata and blob disagree.
    pub fn set_meta_version(&self, id: &str, version: u64) {
        if let Some(meta) = self.lock().meta.get_mut(id) {
            meta.version = version;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means another test thread panicked
        // mid-call; the map itself is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_checked(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        let mut inner = self.lock();
        if inner.transient_failures > 0 {
            inner.transient_failures -= 1;
            return Err(StoreError::Transient("injected failure".into()));
        }
        Ok(inner)
    }
}

impl RemoteStore for MemoryStore {
    fn put(&self, id: &str, envelope: &Envelope, expected_version: u64) -> Result<(), StoreError> {
        let mut inner = self.lock_checked()?;
        let current = inner.meta.get(id).map(|m| m.version);
        check_expected(current, expected_version)?;

        inner.blobs.insert(id.to_string(), envelope.to_bytes());
        inner.meta.insert(
            id.to_string(),
            EntryMeta {
                kind: envelope.kind,
                version: envelope.version,
            },
        );

        if inner.lost_acks > 0 {
            inner.lost_acks -= 1;
            return Err(StoreError::Transient("acknowledgement lost".into()));
        }
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Envelope, StoreError> {
        let inner = self.lock_checked()?;
        let bytes = inner.blobs.get(id).ok_or(StoreError::NotFound)?;
        Envelope::from_bytes(bytes).map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.lock_checked()?;
        inner.meta.remove(id);
        inner.blobs.remove(id).map(|_| ()).ok_or(StoreError::NotFound)
    }

    fn list_meta(&self) -> Result<BTreeMap<String, EntryMeta>, StoreError> {
        Ok(self.lock_checked()?.meta.clone())
    }
}
