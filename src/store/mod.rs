//! Remote envelope stores.
//!
//! The store is a dumb key-value repository for opaque envelopes.  It
//! never sees a key, never decrypts, and knows only each entry's kind
//! and version (both readable from the envelope header).
//!
//! This module provides:
//! - The `RemoteStore` trait the vault client talks to
//! - `MemoryStore`, an in-process store shared between sessions (`memory`)
//! - `DirStore`, one blob file per entry in a directory (`dir`)
//! - `HttpStore`, a JSON-over-HTTP client (`http`, feature `remote-http`)

pub mod dir;
#[cfg(feature = "remote-http")]
pub mod http;
pub mod memory;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::crypto::Envelope;
use crate::vault::EntryMeta;

pub use dir::DirStore;
#[cfg(feature = "remote-http")]
pub use http::HttpStore;
pub use memory::MemoryStore;

/// Outcomes a store can report besides success.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The stored version did not match `expected_version`.
    /// `current` is the version actually stored, if any.
    #[error("version conflict (stored version: {current:?})")]
    Conflict { current: Option<u64> },

    #[error("not found")]
    NotFound,

    /// The stored blob is not a well-formed envelope.
    #[error("corrupt blob: {0}")]
    Corrupt(String),

    /// Network-level or otherwise temporary failure; safe to retry.
    #[error("transient store error: {0}")]
    Transient(String),

    /// The store could not serve the call and will not on a retry
    /// either: permissions, a full disk, a rejected credential.
    #[error("store failure: {0}")]
    Failed(String),
}

/// The narrow interface the vault client needs from a remote store.
pub trait RemoteStore {
    /// Store `envelope` under `id`.
    ///
    /// `expected_version` is the version the caller believes is stored;
    /// `0` means the id must not exist yet.  Anything else is a
    /// `Conflict`.
    fn put(&self, id: &str, envelope: &Envelope, expected_version: u64)
        -> Result<(), StoreError>;

    /// Fetch the envelope stored under `id`.
    fn get(&self, id: &str) -> Result<Envelope, StoreError>;

    /// Remove `id`.  There is no tombstone; the blob is gone.
    fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Kind and version of every stored entry.
    fn list_meta(&self) -> Result<BTreeMap<String, EntryMeta>, StoreError>;
}

impl<S: RemoteStore + ?Sized> RemoteStore for &S {
    fn put(
        &self,
        id: &str,
        envelope: &Envelope,
        expected_version: u64,
    ) -> Result<(), StoreError> {
        (**self).put(id, envelope, expected_version)
    }

    fn get(&self, id: &str) -> Result<Envelope, StoreError> {
        (**self).get(id)
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        (**self).delete(id)
    }

    fn list_meta(&self) -> Result<BTreeMap<String, EntryMeta>, StoreError> {
        (**self).list_meta()
    }
}

impl<S: RemoteStore + ?Sized> RemoteStore for Box<S> {
    fn put(
        &self,
        id: &str,
        envelope: &Envelope,
        expected_version: u64,
    ) -> Result<(), StoreError> {
        (**self).put(id, envelope, expected_version)
    }

    fn get(&self, id: &str) -> Result<Envelope, StoreError> {
        (**self).get(id)
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        (**self).delete(id)
    }

    fn list_meta(&self) -> Result<BTreeMap<String, EntryMeta>, StoreError> {
        (**self).list_meta()
    }
}

/// Compare-and-set rule shared by the local stores.
pub(crate) fn check_expected(current: Option<u64>, expected_version: u64) -> Result<(), StoreError> {
    match (current, expected_version) {
        (None, 0) => Ok(()),
        (Some(v), e) if v == e => Ok(()),
        (current, _) => Err(StoreError::Conflict { current }),
    }
}
