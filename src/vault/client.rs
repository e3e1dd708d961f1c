//! High-level vault operations used by CLI commands.
//!
//! `VaultSession` is the one context object a command works through.
//! It owns the derived key, the integrity ledger, the index and the
//! store handle for a single invocation, and wipes the key on drop.
//!
//! Writes go: encode → reserve ledger counter → seal → store `put` →
//! record version.  Reads go the other way, with the index, the ledger
//! and the decoded payload all cross-checked against the envelope.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::crypto::{self, DerivedKey, Envelope, KdfParams, OsRandom, RandomSource, Salt, SealContext};
use crate::errors::{Result, VaultError};
use crate::store::{RemoteStore, StoreError};

use super::codec;
use super::entry::{validate_entry_id, Entry, EntryKind, EntryMeta, Secret};
use super::format::{VaultMetadata, LEDGER_FILE};
use super::index::VaultIndex;
use super::ledger::IntegrityLedger;

/// How transient store failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (minimum 1).
    pub attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Retry without sleeping.  Tests only.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            backoff: Duration::ZERO,
        }
    }
}

/// Create vault metadata in `vault_dir` and return the new key.
///
/// Generates a random salt, derives the key from `master_secret`, and
/// writes `vault.json` with the salt, params and key check tag.
pub fn create_vault(
    vault_dir: &Path,
    master_secret: &[u8],
    params: &KdfParams,
    rng: &mut impl RandomSource,
) -> Result<DerivedKey> {
    let (key, meta) = prepare_vault(vault_dir, master_secret, params, rng)?;
    meta.save(vault_dir)?;
    tracing::info!(dir = %vault_dir.display(), "vault created");
    Ok(key)
}

/// Derive a key for a new vault without writing anything.
///
/// The caller persists the returned metadata with
/// [`VaultMetadata::save`] once it is happy with the rest of the setup.
/// Until then `vault_dir` stays free for another attempt.
pub fn prepare_vault(
    vault_dir: &Path,
    master_secret: &[u8],
    params: &KdfParams,
    rng: &mut impl RandomSource,
) -> Result<(DerivedKey, VaultMetadata)> {
    if VaultMetadata::path(vault_dir).exists() {
        return Err(VaultError::VaultAlreadyExists(vault_dir.to_path_buf()));
    }

    let salt = Salt::generate(rng);
    let key = crypto::derive(master_secret, &salt, params)?;
    let meta = VaultMetadata::new(&salt, *params, key.key_check()?);
    Ok((key, meta))
}

/// Derive the key for an existing vault and check it is the right one.
///
/// A wrong master secret fails here with `Authentication`, before any
/// entry is fetched.
pub fn unlock(vault_dir: &Path, master_secret: &[u8]) -> Result<DerivedKey> {
    let meta = VaultMetadata::load(vault_dir)?;
    let key = crypto::derive(master_secret, &meta.salt()?, &meta.kdf)?;
    key.verify_key_check(&meta.key_check)?;
    tracing::debug!(dir = %vault_dir.display(), "vault unlocked");
    Ok(key)
}

/// One command's worth of vault state.
pub struct VaultSession<S: RemoteStore, R: RandomSource = OsRandom> {
    store: S,
    key: DerivedKey,
    ledger: IntegrityLedger,
    index: VaultIndex,
    rng: R,
    retry: RetryPolicy,
}

impl<S: RemoteStore> VaultSession<S, OsRandom> {
    /// Unlock the vault in `vault_dir` and connect it to `store`.
    pub fn open(vault_dir: &Path, master_secret: &[u8], store: S) -> Result<Self> {
        let key = unlock(vault_dir, master_secret)?;
        Self::connect(vault_dir, key, store, OsRandom, RetryPolicy::default())
    }
}

impl<S: RemoteStore, R: RandomSource> VaultSession<S, R> {
    /// Build a session from an already unlocked key.
    ///
    /// Opens the ledger next to the metadata and rebuilds the index
    /// from the store.
    pub fn connect(
        vault_dir: &Path,
        key: DerivedKey,
        store: S,
        rng: R,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let ledger = IntegrityLedger::open(&ledger_path(vault_dir), &key)?;
        let mut session = Self {
            store,
            key,
            ledger,
            index: VaultIndex::default(),
            rng,
            retry,
        };
        session.refresh()?;
        Ok(session)
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Add a new entry at version 1.
    pub fn add(&mut self, id: &str, secret: Secret) -> Result<Entry> {
        validate_entry_id(id)?;
        if self.index.contains(id) {
            return Err(VaultError::DuplicateEntry(id.to_string()));
        }

        let entry = Entry {
            id: id.to_string(),
            version: 1,
            secret,
        };

        match self.write(&entry, 0, "add") {
            Err(WriteError::Conflict(current)) => {
                if let Some(version) = current {
                    self.index.insert(
                        id,
                        EntryMeta {
                            kind: entry.kind(),
                            version,
                        },
                    );
                }
                Err(VaultError::DuplicateEntry(id.to_string()))
            }
            Err(WriteError::Vault(e)) => Err(e),
            Ok(()) => {
                tracing::info!(id, kind = %entry.kind(), "entry added");
                Ok(entry)
            }
        }
    }

    /// Fetch, verify and decrypt an entry.
    pub fn get(&mut self, id: &str) -> Result<Entry> {
        validate_entry_id(id)?;

        let listed = match self.index.get(id) {
            Some(meta) => Some(meta),
            None => {
                self.refresh()?;
                self.index.get(id)
            }
        };

        // Unlisted ids still go to the store: a blob the listing skipped
        // as unreadable surfaces here as `MalformedEntry`.
        let envelope = self.fetch(id, "get")?;
        let mut indexed = listed.unwrap_or(EntryMeta {
            kind: envelope.kind,
            version: envelope.version,
        });

        if envelope.version != indexed.version {
            // The index may simply be stale; ask the store once more.
            self.refresh()?;
            indexed = self
                .index
                .get(id)
                .ok_or_else(|| VaultError::NotFound(id.to_string()))?;
            if envelope.version != indexed.version {
                tracing::warn!(
                    id,
                    indexed = indexed.version,
                    stored = envelope.version,
                    "index and envelope versions disagree"
                );
                return Err(VaultError::VersionMismatch {
                    id: id.to_string(),
                    op: "get",
                    indexed: indexed.version,
                    stored: envelope.version,
                });
            }
        }

        self.open_envelope(id, &envelope)
    }

    /// Whether the store holds anything under `id`, including a blob too
    /// damaged to be listed.  Never decrypts.
    pub fn exists(&mut self, id: &str) -> Result<bool> {
        validate_entry_id(id)?;
        if self.index.contains(id) {
            return Ok(true);
        }
        self.refresh()?;
        if self.index.contains(id) {
            return Ok(true);
        }
        match self.call(|store| store.get(id)) {
            Ok(_) | Err(StoreError::Corrupt(_)) => Ok(true),
            Err(StoreError::NotFound) => Ok(false),
            Err(e) => Err(store_error(id, "exists", e)),
        }
    }

    /// Index contents sorted by id.  Never decrypts.
    pub fn list(&self, kind: Option<EntryKind>) -> Vec<(String, EntryMeta)> {
        self.index.list(kind)
    }

    /// Permanently remove an entry from the store.
    pub fn delete(&mut self, id: &str) -> Result<()> {
        validate_entry_id(id)?;

        // Sent even for unlisted ids so unreadable blobs can be removed.
        let result = self.call(|store| store.delete(id));
        match result {
            Ok(()) => {}
            Err(StoreError::NotFound) => {
                self.index.remove(id);
                return Err(VaultError::NotFound(id.to_string()));
            }
            Err(e) => return Err(store_error(id, "delete", e)),
        }

        self.index.remove(id);
        self.ledger.forget_version(id)?;
        tracing::info!(id, "entry deleted");
        Ok(())
    }

    /// Replace an entry's secret, bumping its version.
    ///
    /// `expected_version` is the version the caller last read.  If the
    /// store holds anything else, nothing is written and the call fails
    /// with `ConcurrentModification`; read again and retry.
    pub fn edit(&mut self, id: &str, expected_version: u64, secret: Secret) -> Result<Entry> {
        validate_entry_id(id)?;

        let current = self.fetch(id, "edit")?;
        if current.version != expected_version {
            self.index.insert(
                id,
                EntryMeta {
                    kind: current.kind,
                    version: current.version,
                },
            );
            return Err(VaultError::ConcurrentModification {
                id: id.to_string(),
                expected: expected_version,
                found: current.version,
            });
        }

        // Authenticate what is being replaced before replacing it.
        self.open_envelope(id, &current)?;

        let next = expected_version.checked_add(1).ok_or_else(|| {
            VaultError::MalformedEntry(format!("version counter exhausted for '{id}'"))
        })?;
        let entry = Entry {
            id: id.to_string(),
            version: next,
            secret,
        };

        match self.write(&entry, expected_version, "edit") {
            Err(WriteError::Conflict(found)) => Err(VaultError::ConcurrentModification {
                id: id.to_string(),
                expected: expected_version,
                found: found.unwrap_or(0),
            }),
            Err(WriteError::Vault(e)) => Err(e),
            Ok(()) => {
                tracing::info!(id, version = next, "entry edited");
                Ok(entry)
            }
        }
    }

    /// Rebuild the index from the store's metadata.
    pub fn refresh(&mut self) -> Result<()> {
        let meta = self
            .call(|store| store.list_meta())
            .map_err(|e| store_error("*", "list", e))?;
        tracing::debug!(entries = meta.len(), "index refreshed");
        self.index = VaultIndex::from_meta(meta);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn index(&self) -> &VaultIndex {
        &self.index
    }

    pub fn ledger(&self) -> &IntegrityLedger {
        &self.ledger
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn write(
        &mut self,
        entry: &Entry,
        expected_version: u64,
        op: &'static str,
    ) -> std::result::Result<(), WriteError> {
        let id = entry.id.as_str();
        let payload = codec::encode(entry)?;

        // The counter is on disk before the envelope leaves the process.
        let counter = self.ledger.next_nonce_counter(id)?;
        let envelope = crypto::seal(
            &payload,
            &self.key,
            &SealContext {
                id,
                kind: entry.kind(),
                version: entry.version,
            },
            counter,
            &mut self.rng,
        )?;

        let mut retried = false;
        let result = self.call(|store| {
            let r = store.put(id, &envelope, expected_version);
            if matches!(r, Err(StoreError::Transient(_))) {
                retried = true;
            }
            r
        });

        match result {
            Ok(()) => {}
            // A retried put may have landed the first time round.
            Err(StoreError::Conflict {
                current: Some(v),
            }) if retried && v == entry.version && self.store.get(id).as_ref() == Ok(&envelope) => {}
            Err(StoreError::Conflict { current }) => return Err(WriteError::Conflict(current)),
            Err(e) => return Err(store_error(id, op, e).into()),
        }

        self.ledger.record_version(id, entry.version)?;
        self.index.insert(
            id,
            EntryMeta {
                kind: entry.kind(),
                version: entry.version,
            },
        );
        tracing::debug!(id, op, version = entry.version, counter, "envelope stored");
        Ok(())
    }

    fn fetch(&mut self, id: &str, op: &'static str) -> Result<Envelope> {
        match self.call(|store| store.get(id)) {
            Ok(envelope) => Ok(envelope),
            Err(StoreError::NotFound) => {
                self.index.remove(id);
                Err(VaultError::NotFound(id.to_string()))
            }
            Err(e) => Err(store_error(id, op, e)),
        }
    }

    fn open_envelope(&mut self, id: &str, envelope: &Envelope) -> Result<Entry> {
        self.ledger.check_version(id, envelope.version)?;

        let plaintext = crypto::open(envelope, &self.key, id).map_err(|e| {
            tracing::warn!(id, version = envelope.version, "envelope failed authentication");
            e
        })?;
        let entry = codec::decode(&plaintext)?;

        // The header is authenticated, so a disagreement here means the
        // payload was built wrong, not tampered in transit.
        if entry.id != id || entry.version != envelope.version || entry.kind() != envelope.kind {
            return Err(VaultError::MalformedEntry(format!(
                "payload for '{id}' does not match its envelope header"
            )));
        }

        self.ledger.observe_nonce_counter(id, envelope.nonce_counter())?;
        self.ledger.record_version(id, envelope.version)?;
        Ok(entry)
    }

    /// Run a store call, retrying transient failures with backoff.
    fn call<T>(
        &self,
        mut f: impl FnMut(&S) -> std::result::Result<T, StoreError>,
    ) -> std::result::Result<T, StoreError> {
        let attempts = self.retry.attempts.max(1);
        let mut delay = self.retry.backoff;
        let mut attempt = 1;
        loop {
            match f(&self.store) {
                Err(StoreError::Transient(reason)) if attempt < attempts => {
                    tracing::debug!(attempt, %reason, "transient store error, retrying");
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Failure of the shared write path, keeping `Conflict` apart so each
/// operation can map it to its own error.
enum WriteError {
    Conflict(Option<u64>),
    Vault(VaultError),
}

impl From<VaultError> for WriteError {
    fn from(e: VaultError) -> Self {
        WriteError::Vault(e)
    }
}

/// Map a store failure on `id` during `op` to the vault taxonomy.
pub fn store_error(id: &str, op: &'static str, e: StoreError) -> VaultError {
    match e {
        StoreError::NotFound => VaultError::NotFound(id.to_string()),
        StoreError::Corrupt(reason) => VaultError::MalformedEntry(format!("{op} '{id}': {reason}")),
        StoreError::Transient(reason) => VaultError::TransientStore {
            id: id.to_string(),
            op,
            reason,
        },
        StoreError::Failed(reason) => VaultError::StoreFailed {
            id: id.to_string(),
            op,
            reason,
        },
        StoreError::Conflict { current } => VaultError::ConcurrentModification {
            id: id.to_string(),
            expected: 0,
            found: current.unwrap_or(0),
        },
    }
}

fn ledger_path(vault_dir: &Path) -> PathBuf {
    vault_dir.join(LEDGER_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SeededRandom;
    use crate::store::MemoryStore;
    use tempfile::TempDir;

    const SECRET: &[u8] = b"correct horse battery staple";

    fn session(dir: &Path, store: MemoryStore) -> VaultSession<MemoryStore, SeededRandom> {
        let key = if VaultMetadata::path(dir).exists() {
            unlock(dir, SECRET).unwrap()
        } else {
            create_vault(
                dir,
                SECRET,
                &KdfParams::insecure_fast(),
                &mut SeededRandom::new(1),
            )
            .unwrap()
        };
        VaultSession::connect(
            dir,
            key,
            store,
            SeededRandom::new(2),
            RetryPolicy::immediate(3),
        )
        .unwrap()
    }

    #[test]
    fn add_advances_ledger_before_store() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let mut s = session(dir.path(), store.clone());

        s.add("a", Secret::password("u", "p")).unwrap();
        let record = s.ledger().record("a").unwrap();
        assert_eq!(record.nonce_counter, 1);
        assert_eq!(record.version, Some(1));
    }

    #[test]
    fn failed_put_wastes_counter_but_never_reuses_it() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let mut s = session(dir.path(), store.clone());

        store.inject_transient_failures(3);
        let err = s.add("a", Secret::password("u", "p")).unwrap_err();
        assert!(matches!(err, VaultError::TransientStore { .. }));
        assert_eq!(s.ledger().record("a").unwrap().nonce_counter, 1);

        s.add("a", Secret::password("u", "p")).unwrap();
        let env = store.get("a").unwrap();
        assert_eq!(env.nonce_counter(), 2);
    }

    #[test]
    fn transient_failures_within_budget_are_retried() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let mut s = session(dir.path(), store.clone());

        store.inject_transient_failures(2);
        s.add("a", Secret::password("u", "p")).unwrap();
        assert_eq!(s.get("a").unwrap().version, 1);
    }

    #[test]
    fn wrong_master_secret_is_authentication_error() {
        let dir = TempDir::new().unwrap();
        drop(session(dir.path(), MemoryStore::new()));
        assert!(matches!(
            unlock(dir.path(), b"not the right secret"),
            Err(VaultError::Authentication)
        ));
    }

    #[test]
    fn create_twice_fails() {
        let dir = TempDir::new().unwrap();
        drop(session(dir.path(), MemoryStore::new()));
        let err = create_vault(
            dir.path(),
            SECRET,
            &KdfParams::insecure_fast(),
            &mut SeededRandom::new(1),
        )
        .unwrap_err();
        assert!(matches!(err, VaultError::VaultAlreadyExists(_)));
    }

    #[test]
    fn add_rejects_invalid_id() {
        let dir = TempDir::new().unwrap();
        let mut s = session(dir.path(), MemoryStore::new());
        assert!(matches!(
            s.add("../etc", Secret::password("u", "p")),
            Err(VaultError::InvalidEntryId(_))
        ));
    }
}
