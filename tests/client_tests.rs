//! Integration tests for `VaultSession` against in-memory and directory
//! stores.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use tempfile::TempDir;
use vaultkeep::crypto::{Envelope, KdfParams, SeededRandom};
use vaultkeep::errors::VaultError;
use vaultkeep::store::{DirStore, MemoryStore, RemoteStore, StoreError};
use vaultkeep::vault::{
    create_vault, unlock, EntryKind, EntryMeta, RetryPolicy, Secret, VaultSession,
};

const MASTER: &[u8] = b"correct horse battery staple";

/// Create the vault on first use, then connect a session to `store`.
fn session<S: RemoteStore>(dir: &Path, store: S, seed: u64) -> VaultSession<S, SeededRandom> {
    let key = if dir.join("vault.json").exists() {
        unlock(dir, MASTER).unwrap()
    } else {
        create_vault(dir, MASTER, &KdfParams::insecure_fast(), &mut SeededRandom::new(seed)).unwrap()
    };
    VaultSession::connect(
        dir,
        key,
        store,
        SeededRandom::new(seed + 1),
        RetryPolicy::immediate(3),
    )
    .unwrap()
}

fn login(user: &str, pass: &str) -> Secret {
    Secret::Password {
        username: user.into(),
        password: pass.into(),
        url: "https://example.com".into(),
    }
}

// ---------------------------------------------------------------------------
// Entry lifecycle
// ---------------------------------------------------------------------------

#[test]
fn add_get_delete_readd() {
    let dir = TempDir::new().unwrap();
    let mut s = session(dir.path(), MemoryStore::new(), 1);

    s.add("a", login("u", "p")).unwrap();
    let got = s.get("a").unwrap();
    assert_eq!(got.version, 1);
    assert_eq!(got.secret.field("password"), Some("p"));

    s.delete("a").unwrap();
    assert!(matches!(s.get("a"), Err(VaultError::NotFound(_))));

    let again = s.add("a", login("u", "p2")).unwrap();
    assert_eq!(again.version, 1);
    assert_eq!(s.get("a").unwrap().secret.field("password"), Some("p2"));
}

#[test]
fn readd_after_delete_uses_a_fresh_nonce() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let mut s = session(dir.path(), store.clone(), 1);

    s.add("a", login("u", "p")).unwrap();
    let first = store.get("a").unwrap().nonce;
    s.delete("a").unwrap();
    s.add("a", login("u", "p")).unwrap();
    let second = store.get("a").unwrap();

    assert_ne!(first, second.nonce);
    assert_eq!(second.nonce_counter(), 2);
}

#[test]
fn ls_after_two_adds_and_one_delete() {
    let dir = TempDir::new().unwrap();
    let mut s = session(dir.path(), MemoryStore::new(), 1);

    s.add("a", login("u", "p")).unwrap();
    s.add(
        "b",
        Secret::ApiKey {
            service: "stripe".into(),
            key: "sk".into(),
        },
    )
    .unwrap();
    s.delete("a").unwrap();

    let listed = s.list(None);
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].0, "b");
    assert_eq!(listed[0].1.kind, EntryKind::ApiKey);
    assert_eq!(listed[0].1.version, 1);

    assert!(s.list(Some(EntryKind::Password)).is_empty());
}

#[test]
fn duplicate_add_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut s = session(dir.path(), MemoryStore::new(), 1);

    s.add("a", login("u", "p")).unwrap();
    assert!(matches!(
        s.add("a", login("u", "other")),
        Err(VaultError::DuplicateEntry(_))
    ));
}

#[test]
fn duplicate_add_from_another_session_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let mut first = session(dir.path(), store.clone(), 1);
    let mut second = session(dir.path(), store.clone(), 5);

    first.add("a", login("u", "p")).unwrap();
    // `second` built its index before the add; the store still refuses.
    assert!(matches!(
        second.add("a", login("u", "p")),
        Err(VaultError::DuplicateEntry(_))
    ));
}

#[test]
fn delete_missing_is_not_found() {
    let dir = TempDir::new().unwrap();
    let mut s = session(dir.path(), MemoryStore::new(), 1);
    assert!(matches!(s.delete("ghost"), Err(VaultError::NotFound(_))));
}

#[test]
fn exists_checks_index_then_store() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let mut s = session(dir.path(), store.clone(), 1);
    assert!(!s.exists("a").unwrap());

    // Written by another session after this one listed the store.
    let mut other = session(dir.path(), store.clone(), 5);
    other.add("a", login("u", "p")).unwrap();
    assert!(s.exists("a").unwrap());
}

// ---------------------------------------------------------------------------
// Optimistic concurrency
// ---------------------------------------------------------------------------

#[test]
fn stale_edit_conflicts_then_succeeds_after_fresh_read() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let mut alice = session(dir.path(), store.clone(), 1);

    alice.add("a", login("u", "p1")).unwrap();
    let stale = alice.get("a").unwrap().version;

    // Another writer bumps the entry to v2.
    let mut bob = session(dir.path(), store.clone(), 9);
    let read = bob.get("a").unwrap();
    bob.edit("a", read.version, login("u", "p2")).unwrap();

    let err = alice.edit("a", stale, login("u", "p3")).unwrap_err();
    assert!(matches!(
        err,
        VaultError::ConcurrentModification {
            expected: 1,
            found: 2,
            ..
        }
    ));
    // Nothing was written by the failed edit.
    assert_eq!(alice.get("a").unwrap().secret.field("password"), Some("p2"));

    let fresh = alice.get("a").unwrap();
    let edited = alice.edit("a", fresh.version, login("u", "p3")).unwrap();
    assert_eq!(edited.version, 3);
    assert_eq!(alice.get("a").unwrap().secret.field("password"), Some("p3"));
}

#[test]
fn edit_missing_entry_is_not_found() {
    let dir = TempDir::new().unwrap();
    let mut s = session(dir.path(), MemoryStore::new(), 1);
    assert!(matches!(
        s.edit("nope", 1, login("u", "p")),
        Err(VaultError::NotFound(_))
    ));
}

// ---------------------------------------------------------------------------
// Integrity
// ---------------------------------------------------------------------------

#[test]
fn bit_flip_in_stored_blob_fails_authentication() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let mut s = session(dir.path(), store.clone(), 1);
    s.add("a", login("u", "p")).unwrap();

    let mut raw = store.raw_blob("a").unwrap();
    let last = raw.len() - 1;
    raw[last] ^= 0x01; // inside the tag
    store.replace_raw_blob("a", raw);

    assert!(matches!(s.get("a"), Err(VaultError::Authentication)));
}

#[test]
fn relabelled_version_header_fails_authentication() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let mut s = session(dir.path(), store.clone(), 1);
    s.add("a", login("u", "p")).unwrap();

    let mut env = store.get("a").unwrap();
    env.version = 5;
    store.replace_raw_blob("a", env.to_bytes());
    store.set_meta_version("a", 5);

    assert!(matches!(s.get("a"), Err(VaultError::Authentication)));
}

#[test]
fn index_and_envelope_disagreement_is_version_mismatch() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let mut s = session(dir.path(), store.clone(), 1);
    s.add("a", login("u", "p")).unwrap();

    // Store metadata claims v4 while the blob is still v1.
    store.set_meta_version("a", 4);
    s.refresh().unwrap();

    assert!(matches!(
        s.get("a"),
        Err(VaultError::VersionMismatch {
            indexed: 4,
            stored: 1,
            ..
        })
    ));
}

#[test]
fn rolled_back_blob_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let mut s = session(dir.path(), store.clone(), 1);

    s.add("a", login("u", "p1")).unwrap();
    let old_blob = store.raw_blob("a").unwrap();
    s.edit("a", 1, login("u", "p2")).unwrap();

    // The store serves the old, validly-sealed v1 again.
    store.replace_raw_blob("a", old_blob);
    store.set_meta_version("a", 1);
    s.refresh().unwrap();

    assert!(matches!(
        s.get("a"),
        Err(VaultError::VersionMismatch { .. })
    ));
}

#[test]
fn blob_moved_to_another_id_fails_authentication() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let mut s = session(dir.path(), store.clone(), 1);
    s.add("a", login("u", "p")).unwrap();
    s.add("b", login("v", "q")).unwrap();

    store.replace_raw_blob("b", store.raw_blob("a").unwrap());
    assert!(matches!(s.get("b"), Err(VaultError::Authentication)));
}

#[test]
fn wrong_master_secret_fails_before_any_entry() {
    let dir = TempDir::new().unwrap();
    drop(session(dir.path(), MemoryStore::new(), 1));

    assert!(matches!(
        VaultSession::open(dir.path(), b"the wrong master secret", MemoryStore::new()),
        Err(VaultError::Authentication)
    ));
}

#[test]
fn tampered_ledger_is_detected_on_open() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let mut s = session(dir.path(), store.clone(), 1);
    s.add("a", login("u", "p")).unwrap();
    drop(s);

    let path = dir.path().join("ledger.json");
    let mut bytes = std::fs::read(&path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0x20;
    std::fs::write(&path, bytes).unwrap();

    let key = unlock(dir.path(), MASTER).unwrap();
    assert!(matches!(
        VaultSession::connect(
            dir.path(),
            key,
            store,
            SeededRandom::new(1),
            RetryPolicy::immediate(1)
        ),
        Err(VaultError::LedgerTampered(_))
    ));
}

// ---------------------------------------------------------------------------
// Ledger counters
// ---------------------------------------------------------------------------

#[test]
fn nonce_counters_increase_across_reopen() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new();

    let mut s = session(dir.path(), store.clone(), 1);
    s.add("a", login("u", "p1")).unwrap();
    s.edit("a", 1, login("u", "p2")).unwrap();
    let before = store.get("a").unwrap().nonce_counter();
    drop(s);

    let mut s = session(dir.path(), store.clone(), 1);
    s.edit("a", 2, login("u", "p3")).unwrap();
    let after = store.get("a").unwrap().nonce_counter();

    assert_eq!(before, 2);
    assert_eq!(after, 3);
}

#[test]
fn lost_ledger_never_reuses_a_nonce_counter_after_a_read() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new();

    let mut s = session(dir.path(), store.clone(), 1);
    s.add("a", login("u", "p1")).unwrap();
    s.edit("a", 1, login("u", "p2")).unwrap();
    drop(s);

    std::fs::remove_file(dir.path().join("ledger.json")).unwrap();

    let mut s = session(dir.path(), store.clone(), 1);
    let current = s.get("a").unwrap();
    s.edit("a", current.version, login("u", "p3")).unwrap();
    assert!(store.get("a").unwrap().nonce_counter() > 2);
}

// ---------------------------------------------------------------------------
// Store behaviour
// ---------------------------------------------------------------------------

#[test]
fn transient_failures_are_retried_within_budget() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let mut s = session(dir.path(), store.clone(), 1);

    store.inject_transient_failures(2);
    s.add("a", login("u", "p")).unwrap();
    store.inject_transient_failures(2);
    assert_eq!(s.get("a").unwrap().version, 1);
}

#[test]
fn exhausted_retries_surface_transient_store() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let mut s = session(dir.path(), store.clone(), 1);
    s.add("a", login("u", "p")).unwrap();

    store.inject_transient_failures(10);
    let err = s.get("a").unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(err, VaultError::TransientStore { op: "get", .. }));
}

#[test]
fn add_and_edit_survive_a_lost_acknowledgement() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let mut s = session(dir.path(), store.clone(), 1);

    store.drop_next_acks(1);
    assert_eq!(s.add("a", login("u", "p1")).unwrap().version, 1);

    store.drop_next_acks(1);
    assert_eq!(s.edit("a", 1, login("u", "p2")).unwrap().version, 2);

    let mut fresh = session(dir.path(), store.clone(), 3);
    let entry = fresh.get("a").unwrap();
    assert_eq!(entry.version, 2);
    assert_eq!(entry.secret.field("password"), Some("p2"));
}

/// Puts another writer's envelope in place of the next put, then loses
/// the reply.
struct RivalWriter {
    inner: MemoryStore,
    rival: Mutex<Option<Envelope>>,
}

impl RivalWriter {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            rival: Mutex::new(None),
        }
    }

    fn arm(&self, version: u64) {
        *self.rival.lock().unwrap() = Some(Envelope {
            kind: EntryKind::Password,
            version,
            nonce: [7u8; 12],
            ciphertext: vec![0x42; 24],
            tag: [9u8; 16],
        });
    }
}

impl RemoteStore for RivalWriter {
    fn put(&self, id: &str, envelope: &Envelope, expected_version: u64) -> Result<(), StoreError> {
        if let Some(rival) = self.rival.lock().unwrap().take() {
            self.inner.put(id, &rival, expected_version)?;
            return Err(StoreError::Transient("reply lost".into()));
        }
        self.inner.put(id, envelope, expected_version)
    }

    fn get(&self, id: &str) -> Result<Envelope, StoreError> {
        self.inner.get(id)
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.inner.delete(id)
    }

    fn list_meta(&self) -> Result<BTreeMap<String, EntryMeta>, StoreError> {
        self.inner.list_meta()
    }
}

#[test]
fn different_envelope_at_same_version_after_retry_stays_a_conflict() {
    let dir = TempDir::new().unwrap();
    let mut s = session(dir.path(), RivalWriter::new(), 1);

    s.store().arm(1);
    assert!(matches!(
        s.add("a", login("u", "p")),
        Err(VaultError::DuplicateEntry(_))
    ));

    s.add("b", login("u", "p1")).unwrap();
    s.store().arm(2);
    assert!(matches!(
        s.edit("b", 1, login("u", "p2")),
        Err(VaultError::ConcurrentModification {
            expected: 1,
            found: 2,
            ..
        })
    ));
}

#[test]
fn unreadable_blob_does_not_block_the_session() {
    let vault = TempDir::new().unwrap();
    let blobs = TempDir::new().unwrap();

    let mut s = session(vault.path(), DirStore::open(blobs.path()).unwrap(), 1);
    s.add("good", login("u", "p")).unwrap();
    drop(s);
    std::fs::write(blobs.path().join("junk.blob"), [0x01, 0x02]).unwrap();

    let mut s = session(vault.path(), DirStore::open(blobs.path()).unwrap(), 1);
    let ids: Vec<String> = s.list(None).into_iter().map(|(id, _)| id).collect();
    assert_eq!(ids, ["good"]);
    assert!(matches!(s.get("junk"), Err(VaultError::MalformedEntry(_))));

    assert!(s.exists("junk").unwrap());
    s.delete("junk").unwrap();
    assert!(!s.exists("junk").unwrap());
    s.add("other", login("u", "p")).unwrap();
}

#[test]
fn local_store_failure_is_terminal() {
    let vault = TempDir::new().unwrap();
    let blobs = TempDir::new().unwrap();
    let root = blobs.path().join("store");

    let mut s = session(vault.path(), DirStore::open(&root).unwrap(), 1);
    std::fs::remove_dir(&root).unwrap();
    std::fs::write(&root, b"not a directory").unwrap();

    let err = s.add("a", login("u", "p")).unwrap_err();
    assert!(matches!(err, VaultError::StoreFailed { op: "add", .. }));
    assert!(!err.is_retryable());
    assert_eq!(err.exit_code(), 20);
}

#[test]
fn store_only_ever_sees_ciphertext() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let mut s = session(dir.path(), store.clone(), 1);
    s.add("a", login("alice", "very-secret-password")).unwrap();

    let raw = store.raw_blob("a").unwrap();
    let needle = b"very-secret-password";
    assert!(!raw.windows(needle.len()).any(|w| w == needle));
    let needle = b"alice";
    assert!(!raw.windows(needle.len()).any(|w| w == needle));
}

#[test]
fn directory_store_persists_between_sessions() {
    let vault = TempDir::new().unwrap();
    let blobs = TempDir::new().unwrap();

    let mut s = session(vault.path(), DirStore::open(blobs.path()).unwrap(), 1);
    s.add(
        "visa",
        Secret::Card {
            cardholder: "Alice".into(),
            number: "4111111111111111".into(),
            expiry: "09/29".into(),
            cvv: "123".into(),
        },
    )
    .unwrap();
    drop(s);

    let mut s = session(vault.path(), DirStore::open(blobs.path()).unwrap(), 1);
    assert_eq!(s.list(Some(EntryKind::Card)).len(), 1);
    let card = s.get("visa").unwrap();
    assert_eq!(card.secret.field("cvv"), Some("123"));

    let on_disk = std::fs::read(blobs.path().join("visa.blob")).unwrap();
    assert!(Envelope::from_bytes(&on_disk).is_ok());
}
