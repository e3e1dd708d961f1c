//! Directory-backed envelope store.
//!
//! Each entry is one `<id>.blob` file holding the envelope wire bytes.
//! Metadata comes from the envelope header, so listing never needs a
//! key.  Point `store_dir` at a synced or network-mounted folder to use
//! it as the remote.
//!
//! Only interrupted or timed-out IO is reported as `Transient`; every
//! other local failure is `Failed`.  A blob that does not parse is left
//! out of `list_meta` and reported as `Corrupt` by `get`.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{check_expected, RemoteStore, StoreError};
use crate::crypto::Envelope;
use crate::errors::VaultError;
use crate::vault::format::write_atomic;
use crate::vault::EntryMeta;

/// File extension for stored envelopes.
const BLOB_EXT: &str = "blob";

/// Envelope store rooted at a directory.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: &Path) -> std::io::Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.{BLOB_EXT}"))
    }

    fn read_blob(&self, id: &str) -> Result<Option<Envelope>, StoreError> {
        match fs::read(self.blob_path(id)) {
            Ok(bytes) => Envelope::from_bytes(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(format!("{id}: {e}"))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(e)),
        }
    }
}

impl RemoteStore for DirStore {
    fn put(&self, id: &str, envelope: &Envelope, expected_version: u64) -> Result<(), StoreError> {
        let current = self.read_blob(id)?.map(|env| env.version);
        check_expected(current, expected_version)?;

        write_atomic(&self.blob_path(id), &envelope.to_bytes()).map_err(|e| match e {
            VaultError::Io(e) => io_error(e),
            other => StoreError::Failed(other.to_string()),
        })
    }

    fn get(&self, id: &str) -> Result<Envelope, StoreError> {
        self.read_blob(id)?.ok_or(StoreError::NotFound)
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.blob_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(e) => Err(io_error(e)),
        }
    }

    fn list_meta(&self) -> Result<BTreeMap<String, EntryMeta>, StoreError> {
        let mut meta = BTreeMap::new();

        for dir_entry in fs::read_dir(&self.root).map_err(io_error)? {
            let path = dir_entry.map_err(io_error)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BLOB_EXT) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            // Skip temp files left by an interrupted write.
            if id.starts_with('.') {
                continue;
            }

            match self.read_blob(id) {
                Ok(Some(env)) => {
                    meta.insert(
                        id.to_string(),
                        EntryMeta {
                            kind: env.kind,
                            version: env.version,
                        },
                    );
                }
                Ok(None) => {}
                Err(StoreError::Corrupt(reason)) => {
                    tracing::warn!(id, %reason, "skipping unreadable blob");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(meta)
    }
}

fn io_error(e: std::io::Error) -> StoreError {
    match e.kind() {
        ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock => {
            StoreError::Transient(e.to_string())
        }
        _ => StoreError::Failed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::EntryKind;
    use tempfile::TempDir;

    fn envelope(kind: EntryKind, version: u64) -> Envelope {
        Envelope {
            kind,
            version,
            nonce: [1u8; 12],
            ciphertext: vec![0xAA; 20],
            tag: [2u8; 16],
        }
    }

    #[test]
    fn put_get_roundtrip_through_files() {
        let dir = TempDir::new().unwrap();
        let store = DirStore::open(dir.path()).unwrap();

        store.put("mail", &envelope(EntryKind::Password, 1), 0).unwrap();
        assert!(dir.path().join("mail.blob").exists());
        assert_eq!(store.get("mail").unwrap(), envelope(EntryKind::Password, 1));
    }

    #[test]
    fn list_meta_reads_headers_only() {
        let dir = TempDir::new().unwrap();
        let store = DirStore::open(dir.path()).unwrap();
        store.put("visa", &envelope(EntryKind::Card, 1), 0).unwrap();
        store.put("stripe", &envelope(EntryKind::ApiKey, 1), 0).unwrap();
        store.put("stripe", &envelope(EntryKind::ApiKey, 2), 1).unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let meta = store.list_meta().unwrap();
        assert_eq!(meta.len(), 2);
        assert_eq!(meta["visa"].kind, EntryKind::Card);
        assert_eq!(meta["stripe"].version, 2);
    }

    #[test]
    fn conflicts_and_missing_entries() {
        let dir = TempDir::new().unwrap();
        let store = DirStore::open(dir.path()).unwrap();
        store.put("a", &envelope(EntryKind::Password, 1), 0).unwrap();

        assert_eq!(
            store.put("a", &envelope(EntryKind::Password, 1), 0),
            Err(StoreError::Conflict { current: Some(1) })
        );
        assert_eq!(store.get("b"), Err(StoreError::NotFound));
        assert_eq!(store.delete("b"), Err(StoreError::NotFound));

        store.delete("a").unwrap();
        assert_eq!(store.get("a"), Err(StoreError::NotFound));
    }

    #[test]
    fn corrupt_blob_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = DirStore::open(dir.path()).unwrap();
        fs::write(dir.path().join("bad.blob"), b"nope").unwrap();
        assert!(matches!(store.get("bad"), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn list_meta_skips_corrupt_blobs() {
        let dir = TempDir::new().unwrap();
        let store = DirStore::open(dir.path()).unwrap();
        store.put("good", &envelope(EntryKind::Password, 1), 0).unwrap();
        fs::write(dir.path().join("junk.blob"), [0x01, 0x02]).unwrap();

        let meta = store.list_meta().unwrap();
        assert_eq!(meta.len(), 1);
        assert!(meta.contains_key("good"));

        // Still reachable by id, so it can be inspected and removed.
        assert!(matches!(store.get("junk"), Err(StoreError::Corrupt(_))));
        store.delete("junk").unwrap();
        assert!(!dir.path().join("junk.blob").exists());
    }

    #[test]
    fn missing_root_is_a_terminal_failure() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("store");
        let store = DirStore::open(&root).unwrap();
        fs::remove_dir(&root).unwrap();
        fs::write(&root, b"now a file").unwrap();

        assert!(matches!(store.list_meta(), Err(StoreError::Failed(_))));
        assert!(matches!(
            store.put("a", &envelope(EntryKind::Password, 1), 0),
            Err(StoreError::Failed(_))
        ));
    }

    #[test]
    fn only_temporary_io_errors_are_transient() {
        use std::io::Error;

        for kind in [ErrorKind::Interrupted, ErrorKind::TimedOut, ErrorKind::WouldBlock] {
            assert!(matches!(io_error(Error::from(kind)), StoreError::Transient(_)));
        }
        for kind in [
            ErrorKind::PermissionDenied,
            ErrorKind::AlreadyExists,
            ErrorKind::InvalidData,
        ] {
            assert!(matches!(io_error(Error::from(kind)), StoreError::Failed(_)));
        }
    }
}
