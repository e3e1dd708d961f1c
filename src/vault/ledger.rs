//! Integrity ledger: per-entry nonce counters and last-seen versions.
//!
//! The ledger lives in `<vault_dir>/ledger.json` and is rewritten
//! atomically on every change.  Layout:
//!
//! ```text
//! [VKLG: 4 bytes][records JSON][HMAC-SHA256: 32 bytes]
//! ```
//!
//! The HMAC key is an HKDF sub-key of the vault key, so the remote
//! store (or anyone else without the master secret) cannot rewind the
//! counters without the change being detected.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use super::format::write_atomic;
use crate::crypto::keys::{DerivedKey, KEY_LEN};
use crate::errors::{Result, VaultError};

/// Magic bytes at the start of the ledger file.
const MAGIC: &[u8; 4] = b"VKLG";

/// Size of the HMAC tag appended to the file (SHA-256 = 32 bytes).
const HMAC_LEN: usize = 32;

/// What the ledger remembers about one entry id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Last nonce counter handed out for this id.  Never decreases,
    /// not even when the entry is deleted.
    pub nonce_counter: u64,
    /// Last version written or read for this id, if the entry exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

/// Persisted per-entry nonce and version tracking.
pub struct IntegrityLedger {
    path: PathBuf,
    mac_key: Zeroizing<[u8; KEY_LEN]>,
    records: BTreeMap<String, LedgerRecord>,
}

impl IntegrityLedger {
    /// Open the ledger at `path`, or start an empty one if the file
    /// does not exist yet.
    pub fn open(path: &Path, key: &DerivedKey) -> Result<Self> {
        let mac_key = key.ledger_key()?;

        let records = if path.exists() {
            read_ledger(path, &mac_key[..])?
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = %path.display(), entries = records.len(), "ledger opened");

        Ok(Self {
            path: path.to_path_buf(),
            mac_key,
            records,
        })
    }

    /// Reserve the next nonce counter for `id`.
    ///
    /// The new value is on disk before it is returned, so a crash after
    /// this call can waste a counter but never hand it out twice.
    pub fn next_nonce_counter(&mut self, id: &str) -> Result<u64> {
        let record = self.records.entry(id.to_string()).or_default();
        let next = record.nonce_counter.checked_add(1).ok_or_else(|| {
            VaultError::EncryptionFailed(format!("nonce counter exhausted for '{id}'"))
        })?;
        record.nonce_counter = next;
        self.save()?;
        Ok(next)
    }

    /// Raise the counter for `id` to at least `counter`.
    ///
    /// Called with the counter found in a fetched envelope, so a ledger
    /// that was lost and recreated still never reuses a counter the
    /// store has already seen.
    pub fn observe_nonce_counter(&mut self, id: &str, counter: u64) -> Result<()> {
        let record = self.records.entry(id.to_string()).or_default();
        if counter > record.nonce_counter {
            record.nonce_counter = counter;
            self.save()?;
        }
        Ok(())
    }

    /// Remember `version` as the latest one for `id`.
    pub fn record_version(&mut self, id: &str, version: u64) -> Result<()> {
        let record = self.records.entry(id.to_string()).or_default();
        if record.version != Some(version) {
            record.version = Some(version);
            self.save()?;
        }
        Ok(())
    }

    /// Reject a version older than the one last recorded for `id`.
    ///
    /// An older version means the store served a stale or replayed
    /// envelope.
    pub fn check_version(&self, id: &str, version: u64) -> Result<()> {
        match self.records.get(id).and_then(|r| r.version) {
            Some(recorded) if version < recorded => Err(VaultError::VersionMismatch {
                id: id.to_string(),
                op: "ledger check",
                indexed: recorded,
                stored: version,
            }),
            _ => Ok(()),
        }
    }

    /// Drop the version for a deleted entry, keeping its nonce counter.
    pub fn forget_version(&mut self, id: &str) -> Result<()> {
        if let Some(record) = self.records.get_mut(id) {
            if record.version.take().is_some() {
                self.save()?;
            }
        }
        Ok(())
    }

    pub fn record(&self, id: &str) -> Option<LedgerRecord> {
        self.records.get(id).copied()
    }

    fn save(&self) -> Result<()> {
        let body = serde_json::to_vec(&self.records)
            .map_err(|e| VaultError::SerializationError(format!("ledger: {e}")))?;
        let tag = compute_hmac(&self.mac_key[..], &body)?;

        let mut buf = Vec::with_capacity(MAGIC.len() + body.len() + HMAC_LEN);
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&body);
        buf.extend_from_slice(&tag);

        write_atomic(&self.path, &buf)
    }
}

/// Read and verify a ledger file.  The HMAC is checked over the raw
/// bytes from disk before the JSON is parsed.
fn read_ledger(path: &Path, mac_key: &[u8]) -> Result<BTreeMap<String, LedgerRecord>> {
    let data = fs::read(path)?;

    if data.len() < MAGIC.len() + HMAC_LEN || &data[..MAGIC.len()] != MAGIC {
        return Err(VaultError::LedgerTampered(path.to_path_buf()));
    }

    let body_end = data.len() - HMAC_LEN;
    let body = &data[MAGIC.len()..body_end];

    let mut mac = Hmac::<Sha256>::new_from_slice(mac_key)
        .map_err(|e| VaultError::KeyDerivationFailed(format!("invalid HMAC key: {e}")))?;
    mac.update(body);
    mac.verify_slice(&data[body_end..])
        .map_err(|_| VaultError::LedgerTampered(path.to_path_buf()))?;

    serde_json::from_slice(body).map_err(|e| VaultError::SerializationError(format!("ledger: {e}")))
}

fn compute_hmac(mac_key: &[u8], body: &[u8]) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(mac_key)
        .map_err(|e| VaultError::KeyDerivationFailed(format!("invalid HMAC key: {e}")))?;
    mac.update(body);
    Ok(mac.finalize().into_bytes().to_vec())
}
