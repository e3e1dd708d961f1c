//! The derived vault key and its HKDF-SHA256 sub-keys.
//!
//! From the Argon2id output we derive:
//! - A unique **per-entry** encryption key for each entry id.
//! - A dedicated **ledger key** for the integrity ledger's HMAC.
//! - A **key check** tag stored in vault metadata to reject a wrong
//!   master secret before any entry is opened.
//! - A **store auth token** the HTTP store uses to tell vaults apart.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use crate::errors::{Result, VaultError};

/// Length of the derived key and every sub-key (256 bits).
pub const KEY_LEN: usize = 32;

/// Symmetric key material held only in process memory.
///
/// Zeroed when dropped, so leaving scope on any path (success, `?`,
/// panic unwind) wipes it.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct DerivedKey {
    bytes: [u8; KEY_LEN],
}

impl DerivedKey {
    /// Create a `DerivedKey` from raw bytes.
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    pub(crate) fn zeroed() -> Self {
        Self {
            bytes: [0u8; KEY_LEN],
        }
    }

    pub(crate) fn as_mut_bytes(&mut self) -> &mut [u8; KEY_LEN] {
        &mut self.bytes
    }

    /// Access the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Derive the encryption key for one entry.
    ///
    /// `info` is `"vaultkeep-entry:<id>"`, so every entry id gets an
    /// independent AEAD key and nonce counters only need to be unique
    /// per id.
    pub fn entry_key(&self, id: &str) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        let info = format!("vaultkeep-entry:{id}");
        hkdf_derive(&self.bytes, info.as_bytes())
    }

    /// Derive the HMAC key that protects the integrity ledger file.
    pub fn ledger_key(&self) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        hkdf_derive(&self.bytes, b"vaultkeep-ledger")
    }

    /// Compute the key check tag stored in vault metadata.
    pub fn key_check(&self) -> Result<Vec<u8>> {
        let check_key = hkdf_derive(&self.bytes, b"vaultkeep-key-check")?;
        let mut mac = Hmac::<Sha256>::new_from_slice(&check_key[..])
            .map_err(|e| VaultError::KeyDerivationFailed(format!("HMAC init failed: {e}")))?;
        mac.update(b"vaultkeep key check v1");
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Verify this key against a stored key check tag in constant time.
    pub fn verify_key_check(&self, expected: &[u8]) -> Result<()> {
        let actual = self.key_check()?;
        if actual.as_slice().ct_eq(expected).into() {
            Ok(())
        } else {
            Err(VaultError::Authentication)
        }
    }

    /// Token presented to the remote store as proof of vault ownership.
    ///
    /// The store only ever sees `hex(SHA-256(k_auth))`, which reveals
    /// nothing about the encryption keys.
    pub fn store_auth_token(&self) -> Result<String> {
        let auth_key = hkdf_derive(&self.bytes, b"vaultkeep-store-auth")?;
        let digest = Sha256::digest(&auth_key[..]);
        Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey(<redacted>)")
    }
}

/// Run HKDF-SHA256 expand with the given `info`.
///
/// The input already came out of Argon2id, so it is used directly as
/// the pseudo-random key with no extract salt.
fn hkdf_derive(ikm: &[u8], info: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let hk = Hkdf::<Sha256>::new(None, ikm);

    let mut okm = Zeroizing::new([0u8; KEY_LEN]);
    hk.expand(info, &mut okm[..])
        .map_err(|e| VaultError::KeyDerivationFailed(format!("HKDF expand failed: {e}")))?;

    Ok(okm)
}
