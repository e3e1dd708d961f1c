//! Master-secret key derivation using Argon2id.
//!
//! Argon2id is memory-hard, so an attacker holding the salt and a
//! stolen envelope still pays the full memory cost for every guess.
//! The parameters are persisted in the vault metadata, which lets new
//! vaults raise them without breaking old ones.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};

use super::keys::{DerivedKey, KEY_LEN};
use super::random::RandomSource;
use crate::errors::{Result, VaultError};

/// Length of the salt in bytes (256 bits).
pub const SALT_LEN: usize = 32;

/// Default minimum master-secret length in bytes.
pub const DEFAULT_MIN_SECRET_LEN: usize = 8;

/// Minimum safe memory cost in KiB (8 MB).
const MIN_MEMORY_KIB: u32 = 8_192;

/// Per-vault random salt.  Not secret, but never shared between vaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Salt([u8; SALT_LEN]);

impl Salt {
    /// Generate a fresh salt from `rng`.
    pub fn generate(rng: &mut impl RandomSource) -> Self {
        let mut bytes = [0u8; SALT_LEN];
        rng.fill(&mut bytes);
        Self(bytes)
    }

    /// Rebuild a salt read back from vault metadata.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; SALT_LEN] = bytes.try_into().map_err(|_| {
            VaultError::KeyDerivationFailed(format!(
                "salt must be {SALT_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; SALT_LEN] {
        &self.0
    }
}

/// Argon2id cost parameters, persisted alongside the salt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65 536 = 64 MB).
    pub memory_kib: u32,
    /// Number of iterations (default: 3).
    pub iterations: u32,
    /// Parallelism lanes (default: 4).
    pub parallelism: u32,
    /// Minimum accepted master-secret length in bytes.
    #[serde(default = "default_min_secret_len")]
    pub min_secret_len: usize,
}

fn default_min_secret_len() -> usize {
    DEFAULT_MIN_SECRET_LEN
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 65_536,
            iterations: 3,
            parallelism: 4,
            min_secret_len: DEFAULT_MIN_SECRET_LEN,
        }
    }
}

impl KdfParams {
    /// Cheapest parameters that still pass validation.  Tests only.
    pub fn insecure_fast() -> Self {
        Self {
            memory_kib: MIN_MEMORY_KIB,
            iterations: 1,
            parallelism: 1,
            min_secret_len: DEFAULT_MIN_SECRET_LEN,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.memory_kib < MIN_MEMORY_KIB {
            return Err(VaultError::KeyDerivationFailed(format!(
                "Argon2 memory_kib must be at least {MIN_MEMORY_KIB} (got {})",
                self.memory_kib
            )));
        }
        if self.iterations < 1 {
            return Err(VaultError::KeyDerivationFailed(
                "Argon2 iterations must be at least 1".into(),
            ));
        }
        if self.parallelism < 1 {
            return Err(VaultError::KeyDerivationFailed(
                "Argon2 parallelism must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Derive the vault key from a master secret.
///
/// The same secret + salt + params always produce the same key.
/// Fails with `WeakSecret` for an empty secret or one shorter than
/// `params.min_secret_len`.
pub fn derive(master_secret: &[u8], salt: &Salt, params: &KdfParams) -> Result<DerivedKey> {
    let min = params.min_secret_len.max(1);
    if master_secret.len() < min {
        return Err(VaultError::WeakSecret { min });
    }
    params.validate()?;

    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| VaultError::KeyDerivationFailed(format!("invalid Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = DerivedKey::zeroed();
    argon2
        .hash_password_into(master_secret, salt.as_bytes(), key.as_mut_bytes())
        .map_err(|e| VaultError::KeyDerivationFailed(format!("Argon2id hashing failed: {e}")))?;

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::random::SeededRandom;

    #[test]
    fn empty_secret_is_weak() {
        let salt = Salt::generate(&mut SeededRandom::new(1));
        let err = derive(b"", &salt, &KdfParams::insecure_fast()).unwrap_err();
        assert!(matches!(err, VaultError::WeakSecret { .. }));
    }

    #[test]
    fn short_secret_is_weak() {
        let salt = Salt::generate(&mut SeededRandom::new(1));
        let err = derive(b"short", &salt, &KdfParams::insecure_fast()).unwrap_err();
        assert!(matches!(err, VaultError::WeakSecret { min: 8 }));
    }

    #[test]
    fn rejects_too_little_memory() {
        let salt = Salt::generate(&mut SeededRandom::new(1));
        let params = KdfParams {
            memory_kib: 1024,
            ..KdfParams::insecure_fast()
        };
        let err = derive(b"long-enough-secret", &salt, &params).unwrap_err();
        assert!(matches!(err, VaultError::KeyDerivationFailed(_)));
    }

    #[test]
    fn salt_from_slice_checks_length() {
        assert!(Salt::from_slice(&[0u8; 16]).is_err());
        assert!(Salt::from_slice(&[0u8; SALT_LEN]).is_ok());
    }

    #[test]
    fn missing_min_secret_len_defaults_on_deserialize() {
        let json = r#"{"memory_kib":65536,"iterations":3,"parallelism":4}"#;
        let params: KdfParams = serde_json::from_str(json).unwrap();
        assert_eq!(params.min_secret_len, DEFAULT_MIN_SECRET_LEN);
    }
}
