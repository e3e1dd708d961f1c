//! On-disk formats that live next to the vault: the metadata record
//! and the atomic-write helper shared by everything the client persists.
//!
//! `vault.json` holds the salt, the KDF parameters and the key check
//! tag.  None of it is secret, and it must be readable before any key
//! can be derived.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::{KdfParams, Salt, SCHEMA_VERSION};
use crate::errors::{Result, VaultError};

/// File name of the metadata record inside the vault directory.
pub const METADATA_FILE: &str = "vault.json";

/// File name of the integrity ledger inside the vault directory.
pub const LEDGER_FILE: &str = "ledger.json";

// ---------------------------------------------------------------------------
// VaultMetadata
// ---------------------------------------------------------------------------

/// Persisted, non-secret description of a vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultMetadata {
    /// Envelope schema version the vault was created with.
    pub schema_version: u8,

    /// The salt used for Argon2id key derivation (base64 in JSON).
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub salt: Vec<u8>,

    /// Argon2id parameters used at creation.
    pub kdf: KdfParams,

    /// HMAC tag that proves a derived key is the right one (base64).
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub key_check: Vec<u8>,

    /// When this vault was first created.
    pub created_at: DateTime<Utc>,
}

impl VaultMetadata {
    pub fn new(salt: &Salt, kdf: KdfParams, key_check: Vec<u8>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            salt: salt.as_bytes().to_vec(),
            kdf,
            key_check,
            created_at: Utc::now(),
        }
    }

    pub fn path(vault_dir: &Path) -> PathBuf {
        vault_dir.join(METADATA_FILE)
    }

    /// Read `vault.json` from `vault_dir`.
    pub fn load(vault_dir: &Path) -> Result<Self> {
        let path = Self::path(vault_dir);
        if !path.exists() {
            return Err(VaultError::VaultNotInitialized(vault_dir.to_path_buf()));
        }

        let contents = fs::read(&path)?;
        let meta: VaultMetadata = serde_json::from_slice(&contents).map_err(|e| {
            VaultError::SerializationError(format!("{}: {e}", path.display()))
        })?;

        if meta.schema_version != SCHEMA_VERSION {
            return Err(VaultError::UnsupportedSchema(meta.schema_version));
        }

        Ok(meta)
    }

    /// Write `vault.json` into `vault_dir` atomically, creating the
    /// directory if needed.
    pub fn save(&self, vault_dir: &Path) -> Result<()> {
        fs::create_dir_all(vault_dir)?;
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| VaultError::SerializationError(format!("metadata: {e}")))?;
        write_atomic(&Self::path(vault_dir), &bytes)
    }

    pub fn salt(&self) -> Result<Salt> {
        Salt::from_slice(&self.salt)
    }
}

// ---------------------------------------------------------------------------
// Atomic writes
// ---------------------------------------------------------------------------

/// Write `bytes` to `path` **atomically**.
///
/// Writes to a temp file in the same directory, then renames it over
/// the target, so readers never see a half-written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));

    fs::write(&tmp_path, bytes)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
    }

    fs::rename(&tmp_path, path)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Serde helpers for base64-encoded Vec<u8> fields
// ---------------------------------------------------------------------------

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

pub(crate) fn base64_encode<S>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let encoded = BASE64.encode(data);
    serializer.serialize_str(&encoded)
}

pub(crate) fn base64_decode<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    BASE64.decode(&s).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SeededRandom;
    use tempfile::TempDir;

    #[test]
    fn metadata_roundtrip() {
        let dir = TempDir::new().unwrap();
        let salt = Salt::generate(&mut SeededRandom::new(5));
        let meta = VaultMetadata::new(&salt, KdfParams::default(), vec![1, 2, 3]);
        meta.save(dir.path()).unwrap();

        let loaded = VaultMetadata::load(dir.path()).unwrap();
        assert_eq!(loaded.salt().unwrap(), salt);
        assert_eq!(loaded.kdf, KdfParams::default());
        assert_eq!(loaded.key_check, vec![1, 2, 3]);
    }

    #[test]
    fn load_without_metadata_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            VaultMetadata::load(dir.path()),
            Err(VaultError::VaultNotInitialized(_))
        ));
    }

    #[test]
    fn load_rejects_future_schema() {
        let dir = TempDir::new().unwrap();
        let salt = Salt::generate(&mut SeededRandom::new(5));
        let mut meta = VaultMetadata::new(&salt, KdfParams::default(), vec![]);
        meta.schema_version = 2;
        meta.save(dir.path()).unwrap();

        assert!(matches!(
            VaultMetadata::load(dir.path()),
            Err(VaultError::UnsupportedSchema(2))
        ));
    }

    #[test]
    fn write_atomic_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blob");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"two");
        assert!(!dir.path().join(".blob.tmp").exists());
    }
}
