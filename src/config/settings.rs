use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::kdf::DEFAULT_MIN_SECRET_LEN;
use crate::crypto::KdfParams;
use crate::errors::{Result, VaultError};
use crate::vault::RetryPolicy;

/// Which `RemoteStore` implementation the CLI talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// A directory of `<id>.blob` files.
    #[default]
    Dir,
    /// A JSON blob server (needs the `remote-http` feature).
    Http,
}

/// Project-level configuration, loaded from `.vaultkeep.toml`.
///
/// Every field has a sensible default so VaultKeep works out-of-the-box
/// without any config file at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory (relative to project root) holding vault metadata and
    /// the integrity ledger.
    #[serde(default = "default_vault_dir")]
    pub vault_dir: String,

    /// Envelope store backend.
    #[serde(default)]
    pub store: StoreBackend,

    /// Directory for the `dir` backend.  Defaults to `<vault_dir>/store`.
    #[serde(default)]
    pub store_dir: Option<String>,

    /// Base URL for the `http` backend.
    #[serde(default)]
    pub store_url: Option<String>,

    /// Keyfile holding the master secret.
    #[serde(default)]
    pub key_file: Option<String>,

    /// Shortest master secret accepted at `init`, in bytes.
    #[serde(default = "default_min_secret_len")]
    pub min_secret_len: usize,

    /// Argon2 memory cost in KiB (default: 64 MB).
    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,

    /// Argon2 iteration count (default: 3).
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,

    /// Argon2 parallelism degree (default: 4).
    #[serde(default = "default_argon2_parallelism")]
    pub argon2_parallelism: u32,

    /// Attempts per store call before a transient failure is reported.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay before the first retry, doubled on each further one.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_vault_dir() -> String {
    ".vaultkeep".to_string()
}

fn default_min_secret_len() -> usize {
    DEFAULT_MIN_SECRET_LEN
}

fn default_argon2_memory_kib() -> u32 {
    65_536 // 64 MB
}

fn default_argon2_iterations() -> u32 {
    3
}

fn default_argon2_parallelism() -> u32 {
    4
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    200
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            vault_dir: default_vault_dir(),
            store: StoreBackend::default(),
            store_dir: None,
            store_url: None,
            key_file: None,
            min_secret_len: default_min_secret_len(),
            argon2_memory_kib: default_argon2_memory_kib(),
            argon2_iterations: default_argon2_iterations(),
            argon2_parallelism: default_argon2_parallelism(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the project root.
    pub const FILE_NAME: &'static str = ".vaultkeep.toml";

    /// Load settings from `<project_dir>/.vaultkeep.toml`.
    ///
    /// If the file does not exist, sensible defaults are returned.
    /// If the file exists but cannot be parsed, an error is returned.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            VaultError::ConfigError(format!("Failed to parse {}: {e}", config_path.display()))
        })?;

        tracing::debug!(path = %config_path.display(), "loaded settings");
        Ok(settings)
    }

    /// Where the `dir` backend keeps envelopes.
    pub fn store_dir(&self, project_dir: &Path, vault_dir: &Path) -> PathBuf {
        match &self.store_dir {
            Some(dir) => project_dir.join(dir),
            None => vault_dir.join("store"),
        }
    }

    /// Convert the Argon2 settings into crypto-layer params.
    pub fn kdf_params(&self) -> KdfParams {
        KdfParams {
            memory_kib: self.argon2_memory_kib,
            iterations: self.argon2_iterations,
            parallelism: self.argon2_parallelism,
            min_secret_len: self.min_secret_len,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts.max(1),
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
