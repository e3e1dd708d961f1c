use std::path::PathBuf;
use thiserror::Error;

/// All errors that can occur in VaultKeep.
///
/// Messages name the entry id and the operation where that helps with
/// diagnosis. They never carry plaintext field values or key bytes.
#[derive(Debug, Error)]
pub enum VaultError {
    // --- Crypto errors ---
    #[error("Master secret is too weak — at least {min} bytes required")]
    WeakSecret { min: usize },

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Authentication failed — wrong master secret or tampered data")]
    Authentication,

    // --- Entry errors ---
    #[error("Malformed entry: {0}")]
    MalformedEntry(String),

    #[error("Invalid entry id: {0}")]
    InvalidEntryId(String),

    #[error("Entry '{0}' already exists (use `edit` to change it)")]
    DuplicateEntry(String),

    #[error("Entry '{0}' not found")]
    NotFound(String),

    #[error("Version mismatch on '{id}' during {op}: index has v{indexed}, store returned v{stored}")]
    VersionMismatch {
        id: String,
        op: &'static str,
        indexed: u64,
        stored: u64,
    },

    #[error("Entry '{id}' was modified concurrently (expected v{expected}, found v{found}) — re-read and retry")]
    ConcurrentModification {
        id: String,
        expected: u64,
        found: u64,
    },

    // --- Store errors ---
    #[error("Store unavailable during {op} on '{id}': {reason}")]
    TransientStore {
        id: String,
        op: &'static str,
        reason: String,
    },

    #[error("Store failed during {op} on '{id}': {reason}")]
    StoreFailed {
        id: String,
        op: &'static str,
        reason: String,
    },

    // --- Ledger errors ---
    #[error("Integrity ledger at {0} failed verification — it may be tampered")]
    LedgerTampered(PathBuf),

    // --- Vault errors ---
    #[error("No vault found at {0} (run `vaultkeep init` first)")]
    VaultNotInitialized(PathBuf),

    #[error("Vault already exists at {0}")]
    VaultAlreadyExists(PathBuf),

    #[error("Unsupported vault schema version {0}")]
    UnsupportedSchema(u8),

    // --- Keyfile errors ---
    #[error("Keyfile error: {0}")]
    KeyfileError(String),

    // --- Config errors ---
    #[error("Config file error: {0}")]
    ConfigError(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // --- CLI errors ---
    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("User cancelled operation")]
    UserCancelled,
}

impl VaultError {
    /// Process exit code for this error, distinct per error kind so
    /// scripts can branch on the failure without parsing messages.
    pub fn exit_code(&self) -> i32 {
        match self {
            VaultError::WeakSecret { .. } => 10,
            VaultError::MalformedEntry(_) => 11,
            VaultError::Authentication => 12,
            VaultError::DuplicateEntry(_) => 13,
            VaultError::NotFound(_) => 14,
            VaultError::VersionMismatch { .. } => 15,
            VaultError::ConcurrentModification { .. } => 16,
            VaultError::TransientStore { .. } => 17,
            VaultError::LedgerTampered(_) => 18,
            VaultError::VaultNotInitialized(_) | VaultError::VaultAlreadyExists(_) => 19,
            VaultError::StoreFailed { .. } => 20,
            VaultError::UserCancelled => 130,
            _ => 1,
        }
    }

    /// Whether the operation that produced this error may be retried.
    ///
    /// Only store-level transient failures qualify. Cryptographic and
    /// codec failures point at tampering or a wrong key.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VaultError::TransientStore { .. })
    }
}

/// Convenience type alias for VaultKeep results.
pub type Result<T> = std::result::Result<T, VaultError>;
