//! Cryptographic primitives for VaultKeep.
//!
//! This module provides:
//! - Argon2id master-secret key derivation (`kdf`)
//! - The zeroizing `DerivedKey` and its HKDF sub-keys (`keys`)
//! - AES-256-GCM envelope sealing and opening (`cipher`)
//! - Keyfile-backed master secrets (`keyfile`)
//! - Injectable randomness (`random`)

pub mod cipher;
pub mod kdf;
pub mod keyfile;
pub mod keys;
pub mod random;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{derive, seal, open, ...};
pub use cipher::{open, seal, Envelope, SealContext, NONCE_LEN, SCHEMA_VERSION, TAG_LEN};
pub use kdf::{derive, KdfParams, Salt, SALT_LEN};
pub use keyfile::{generate_keyfile, load_keyfile};
pub use keys::DerivedKey;
pub use random::{OsRandom, RandomSource, SeededRandom};
