//! Vault module: typed entries and everything between them and the store.
//!
//! - `Entry`, `Secret` and `EntryKind` (`entry`)
//! - Canonical entry serialization (`codec`)
//! - Local vault metadata and atomic writes (`format`)
//! - Rollback and nonce-reuse protection (`ledger`)
//! - Session-local id index (`index`)
//! - The `VaultSession` that ties them together (`client`)

pub mod client;
pub mod codec;
pub mod entry;
pub mod format;
pub mod index;
pub mod ledger;

// Re-export the most commonly used items.
pub use client::{create_vault, prepare_vault, unlock, RetryPolicy, VaultSession};
pub use entry::{validate_entry_id, Entry, EntryKind, EntryMeta, Secret};
pub use format::VaultMetadata;
pub use index::VaultIndex;
pub use ledger::{IntegrityLedger, LedgerRecord};
