//! Project-level configuration (`.vaultkeep.toml`).

pub mod settings;

pub use settings::{Settings, StoreBackend};
