//! `vaultkeep init`: create vault metadata and an empty store.

use crate::cli::output;
use crate::cli::{Cli, Context};
use crate::crypto::OsRandom;
use crate::errors::{Result, VaultError};
use crate::store::RemoteStore;
use crate::vault;

/// Execute the `init` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let ctx = Context::load(cli)?;

    // 1. Refuse to overwrite an existing vault.
    if vault::VaultMetadata::path(&ctx.vault_dir).exists() {
        output::tip("Use `vaultkeep add <ID>` to add entries to the existing vault.");
        return Err(VaultError::VaultAlreadyExists(ctx.vault_dir.clone()));
    }

    // 2. Get a new master secret (keyfile, env var, or prompt with confirmation).
    let secret = ctx.new_master_secret()?;

    // 3. Derive the key with the configured params.
    let params = ctx.settings.kdf_params();
    let (key, meta) = vault::prepare_vault(&ctx.vault_dir, &secret, &params, &mut OsRandom)?;

    // 4. Check the store answers. Nothing is on disk until it does.
    let store = ctx.build_store(&key)?;
    store
        .list_meta()
        .map_err(|e| vault::client::store_error("*", "init", e))?;

    // 5. Persist the metadata.
    meta.save(&ctx.vault_dir)?;
    tracing::info!(dir = %ctx.vault_dir.display(), "vault created");

    output::success(&format!("Vault created at {}", ctx.vault_dir.display()));
    if ctx.settings.key_file.is_some() {
        output::info("Master secret is read from the keyfile; keep it somewhere safe.");
    }

    output::tip("Run `vaultkeep add <ID>` to add a password.");
    output::tip("Run `vaultkeep card add <ID>` or `vaultkeep api add <ID>` for other kinds.");

    Ok(())
}
