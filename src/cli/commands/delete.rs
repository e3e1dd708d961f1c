//! `vaultkeep delete`: permanently remove an entry.

use crate::cli::output;
use crate::cli::{confirm, Cli, Context};
use crate::errors::{Result, VaultError};

/// Execute the `delete` command.
pub fn execute(cli: &Cli, id: &str, force: bool) -> Result<()> {
    crate::vault::validate_entry_id(id)?;
    let ctx = Context::load(cli)?;
    let mut session = ctx.open_session()?;

    if !session.exists(id)? {
        return Err(VaultError::NotFound(id.to_string()));
    }

    if !force && !confirm(&format!("Delete entry '{id}'? This cannot be undone"))? {
        output::info("Cancelled.");
        return Ok(());
    }

    session.delete(id)?;
    output::success(&format!("Deleted entry '{id}'"));
    Ok(())
}
