//! `vaultkeep edit`: change an entry's fields.
//!
//! Reads the current entry, collects new field values (unset fields keep
//! their value), and writes it back conditioned on the version read.  If
//! someone else wrote in between, nothing is changed.

use crate::cli::commands::fields;
use crate::cli::output;
use crate::cli::{Cli, Context};
use crate::errors::{Result, VaultError};

/// Execute the `edit` command.
pub fn execute(cli: &Cli, id: &str, inline: &[String]) -> Result<()> {
    let ctx = Context::load(cli)?;
    let mut session = ctx.open_session()?;

    let current = session.get(id)?;
    let secret = fields::collect(current.kind(), inline, Some(&current.secret))?;

    if secret == current.secret {
        output::info("No changes.");
        return Ok(());
    }

    match session.edit(id, current.version, secret) {
        Ok(entry) => {
            output::success(&format!("Updated '{}' to v{}", entry.id, entry.version));
            Ok(())
        }
        Err(e @ VaultError::ConcurrentModification { .. }) => {
            output::tip("Run `vaultkeep get` to see the latest version, then edit again.");
            Err(e)
        }
        Err(e) => Err(e),
    }
}
