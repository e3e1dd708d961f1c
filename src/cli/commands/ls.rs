//! `vaultkeep [card|api] ls`: list entries without decrypting them.

use crate::cli::output;
use crate::cli::{Cli, Context};
use crate::errors::Result;
use crate::vault::EntryKind;

/// Execute the `ls` command.
pub fn execute(cli: &Cli, kind: Option<EntryKind>) -> Result<()> {
    let ctx = Context::load(cli)?;
    let session = ctx.open_session()?;

    let entries = session.list(kind);

    match kind {
        Some(kind) => output::info(&format!("{} {kind} entries", entries.len())),
        None => output::info(&format!("{} entries", entries.len())),
    }

    output::print_entries_table(&entries);

    Ok(())
}
