//! `vaultkeep [card|api] add`: add a new entry.

use crate::cli::commands::fields;
use crate::cli::output;
use crate::cli::{Cli, Context};
use crate::errors::Result;
use crate::vault::EntryKind;

/// Execute the `add` command.
pub fn execute(cli: &Cli, kind: EntryKind, id: &str, inline: &[String]) -> Result<()> {
    crate::vault::validate_entry_id(id)?;

    let ctx = Context::load(cli)?;
    let mut session = ctx.open_session()?;

    let secret = fields::collect(kind, inline, None)?;
    let entry = session.add(id, secret)?;

    output::success(&format!(
        "Added {} entry '{}' ({} total)",
        entry.kind(),
        entry.id,
        session.index().len()
    ));

    Ok(())
}
