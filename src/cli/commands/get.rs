//! `vaultkeep get`: decrypt and show one entry.

use crate::cli::output;
use crate::cli::{Cli, Context};
use crate::errors::Result;

/// Execute the `get` command.
pub fn execute(cli: &Cli, id: &str, copy: bool) -> Result<()> {
    let ctx = Context::load(cli)?;
    let mut session = ctx.open_session()?;

    let entry = session.get(id)?;
    let kind = entry.kind();

    if copy {
        let primary = kind.primary_field();
        let value = entry.secret.field(primary).unwrap_or_default();
        match copy_to_clipboard(value) {
            Ok(()) => {
                output::success(&format!("Copied {primary} of '{id}' to the clipboard"));
                return Ok(());
            }
            Err(e) => {
                tracing::debug!(error = %e, "clipboard unavailable");
                output::warning("Clipboard unavailable; printing instead.");
            }
        }
    }

    output::info(&format!("{id} ({kind}, v{})", entry.version));
    output::print_fields(&entry.secret.fields());

    Ok(())
}

fn copy_to_clipboard(value: &str) -> std::result::Result<(), arboard::Error> {
    let mut clipboard = arboard::Clipboard::new()?;
    clipboard.set_text(value)
}
