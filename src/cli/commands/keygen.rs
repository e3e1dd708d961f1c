//! `vaultkeep keygen`: write a random keyfile for use as the master secret.

use crate::cli::output;
use crate::cli::{resolve_path, Cli};
use crate::crypto::{generate_keyfile, OsRandom};
use crate::errors::Result;

/// Execute the `keygen` command.
pub fn execute(_cli: &Cli, path: &str) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let path = resolve_path(&cwd, path);

    generate_keyfile(&path, &mut OsRandom)?;

    output::success(&format!("Keyfile written to {}", path.display()));
    output::tip("Pass it with `--key-file` or set `key_file` in .vaultkeep.toml.");
    output::warning("Losing this file means losing every entry encrypted under it.");

    Ok(())
}
