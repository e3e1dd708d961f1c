//! Collecting entry fields from the command line, a pipe, or prompts.
//!
//! Sources, highest priority first:
//! 1. `--field name=value` arguments
//! 2. `name=value` lines on stdin, when stdin is not a terminal
//! 3. Interactive prompts (hidden input for secret fields)
//!
//! When editing, any field left unset keeps its current value.

use std::collections::BTreeMap;
use std::io::{self, IsTerminal, Read};

use zeroize::Zeroizing;

use crate::cli::output;
use crate::errors::{Result, VaultError};
use crate::vault::{EntryKind, Secret};

/// Fields typed with hidden input and never echoed by prompts.
pub fn is_hidden(name: &str) -> bool {
    matches!(name, "password" | "number" | "cvv" | "key")
}

/// Build a `Secret` of `kind` from all available sources.
pub fn collect(kind: EntryKind, inline: &[String], current: Option<&Secret>) -> Result<Secret> {
    let mut given = parse_pairs(kind, inline.iter().map(String::as_str))?;
    if !inline.is_empty() {
        output::warning("Fields provided on command line may appear in shell history.");
    }

    let interactive = io::stdin().is_terminal();
    if !interactive {
        let mut buf = Zeroizing::new(String::new());
        io::stdin().read_to_string(&mut buf)?;
        for (name, value) in parse_pairs(kind, buf.lines().filter(|l| !l.trim().is_empty()))? {
            given.entry(name).or_insert(value);
        }
    }

    let mut fields = Vec::with_capacity(kind.field_names().len());
    for name in kind.field_names() {
        let existing = current.and_then(|s| s.field(name));
        let value = match given.remove(*name) {
            Some(v) => v,
            None if interactive => prompt_field(name, existing)?,
            None => existing.unwrap_or_default().to_string(),
        };
        fields.push((name.to_string(), value));
    }

    Secret::from_fields(kind, fields)
}

/// Parse `name=value` pairs, rejecting names the kind does not have.
fn parse_pairs<'a>(
    kind: EntryKind,
    pairs: impl Iterator<Item = &'a str>,
) -> Result<BTreeMap<&'static str, String>> {
    let mut out = BTreeMap::new();
    for pair in pairs {
        // Never echo `pair` back: without an `=` it may be a bare secret.
        let (name, value) = pair.split_once('=').ok_or_else(|| {
            VaultError::CommandFailed("field arguments must look like NAME=VALUE".into())
        })?;
        let name = name.trim();
        let field = kind
            .field_names()
            .iter()
            .copied()
            .find(|f| *f == name)
            .ok_or_else(|| {
                VaultError::CommandFailed(format!(
                    "{kind} entries have no field '{name}' (fields: {})",
                    kind.field_names().join(", ")
                ))
            })?;
        out.insert(field, value.to_string());
    }
    Ok(out)
}

fn prompt_field(name: &str, existing: Option<&str>) -> Result<String> {
    let prompt_err = |e: dialoguer::Error| VaultError::CommandFailed(format!("input prompt: {e}"));

    if is_hidden(name) {
        let prompt = match existing {
            Some(_) => format!("{name} (leave empty to keep)"),
            None => name.to_string(),
        };
        let value = dialoguer::Password::new()
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()
            .map_err(prompt_err)?;
        return Ok(match existing {
            Some(old) if value.is_empty() => old.to_string(),
            _ => value,
        });
    }

    let mut input = dialoguer::Input::<String>::new()
        .with_prompt(name)
        .allow_empty(true);
    if let Some(old) = existing {
        input = input.default(old.to_string());
    }
    input.interact_text().map_err(prompt_err)
}
