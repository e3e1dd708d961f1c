//! CLI module: Clap argument parser, output helpers, and command implementations.

pub mod commands;
pub mod output;

use std::path::{Path, PathBuf};

use clap::Parser;

use zeroize::Zeroizing;

use crate::config::{Settings, StoreBackend};
use crate::crypto::{DerivedKey, OsRandom};
use crate::errors::{Result, VaultError};
use crate::store::{DirStore, RemoteStore};
use crate::vault::{self, VaultSession};

/// Environment variable consulted for the master secret when no keyfile
/// is configured.
pub const MASTER_SECRET_ENV: &str = "VAULTKEEP_MASTER_SECRET";

/// VaultKeep CLI: a personal vault for passwords, cards and API keys.
#[derive(Parser)]
#[command(
    name = "vaultkeep",
    about = "Personal secret vault with client-side encryption",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Vault directory (default: from .vaultkeep.toml, else .vaultkeep)
    #[arg(long, global = true)]
    pub vault_dir: Option<String>,

    /// Keyfile holding the master secret
    #[arg(long, global = true)]
    pub key_file: Option<String>,

    /// Directory used as the envelope store (overrides config)
    #[arg(long, global = true)]
    pub store_dir: Option<String>,

    /// URL of an HTTP envelope store (overrides config)
    #[arg(long, global = true)]
    pub store_url: Option<String>,

    /// Diagnostic log filter, e.g. `debug` or `vaultkeep=trace`
    #[arg(long, global = true, env = "VAULTKEEP_LOG", default_value = "warn")]
    pub log_level: String,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Create a new vault
    Init,

    /// Write a fresh random keyfile to use as the master secret
    Keygen {
        /// Where to write the keyfile
        path: String,
    },

    /// Work with payment card entries
    Card {
        #[command(subcommand)]
        action: EntryAction,
    },

    /// Work with API key entries
    Api {
        #[command(subcommand)]
        action: EntryAction,
    },

    #[command(flatten)]
    Entry(EntryAction),
}

/// Entry operations, shared by every kind.
#[derive(clap::Subcommand)]
pub enum EntryAction {
    /// Add a new entry (fields are prompted for unless given)
    Add {
        /// Entry id (e.g. github)
        id: String,
        /// Set a field inline, e.g. `--field username=alice` (repeatable)
        #[arg(short = 'F', long = "field", value_name = "NAME=VALUE")]
        fields: Vec<String>,
    },

    /// Show an entry's fields
    Get {
        /// Entry id
        id: String,
        /// Copy the secret field to the clipboard instead of printing it
        #[arg(short, long)]
        copy: bool,
    },

    /// List entries
    Ls,

    /// Delete an entry
    Delete {
        /// Entry id
        id: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Change an entry's fields
    Edit {
        /// Entry id
        id: String,
        /// Set a field inline, e.g. `--field url=https://example.com` (repeatable)
        #[arg(short = 'F', long = "field", value_name = "NAME=VALUE")]
        fields: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Shared helpers used by multiple commands
// ---------------------------------------------------------------------------

/// Resolved locations and settings for one invocation.
pub struct Context {
    pub project_dir: PathBuf,
    pub settings: Settings,
    pub vault_dir: PathBuf,
}

impl Context {
    /// Load `.vaultkeep.toml` from the working directory and apply CLI
    /// overrides on top of it.
    pub fn load(cli: &Cli) -> Result<Self> {
        let project_dir = std::env::current_dir()?;
        let mut settings = Settings::load(&project_dir)?;

        if let Some(dir) = &cli.vault_dir {
            settings.vault_dir = dir.clone();
        }
        if let Some(path) = &cli.key_file {
            settings.key_file = Some(path.clone());
        }
        if let Some(dir) = &cli.store_dir {
            settings.store = StoreBackend::Dir;
            settings.store_dir = Some(dir.clone());
        }
        if let Some(url) = &cli.store_url {
            settings.store = StoreBackend::Http;
            settings.store_url = Some(url.clone());
        }

        let vault_dir = project_dir.join(&settings.vault_dir);
        Ok(Self {
            project_dir,
            settings,
            vault_dir,
        })
    }

    /// Unlock the vault and connect a session to the configured store.
    pub fn open_session(&self) -> Result<VaultSession<Box<dyn RemoteStore>>> {
        let secret = self.master_secret()?;
        let key = vault::unlock(&self.vault_dir, &secret)?;
        let store = self.build_store(&key)?;
        VaultSession::connect(
            &self.vault_dir,
            key,
            store,
            OsRandom,
            self.settings.retry_policy(),
        )
    }

    /// Build the configured `RemoteStore`.
    pub fn build_store(&self, key: &DerivedKey) -> Result<Box<dyn RemoteStore>> {
        match self.settings.store {
            StoreBackend::Dir => {
                let dir = self.settings.store_dir(&self.project_dir, &self.vault_dir);
                tracing::debug!(dir = %dir.display(), "using directory store");
                Ok(Box::new(DirStore::open(&dir)?))
            }
            StoreBackend::Http => self.build_http_store(key),
        }
    }

    #[cfg(feature = "remote-http")]
    fn build_http_store(&self, key: &DerivedKey) -> Result<Box<dyn RemoteStore>> {
        let url = self.settings.store_url.as_deref().ok_or_else(|| {
            VaultError::ConfigError("store = \"http\" needs a store_url".into())
        })?;
        tracing::debug!(url, "using HTTP store");
        Ok(Box::new(crate::store::HttpStore::new(
            url,
            key.store_auth_token()?,
        )))
    }

    #[cfg(not(feature = "remote-http"))]
    fn build_http_store(&self, _key: &DerivedKey) -> Result<Box<dyn RemoteStore>> {
        Err(VaultError::ConfigError(
            "this build has no HTTP store support (rebuild with --features remote-http)".into(),
        ))
    }

    /// Get the master secret, trying in order:
    /// 1. the configured keyfile
    /// 2. `VAULTKEEP_MASTER_SECRET` env var
    /// 3. Interactive prompt
    pub fn master_secret(&self) -> Result<Zeroizing<Vec<u8>>> {
        if let Some(secret) = self.non_interactive_secret()? {
            return Ok(secret);
        }

        let pw = dialoguer::Password::new()
            .with_prompt("Enter master secret")
            .interact()
            .map_err(prompt_error)?;
        Ok(Zeroizing::new(pw.into_bytes()))
    }

    /// Get a master secret for a new vault.
    ///
    /// Same sources as `master_secret`, but the prompt asks twice and
    /// re-prompts until the secret is long enough.
    pub fn new_master_secret(&self) -> Result<Zeroizing<Vec<u8>>> {
        let min = self.settings.min_secret_len;

        if let Some(secret) = self.non_interactive_secret()? {
            if secret.len() < min {
                return Err(VaultError::WeakSecret { min });
            }
            return Ok(secret);
        }

        loop {
            let pw = Zeroizing::new(
                dialoguer::Password::new()
                    .with_prompt("Choose master secret")
                    .with_confirmation("Confirm master secret", "Secrets do not match, try again")
                    .interact()
                    .map_err(prompt_error)?,
            );

            if pw.len() < min {
                output::warning(&format!(
                    "Master secret must be at least {min} characters. Try again."
                ));
                continue;
            }

            return Ok(Zeroizing::new(pw.as_bytes().to_vec()));
        }
    }

    fn non_interactive_secret(&self) -> Result<Option<Zeroizing<Vec<u8>>>> {
        if let Some(path) = &self.settings.key_file {
            let path = self.project_dir.join(path);
            tracing::debug!(path = %path.display(), "reading master secret from keyfile");
            return crate::crypto::load_keyfile(&path).map(Some);
        }

        if let Ok(pw) = std::env::var(MASTER_SECRET_ENV) {
            if !pw.is_empty() {
                return Ok(Some(Zeroizing::new(pw.into_bytes())));
            }
        }

        Ok(None)
    }
}

/// Ask a yes/no question, defaulting to "no".
pub fn confirm(prompt: &str) -> Result<bool> {
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(prompt_error)
}

/// Resolve a user-supplied path against the working directory.
pub fn resolve_path(project_dir: &Path, path: &str) -> PathBuf {
    project_dir.join(path)
}

fn prompt_error(e: dialoguer::Error) -> VaultError {
    VaultError::CommandFailed(format!("prompt: {e}"))
}
