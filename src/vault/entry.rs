//! Entry types: what a vault holds once an envelope is opened.
//!
//! The three kinds are a closed sum type.  Each kind has a fixed,
//! ordered field layout, which the codec writes and checks verbatim.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::errors::{Result, VaultError};

/// Longest entry id accepted.
pub const MAX_ID_LEN: usize = 128;

/// The kind of secret an entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Password,
    Card,
    #[serde(rename = "api")]
    ApiKey,
}

impl EntryKind {
    pub const ALL: [EntryKind; 3] = [EntryKind::Password, EntryKind::Card, EntryKind::ApiKey];

    /// One-byte tag used by the codec and the envelope header.
    pub fn tag(self) -> u8 {
        match self {
            EntryKind::Password => 1,
            EntryKind::Card => 2,
            EntryKind::ApiKey => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(EntryKind::Password),
            2 => Some(EntryKind::Card),
            3 => Some(EntryKind::ApiKey),
            _ => None,
        }
    }

    /// Field names in their canonical order.
    pub fn field_names(self) -> &'static [&'static str] {
        match self {
            EntryKind::Password => &["username", "password", "url"],
            EntryKind::Card => &["cardholder", "number", "expiry", "cvv"],
            EntryKind::ApiKey => &["service", "key"],
        }
    }

    /// The field copied to the clipboard by `get --copy`.
    pub fn primary_field(self) -> &'static str {
        match self {
            EntryKind::Password => "password",
            EntryKind::Card => "number",
            EntryKind::ApiKey => "key",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::Password => "password",
            EntryKind::Card => "card",
            EntryKind::ApiKey => "api",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "password" => Ok(EntryKind::Password),
            "card" => Ok(EntryKind::Card),
            "api" | "api-key" | "apikey" => Ok(EntryKind::ApiKey),
            other => Err(VaultError::MalformedEntry(format!("unknown entry kind '{other}'"))),
        }
    }
}

/// Secret payload of an entry.  Wiped from memory on drop.
#[derive(Clone, PartialEq, Eq)]
pub enum Secret {
    Password {
        username: String,
        password: String,
        url: String,
    },
    Card {
        cardholder: String,
        number: String,
        expiry: String,
        cvv: String,
    },
    ApiKey {
        service: String,
        key: String,
    },
}

impl Secret {
    /// Shorthand for a password entry without a URL.
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Secret::Password {
            username: username.into(),
            password: password.into(),
            url: String::new(),
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            Secret::Password { .. } => EntryKind::Password,
            Secret::Card { .. } => EntryKind::Card,
            Secret::ApiKey { .. } => EntryKind::ApiKey,
        }
    }

    /// Fields as `(name, value)` pairs in canonical order.
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        let names = self.kind().field_names();
        let values: Vec<&str> = match self {
            Secret::Password {
                username,
                password,
                url,
            } => vec![username.as_str(), password.as_str(), url.as_str()],
            Secret::Card {
                cardholder,
                number,
                expiry,
                cvv,
            } => vec![
                cardholder.as_str(),
                number.as_str(),
                expiry.as_str(),
                cvv.as_str(),
            ],
            Secret::ApiKey { service, key } => vec![service.as_str(), key.as_str()],
        };
        names.iter().copied().zip(values).collect()
    }

    /// Look up one field by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields()
            .into_iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }

    /// Build a secret of `kind` from `(name, value)` pairs.
    ///
    /// The names must match the kind's layout exactly, in order.
    pub fn from_fields(kind: EntryKind, fields: Vec<(String, String)>) -> Result<Self> {
        let expected = kind.field_names();
        if fields.len() != expected.len() {
            return Err(VaultError::MalformedEntry(format!(
                "{kind} entries have {} fields, got {}",
                expected.len(),
                fields.len()
            )));
        }

        let mut values = Vec::with_capacity(fields.len());
        for ((name, value), want) in fields.into_iter().zip(expected) {
            if name != *want {
                return Err(VaultError::MalformedEntry(format!(
                    "{kind} field '{want}' expected, found '{name}'"
                )));
            }
            values.push(value);
        }

        let mut values = values.into_iter();
        let mut next = || values.next().unwrap_or_default();
        Ok(match kind {
            EntryKind::Password => Secret::Password {
                username: next(),
                password: next(),
                url: next(),
            },
            EntryKind::Card => Secret::Card {
                cardholder: next(),
                number: next(),
                expiry: next(),
                cvv: next(),
            },
            EntryKind::ApiKey => Secret::ApiKey {
                service: next(),
                key: next(),
            },
        })
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        match self {
            Secret::Password {
                username,
                password,
                url,
            } => {
                username.zeroize();
                password.zeroize();
                url.zeroize();
            }
            Secret::Card {
                cardholder,
                number,
                expiry,
                cvv,
            } => {
                cardholder.zeroize();
                number.zeroize();
                expiry.zeroize();
                cvv.zeroize();
            }
            Secret::ApiKey { service, key } => {
                service.zeroize();
                key.zeroize();
            }
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret::{}(<redacted>)", self.kind())
    }
}

/// A decrypted vault entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: String,
    pub version: u64,
    pub secret: Secret,
}

impl Entry {
    pub fn new(id: impl Into<String>, secret: Secret) -> Self {
        Self {
            id: id.into(),
            version: 1,
            secret,
        }
    }

    pub fn kind(&self) -> EntryKind {
        self.secret.kind()
    }
}

/// Index metadata for one entry, readable without decryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    pub kind: EntryKind,
    pub version: u64,
}

/// Validate that an entry id is safe to use as a store key.
///
/// Allowed: ASCII letters, digits, underscores, hyphens, periods.
/// Must be non-empty, at most 128 characters, and not start with a period.
pub fn validate_entry_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(VaultError::InvalidEntryId("entry id cannot be empty".into()));
    }
    if id.len() > MAX_ID_LEN {
        return Err(VaultError::InvalidEntryId(format!(
            "entry id cannot exceed {MAX_ID_LEN} characters"
        )));
    }
    if id.starts_with('.') {
        return Err(VaultError::InvalidEntryId(format!(
            "entry id '{id}' cannot start with a period"
        )));
    }
    if !id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.')
    {
        return Err(VaultError::InvalidEntryId(format!(
            "entry id '{id}' contains invalid characters — only ASCII letters, digits, underscores, hyphens, and periods are allowed"
        )));
    }
    Ok(())
}
