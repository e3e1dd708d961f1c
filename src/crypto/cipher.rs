//! AES-256-GCM envelope encryption.
//!
//! `seal` turns a canonical entry payload into an `Envelope`; `open`
//! reverses it.  Each entry id has its own HKDF sub-key, and the nonce
//! is a 4-byte random prefix followed by the entry's 8-byte ledger
//! counter, so a nonce never repeats under one key even if the random
//! source is weak.
//!
//! The entry id, kind and version are bound in as associated data: an
//! envelope moved to another id, relabelled with another kind, or
//! rolled back to an older version number fails authentication.
//!
//! Wire layout (vault schema version 1, integers little-endian):
//!
//! ```text
//! [schema: 1][kind: 1][version: 8][nonce: 12][ct_len: 4][ciphertext][tag: 16]
//! ```

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use zeroize::Zeroizing;

use super::keys::DerivedKey;
use super::random::RandomSource;
use crate::errors::{Result, VaultError};
use crate::vault::EntryKind;

/// Size of the AES-256-GCM nonce in bytes.
pub const NONCE_LEN: usize = 12;

/// Size of the AES-256-GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Envelope schema version written by this build.
pub const SCHEMA_VERSION: u8 = 1;

/// Length of the random part of the nonce.
const NONCE_RANDOM_LEN: usize = 4;

/// Fixed part of the wire layout: schema + kind + version + nonce + ct_len.
const WIRE_PREFIX_LEN: usize = 1 + 1 + 8 + NONCE_LEN + 4;

/// Domain separator at the start of the associated data.
const AAD_DOMAIN: &[u8] = b"vaultkeep-v1";

/// The only form of an entry that ever leaves the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub kind: EntryKind,
    pub version: u64,
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

impl Envelope {
    /// The ledger counter embedded in the nonce.
    pub fn nonce_counter(&self) -> u64 {
        let mut counter = [0u8; 8];
        counter.copy_from_slice(&self.nonce[NONCE_RANDOM_LEN..]);
        u64::from_be_bytes(counter)
    }

    /// Serialize to the schema version 1 wire layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(WIRE_PREFIX_LEN + self.ciphertext.len() + TAG_LEN);
        buf.push(SCHEMA_VERSION);
        buf.push(self.kind.tag());
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.nonce);
        // Entry payloads are bounded well below 4 GiB by the codec.
        buf.extend_from_slice(&(self.ciphertext.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.ciphertext);
        buf.extend_from_slice(&self.tag);
        buf
    }

    /// Parse the wire layout.  Only checks structure; authenticity is
    /// established by `open`.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < WIRE_PREFIX_LEN + TAG_LEN {
            return Err(VaultError::MalformedEntry("envelope too short".into()));
        }

        if data[0] != SCHEMA_VERSION {
            return Err(VaultError::UnsupportedSchema(data[0]));
        }

        let kind = EntryKind::from_tag(data[1])
            .ok_or_else(|| VaultError::MalformedEntry(format!("unknown kind tag {}", data[1])))?;

        let mut version = [0u8; 8];
        version.copy_from_slice(&data[2..10]);

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&data[10..10 + NONCE_LEN]);

        let mut ct_len = [0u8; 4];
        ct_len.copy_from_slice(&data[10 + NONCE_LEN..WIRE_PREFIX_LEN]);
        let ct_len = u32::from_le_bytes(ct_len) as usize;

        if WIRE_PREFIX_LEN + ct_len + TAG_LEN != data.len() {
            return Err(VaultError::MalformedEntry(
                "envelope ciphertext length does not match its prefix".into(),
            ));
        }

        let ct_end = WIRE_PREFIX_LEN + ct_len;
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&data[ct_end..]);

        Ok(Self {
            kind,
            version: u64::from_le_bytes(version),
            nonce,
            ciphertext: data[WIRE_PREFIX_LEN..ct_end].to_vec(),
            tag,
        })
    }
}

/// Authenticated header fields for one `seal` call.
#[derive(Debug, Clone, Copy)]
pub struct SealContext<'a> {
    pub id: &'a str,
    pub kind: EntryKind,
    pub version: u64,
}

/// Encrypt `plaintext` for entry `ctx.id`.
///
/// `counter` must come from the integrity ledger and must not have
/// been used for this id before.
pub fn seal(
    plaintext: &[u8],
    key: &DerivedKey,
    ctx: &SealContext<'_>,
    counter: u64,
    rng: &mut impl RandomSource,
) -> Result<Envelope> {
    let entry_key = key.entry_key(ctx.id)?;
    let cipher = Aes256Gcm::new_from_slice(&entry_key[..])
        .map_err(|e| VaultError::EncryptionFailed(format!("invalid key length: {e}")))?;

    let mut nonce = [0u8; NONCE_LEN];
    rng.fill(&mut nonce[..NONCE_RANDOM_LEN]);
    nonce[NONCE_RANDOM_LEN..].copy_from_slice(&counter.to_be_bytes());

    let aad = associated_data(ctx.id, ctx.kind, ctx.version);
    let mut sealed = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|e| VaultError::EncryptionFailed(format!("encryption error: {e}")))?;

    // aes-gcm appends the tag; keep it as a separate field.
    let tag_start = sealed.len() - TAG_LEN;
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&sealed[tag_start..]);
    sealed.truncate(tag_start);

    Ok(Envelope {
        kind: ctx.kind,
        version: ctx.version,
        nonce,
        ciphertext: sealed,
        tag,
    })
}

/// Decrypt an envelope that was sealed for entry `id`.
///
/// Every failure, whatever its cause, is the same
/// `VaultError::Authentication`.
pub fn open(envelope: &Envelope, key: &DerivedKey, id: &str) -> Result<Zeroizing<Vec<u8>>> {
    let entry_key = key.entry_key(id)?;
    let cipher =
        Aes256Gcm::new_from_slice(&entry_key[..]).map_err(|_| VaultError::Authentication)?;

    let mut sealed = Vec::with_capacity(envelope.ciphertext.len() + TAG_LEN);
    sealed.extend_from_slice(&envelope.ciphertext);
    sealed.extend_from_slice(&envelope.tag);

    let aad = associated_data(id, envelope.kind, envelope.version);
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&envelope.nonce),
            Payload {
                msg: &sealed,
                aad: &aad,
            },
        )
        .map_err(|_| VaultError::Authentication)?;

    Ok(Zeroizing::new(plaintext))
}

fn associated_data(id: &str, kind: EntryKind, version: u64) -> Vec<u8> {
    let mut aad = Vec::with_capacity(AAD_DOMAIN.len() + 2 + id.len() + 1 + 8);
    aad.extend_from_slice(AAD_DOMAIN);
    aad.extend_from_slice(&(id.len() as u16).to_le_bytes());
    aad.extend_from_slice(id.as_bytes());
    aad.push(kind.tag());
    aad.extend_from_slice(&version.to_le_bytes());
    aad
}
