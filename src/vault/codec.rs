//! Canonical byte layout for entries, applied before encryption.
//!
//! ```text
//! [VKEN: 4 bytes][kind: 1][id_len: 2 LE][id][version: 8 LE][field_count: 1]
//!   repeated field_count times: [name_len: 1][name][value_len: 4 LE][value]
//! ```
//!
//! The layout is deterministic: fields are always written in the kind's
//! canonical order, and every variable-length part is length-prefixed.
//! Decoding rejects anything that does not re-encode to the same bytes.

use zeroize::Zeroizing;

use super::entry::{validate_entry_id, Entry, EntryKind, Secret};
use crate::errors::{Result, VaultError};

/// Magic bytes at the start of every encoded entry.
const MAGIC: &[u8; 4] = b"VKEN";

/// Largest single field value accepted (64 KiB).
pub const MAX_VALUE_LEN: usize = 64 * 1024;

/// Serialize an entry into its canonical byte layout.
pub fn encode(entry: &Entry) -> Result<Zeroizing<Vec<u8>>> {
    validate_entry_id(&entry.id)?;

    let fields = entry.secret.fields();
    let value_bytes: usize = fields.iter().map(|(n, v)| 1 + n.len() + 4 + v.len()).sum();
    let mut buf = Zeroizing::new(Vec::with_capacity(
        MAGIC.len() + 1 + 2 + entry.id.len() + 8 + 1 + value_bytes,
    ));

    buf.extend_from_slice(MAGIC);
    buf.push(entry.kind().tag());
    // validate_entry_id caps the id at 128 bytes.
    buf.extend_from_slice(&(entry.id.len() as u16).to_le_bytes());
    buf.extend_from_slice(entry.id.as_bytes());
    buf.extend_from_slice(&entry.version.to_le_bytes());
    buf.push(fields.len() as u8);

    for (name, value) in fields {
        if value.len() > MAX_VALUE_LEN {
            return Err(VaultError::MalformedEntry(format!(
                "field '{name}' of '{}' exceeds {MAX_VALUE_LEN} bytes",
                entry.id
            )));
        }
        buf.push(name.len() as u8);
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
        buf.extend_from_slice(value.as_bytes());
    }

    Ok(buf)
}

/// Parse bytes produced by `encode`.
pub fn decode(bytes: &[u8]) -> Result<Entry> {
    let mut reader = Reader::new(bytes);

    if reader.take(MAGIC.len())? != MAGIC {
        return Err(malformed("missing VKEN magic bytes"));
    }

    let tag = reader.u8()?;
    let kind = EntryKind::from_tag(tag).ok_or_else(|| malformed(&format!("unknown kind tag {tag}")))?;

    let id_len = reader.u16()? as usize;
    let id = reader.string(id_len)?;
    validate_entry_id(&id).map_err(|e| malformed(&e.to_string()))?;

    let version = reader.u64()?;

    let count = reader.u8()? as usize;
    if count != kind.field_names().len() {
        return Err(malformed(&format!(
            "{kind} entries have {} fields, got {count}",
            kind.field_names().len()
        )));
    }

    let mut fields = Vec::with_capacity(count);
    for _ in 0..count {
        let name_len = reader.u8()? as usize;
        let name = reader.string(name_len)?;
        let value_len = reader.u32()? as usize;
        if value_len > MAX_VALUE_LEN {
            return Err(malformed("field value length exceeds limit"));
        }
        let value = reader.string(value_len)?;
        fields.push((name, value));
    }

    if !reader.is_empty() {
        return Err(malformed("trailing bytes after last field"));
    }

    let secret = Secret::from_fields(kind, fields)?;
    Ok(Entry {
        id,
        version,
        secret,
    })
}

fn malformed(msg: &str) -> VaultError {
    VaultError::MalformedEntry(msg.to_string())
}

/// Bounds-checked little-endian reader over a byte slice.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| malformed("truncated input"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        self.array().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Result<u32> {
        self.array().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Result<u64> {
        self.array().map(u64::from_le_bytes)
    }

    fn string(&mut self, len: usize) -> Result<String> {
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|e| {
            let mut bad = e.into_bytes();
            zeroize::Zeroize::zeroize(&mut bad);
            malformed("field is not valid UTF-8")
        })
    }

    fn is_empty(&self) -> bool {
        self.pos == self.data.len()
    }
}
