//! Keyfile-based master secrets.
//!
//! Instead of typing a passphrase, the master secret can live in a
//! keyfile on removable media.  The file's raw bytes are fed to
//! Argon2id exactly as a typed secret would be.

use std::fs;
use std::path::Path;

use zeroize::Zeroizing;

use super::random::RandomSource;
use crate::errors::{Result, VaultError};

/// Length of a freshly generated keyfile in bytes (256 bits).
pub const KEYFILE_LEN: usize = 32;

/// Largest keyfile we are willing to read.
const MAX_KEYFILE_LEN: usize = 4096;

/// Generate a new random keyfile and write it to `path`.
///
/// The file is written with restrictive permissions (owner-only read).
pub fn generate_keyfile(path: &Path, rng: &mut impl RandomSource) -> Result<()> {
    if path.exists() {
        return Err(VaultError::KeyfileError(format!(
            "keyfile already exists at {}",
            path.display()
        )));
    }

    let mut keyfile = Zeroizing::new(vec![0u8; KEYFILE_LEN]);
    rng.fill(&mut keyfile);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                VaultError::KeyfileError(format!("cannot create keyfile directory: {e}"))
            })?;
        }
    }

    fs::write(path, keyfile.as_slice())
        .map_err(|e| VaultError::KeyfileError(format!("failed to write keyfile: {e}")))?;

    // On Unix, restrict permissions to owner-only read/write.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, perms).map_err(|e| {
            VaultError::KeyfileError(format!("failed to set keyfile permissions: {e}"))
        })?;
    }

    Ok(())
}

/// Load a keyfile from disk and validate its length.
pub fn load_keyfile(path: &Path) -> Result<Zeroizing<Vec<u8>>> {
    if !path.exists() {
        return Err(VaultError::KeyfileError(format!(
            "keyfile not found at {} — is the key media inserted?",
            path.display()
        )));
    }

    let data = Zeroizing::new(
        fs::read(path)
            .map_err(|e| VaultError::KeyfileError(format!("failed to read keyfile: {e}")))?,
    );

    if data.len() < KEYFILE_LEN || data.len() > MAX_KEYFILE_LEN {
        return Err(VaultError::KeyfileError(format!(
            "keyfile must be between {KEYFILE_LEN} and {MAX_KEYFILE_LEN} bytes, got {}",
            data.len()
        )));
    }

    Ok(data)
}
