//! SSH identity provisioning.
//!
//! Each machine gets a fresh RSA key pair. The private half is written as a
//! PKCS#1 PEM file at a path derived from the machine name, readable only by
//! the owner; the public half is returned in `authorized_keys` format for
//! registration with the provider.

use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::fs::{DirBuilder, OpenOptions};
use cap_std::{ambient_authority, fs_utf8::Dir};
use rand_core::OsRng;
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use ssh_key::public::KeyData;
use thiserror::Error;
use tracing::debug;

use crate::machine::validate_machine_name;

/// Modulus size of generated keys.
pub const KEY_BITS: usize = 2048;

#[cfg(unix)]
const DIR_MODE: u32 = 0o700;
#[cfg(unix)]
const KEY_FILE_MODE: u32 = 0o600;

/// Freshly generated identity for one machine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SshIdentity {
    /// Public key in single-line `authorized_keys` format.
    pub public_key: String,
    /// Location of the persisted private key.
    pub private_key_path: Utf8PathBuf,
}

/// Errors raised while creating or discarding SSH identities.
#[derive(Debug, Error)]
pub enum KeyError {
    /// Raised when the storage directory or machine name cannot locate a key.
    #[error("invalid key location: {0}")]
    InvalidLocation(String),
    /// Raised when randomness or key construction fails.
    #[error("failed to generate SSH key: {message}")]
    Generation {
        /// Underlying failure.
        message: String,
    },
    /// Raised when the key cannot be written to or removed from disk.
    #[error("failed to persist SSH key at {path}: {source}")]
    Persistence {
        /// Path being accessed.
        path: Utf8PathBuf,
        /// Filesystem error.
        #[source]
        source: io::Error,
    },
}

impl KeyError {
    fn generation(err: impl std::fmt::Display) -> Self {
        Self::Generation {
            message: err.to_string(),
        }
    }

    fn persistence(path: &Utf8Path, source: io::Error) -> Self {
        Self::Persistence {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Returns where the private key for `machine_name` lives under
/// `storage_dir`.
#[must_use]
pub fn private_key_path(storage_dir: &Utf8Path, machine_name: &str) -> Utf8PathBuf {
    storage_dir.join(format!("{machine_name}_id_rsa"))
}

/// Generates a key pair for `machine_name` and persists the private key
/// under `storage_dir`, creating the directory when needed.
///
/// Calling this twice for the same machine overwrites the earlier key.
///
/// # Errors
///
/// Returns [`KeyError::InvalidLocation`] for an empty directory or a machine
/// name that is not a single path component, [`KeyError::Generation`] when
/// key construction fails and [`KeyError::Persistence`] when the directory or
/// key file cannot be written.
pub fn generate_identity(
    storage_dir: &Utf8Path,
    machine_name: &str,
) -> Result<SshIdentity, KeyError> {
    if storage_dir.as_str().trim().is_empty() {
        return Err(KeyError::InvalidLocation(String::from(
            "storage directory is empty",
        )));
    }
    validate_machine_name(machine_name).map_err(KeyError::InvalidLocation)?;

    let private_key = RsaPrivateKey::new(&mut OsRng, KEY_BITS).map_err(KeyError::generation)?;
    let pem = private_key
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(KeyError::generation)?;
    let public_key = encode_public_key(&private_key.to_public_key())?;

    let dir = open_private_dir(storage_dir)?;
    let path = private_key_path(storage_dir, machine_name);
    let file_name = format!("{machine_name}_id_rsa");
    write_private_file(&dir, &file_name, &path, pem.as_bytes())?;
    debug!(path = %path, "wrote SSH private key");

    Ok(SshIdentity {
        public_key,
        private_key_path: path,
    })
}

/// Encodes an RSA public key as an `ssh-rsa` `authorized_keys` line.
///
/// # Errors
///
/// Returns [`KeyError::Generation`] when the key cannot be encoded.
pub fn encode_public_key(key: &RsaPublicKey) -> Result<String, KeyError> {
    let ssh_public = ssh_key::public::RsaPublicKey::try_from(key).map_err(KeyError::generation)?;
    ssh_key::PublicKey::from(KeyData::from(ssh_public))
        .to_openssh()
        .map_err(KeyError::generation)
}

/// Derives the `authorized_keys` line for a PKCS#1 PEM private key.
#[cfg(test)]
pub(crate) fn public_key_from_pem(pem: &str) -> Result<String, KeyError> {
    use rsa::pkcs1::DecodeRsaPrivateKey;

    let private_key = RsaPrivateKey::from_pkcs1_pem(pem).map_err(KeyError::generation)?;
    encode_public_key(&private_key.to_public_key())
}

/// Removes a persisted private key. A key that is already gone is not an
/// error.
///
/// # Errors
///
/// Returns [`KeyError::Persistence`] when the file exists but cannot be
/// removed.
pub fn discard_identity(path: &Utf8Path) -> Result<(), KeyError> {
    let (parent, file_name) = split_key_path(path)?;
    let dir = match Dir::open_ambient_dir(parent, ambient_authority()) {
        Ok(dir) => dir,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(KeyError::persistence(parent, err)),
    };
    match dir.remove_file(file_name) {
        Ok(()) => {
            debug!(path = %path, "removed SSH private key");
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(KeyError::persistence(path, err)),
    }
}

fn split_key_path(path: &Utf8Path) -> Result<(&Utf8Path, &str), KeyError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| KeyError::InvalidLocation(format!("{path} does not name a file")))?;
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    Ok((parent, file_name))
}

/// Opens the storage directory, creating it owner-only when absent. An
/// existing directory keeps its mode.
fn open_private_dir(dir: &Utf8Path) -> Result<Dir, KeyError> {
    match Dir::open_ambient_dir(dir, ambient_authority()) {
        Ok(handle) => Ok(handle),
        Err(err) if err.kind() == io::ErrorKind::NotFound => create_private_dir(dir),
        Err(err) => Err(KeyError::persistence(dir, err)),
    }
}

fn create_private_dir(dir: &Utf8Path) -> Result<Dir, KeyError> {
    let (parent, leaf) = split_key_path(dir)?;
    Dir::create_ambient_dir_all(parent, ambient_authority())
        .map_err(|err| KeyError::persistence(parent, err))?;
    let parent_dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|err| KeyError::persistence(parent, err))?;

    let mut builder = DirBuilder::new();
    #[cfg(unix)]
    {
        use cap_std::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    match parent_dir.create_dir_with(leaf, &builder) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
        Err(err) => return Err(KeyError::persistence(dir, err)),
    }
    parent_dir
        .open_dir(leaf)
        .map_err(|err| KeyError::persistence(dir, err))
}

fn write_private_file(
    dir: &Dir,
    file_name: &str,
    path: &Utf8Path,
    contents: &[u8],
) -> Result<(), KeyError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use cap_std::fs::OpenOptionsExt;
        options.mode(KEY_FILE_MODE);
    }
    let mut file = dir
        .open_with(file_name, &options)
        .map_err(|err| KeyError::persistence(path, err))?;
    // An overwritten file keeps its old mode unless reset.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let owner_only =
            cap_std::fs::Permissions::from_std(std::fs::Permissions::from_mode(KEY_FILE_MODE));
        file.set_permissions(owner_only)
            .map_err(|err| KeyError::persistence(path, err))?;
    }
    file.write_all(contents)
        .and_then(|()| file.sync_all())
        .map_err(|err| KeyError::persistence(path, err))
}
