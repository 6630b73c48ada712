//! Keyring file for version 3 tokens.
//!
//! One `<id>:<base64 key>` line per key, oldest first; the last line is the
//! active key.  The file is created with a fresh key on first use and written
//! with owner-only permissions on Unix.
//!
//! Rotation appends a key and rewrites the file.  Tokens sealed under older
//! keys keep decoding until a rotation drops those keys.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use deskshare_core::token::KeyringError;
use deskshare_core::Keyring;
use thiserror::Error;
use tracing::info;

/// Errors reading or writing a key file.
#[derive(Debug, Error)]
pub enum KeyFileError {
    #[error("I/O error accessing key file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid key file {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: KeyringError,
    },

    #[error("key file {0} contains no keys")]
    Empty(PathBuf),
}

/// Reads the keyring at `path`.
///
/// # Errors
///
/// [`KeyFileError::Io`] when the file cannot be read (including when it does
/// not exist), [`KeyFileError::Invalid`] for malformed content, and
/// [`KeyFileError::Empty`] when it holds no keys.
pub fn load_keyring(path: &Path) -> Result<Keyring, KeyFileError> {
    let text = fs::read_to_string(path).map_err(|source| KeyFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let ring = Keyring::from_text(&text).map_err(|source| KeyFileError::Invalid {
        path: path.to_path_buf(),
        source,
    })?;
    if ring.is_empty() {
        return Err(KeyFileError::Empty(path.to_path_buf()));
    }
    Ok(ring)
}

/// Reads the keyring at `path`, creating it with one fresh key if absent.
///
/// # Errors
///
/// As [`load_keyring`], plus write failures when creating the file.
pub fn load_or_create_keyring(path: &Path) -> Result<Keyring, KeyFileError> {
    match load_keyring(path) {
        Err(KeyFileError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            let ring = Keyring::generate();
            save_keyring(path, &ring)?;
            info!(path = %path.display(), "created new token keyring");
            Ok(ring)
        }
        other => other,
    }
}

/// Writes `ring` to `path`, replacing any previous content.
///
/// # Errors
///
/// Returns [`KeyFileError::Io`] on any file-system failure.
pub fn save_keyring(path: &Path, ring: &Keyring) -> Result<(), KeyFileError> {
    let io_err = |source| KeyFileError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(io_err)?;
    }

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(io_err)?;
    file.write_all(ring.to_text().as_bytes()).map_err(io_err)?;
    file.sync_all().map_err(io_err)
}

/// Adds a new active key to the file at `path`, keeping at most `retain` keys.
///
/// # Errors
///
/// As [`load_keyring`] and [`save_keyring`], plus [`KeyFileError::Invalid`]
/// when the newest key id cannot be incremented.
pub fn rotate_keyring(path: &Path, retain: usize) -> Result<Keyring, KeyFileError> {
    let ring = load_keyring(path)?
        .rotated()
        .map_err(|source| KeyFileError::Invalid {
            path: path.to_path_buf(),
            source,
        })?
        .retain_latest(retain.max(1));
    save_keyring(path, &ring)?;
    info!(
        path = %path.display(),
        active_id = ring.active_id(),
        keys = ring.len(),
        "rotated token keyring"
    );
    Ok(ring)
}
