//! Key pair persistence.
//!
//! The public and secret keys live in two separate files, each holding
//! exactly [`KEY_BIN_SIZE`] raw bytes. A missing file, a file of the wrong
//! size, or a public key that does not match the secret key all mean "no
//! valid keys on disk" and lead to regeneration.

use std::fs;
use std::path::Path;

use tracing::{error, info, warn};
use zeroize::Zeroize;

use crate::{CryptoError, KeyPair, KEY_BIN_SIZE};

/// Outcome of loading the server key pair at startup.
#[derive(Debug)]
pub enum KeyMaterial {
    /// Valid keys were read from disk.
    Loaded(KeyPair),
    /// Fresh keys were generated (and saved if possible).
    Generated(KeyPair),
    /// No keys are available; authentication must stay disabled.
    Unavailable,
}

impl KeyMaterial {
    pub fn keypair(&self) -> Option<&KeyPair> {
        match self {
            KeyMaterial::Loaded(kp) | KeyMaterial::Generated(kp) => Some(kp),
            KeyMaterial::Unavailable => None,
        }
    }

    pub fn into_keypair(self) -> Option<KeyPair> {
        match self {
            KeyMaterial::Loaded(kp) | KeyMaterial::Generated(kp) => Some(kp),
            KeyMaterial::Unavailable => None,
        }
    }
}

fn read_key_file(path: &Path) -> Result<[u8; KEY_BIN_SIZE], CryptoError> {
    let mut bytes = fs::read(path)?;

    if bytes.len() != KEY_BIN_SIZE {
        let actual = bytes.len();
        bytes.zeroize();
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_BIN_SIZE,
            actual,
        });
    }

    let mut key = [0u8; KEY_BIN_SIZE];
    key.copy_from_slice(&bytes);
    bytes.zeroize();
    Ok(key)
}

/// Load a key pair from its two files.
pub fn load_keypair(public_path: &Path, secret_path: &Path) -> Result<KeyPair, CryptoError> {
    let public = read_key_file(public_path)?;
    let mut secret = read_key_file(secret_path)?;
    let result = KeyPair::from_parts(public, secret);
    secret.zeroize();
    result
}

/// Save a key pair to two files.
///
/// The secret key file gets restricted permissions (0600 on Unix).
pub fn save_keypair(
    keypair: &KeyPair,
    public_path: &Path,
    secret_path: &Path,
) -> Result<(), CryptoError> {
    fs::write(public_path, keypair.public().as_bytes())?;
    fs::write(secret_path, keypair.secret().as_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(secret_path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(secret_path, perms)?;
    }

    Ok(())
}

/// Load the key pair from disk, generating and saving a new one when the
/// files are missing or invalid.
pub fn load_or_generate(public_path: &Path, secret_path: &Path) -> KeyMaterial {
    load_or_generate_with(public_path, secret_path, KeyPair::generate)
}

/// [`load_or_generate`] with a caller-supplied generator.
pub fn load_or_generate_with<F>(public_path: &Path, secret_path: &Path, generate: F) -> KeyMaterial
where
    F: FnOnce() -> Result<KeyPair, CryptoError>,
{
    match load_keypair(public_path, secret_path) {
        Ok(keypair) => {
            info!("loaded crypto key files from disk");
            return KeyMaterial::Loaded(keypair);
        }
        Err(e) => {
            warn!("no valid crypto key files on disk ({e}), generating a new pair");
        }
    }

    let keypair = match generate() {
        Ok(keypair) => keypair,
        Err(e) => {
            error!("failed to generate a crypto key pair: {e}");
            return KeyMaterial::Unavailable;
        }
    };
    info!("generated new crypto key pair");

    if let Err(e) = save_keypair(&keypair, public_path, secret_path) {
        warn!("failed to save crypto key files: {e}");
    }

    KeyMaterial::Generated(keypair)
}
