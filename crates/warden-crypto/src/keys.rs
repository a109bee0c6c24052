//! X25519 server key pair.
//!
//! Each key is held as raw bytes plus a hex rendering. The hex form is a
//! cache derived from the bytes in the constructor; nothing else writes it.
//!
//! # Example
//!
//! ```
//! use warden_crypto::keys::KeyPair;
//!
//! let keypair = KeyPair::generate().unwrap();
//! assert_eq!(keypair.public().hex().len(), 64);
//! ```

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::StaticSecret;
use zeroize::Zeroize;

use crate::codec::bin_to_hex;
use crate::{CryptoError, HexBuf, KEY_BIN_SIZE, KEY_HEX_SIZE};

/// Hex rendering of a key.
pub type KeyHex = HexBuf<KEY_HEX_SIZE>;

/// Public half of a key pair.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    bin: [u8; KEY_BIN_SIZE],
    hex: KeyHex,
}

impl PublicKey {
    pub fn from_bytes(bytes: [u8; KEY_BIN_SIZE]) -> Result<Self, CryptoError> {
        let hex = bin_to_hex(&bytes)?;
        Ok(Self { bin: bytes, hex })
    }

    /// Parse the hex form announced to clients.
    pub fn from_hex(text: &str) -> Result<Self, CryptoError> {
        Self::from_bytes(crate::codec::hex_to_bin(text)?)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_BIN_SIZE] {
        &self.bin
    }

    pub fn hex(&self) -> &str {
        self.hex.as_str()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.hex())
    }
}

/// Secret half of a key pair. Wiped on drop.
pub struct SecretKey {
    bin: [u8; KEY_BIN_SIZE],
    hex: KeyHex,
}

impl SecretKey {
    pub fn from_bytes(bytes: [u8; KEY_BIN_SIZE]) -> Result<Self, CryptoError> {
        let hex = bin_to_hex(&bytes)?;
        Ok(Self { bin: bytes, hex })
    }

    /// Get the secret bytes.
    ///
    /// # Security
    /// Handle with care! These bytes can recreate the key pair.
    pub fn as_bytes(&self) -> &[u8; KEY_BIN_SIZE] {
        &self.bin
    }

    pub fn hex(&self) -> &str {
        self.hex.as_str()
    }

    /// Derive the matching public key.
    pub fn public_key(&self) -> Result<PublicKey, CryptoError> {
        let secret = StaticSecret::from(self.bin);
        PublicKey::from_bytes(*x25519_dalek::PublicKey::from(&secret).as_bytes())
    }

    pub(crate) fn to_static(&self) -> StaticSecret {
        StaticSecret::from(self.bin)
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.bin.zeroize();
        self.hex.zeroize();
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// Server key pair used to open sealed client messages.
#[derive(Debug)]
pub struct KeyPair {
    public: PublicKey,
    secret: SecretKey,
}

impl KeyPair {
    /// Generate a new key pair from the OS CSPRNG.
    ///
    /// Fails without producing any key material if the generator fails.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = random_secret_bytes()?;
        let result = Self::from_secret_bytes(bytes);
        bytes.zeroize();
        result
    }

    /// Rebuild a key pair from its secret bytes.
    pub fn from_secret_bytes(bytes: [u8; KEY_BIN_SIZE]) -> Result<Self, CryptoError> {
        let secret = SecretKey::from_bytes(bytes)?;
        let public = secret.public_key()?;
        Ok(Self { public, secret })
    }

    /// Assemble a key pair from both halves, checking that they belong
    /// together.
    pub fn from_parts(
        public: [u8; KEY_BIN_SIZE],
        secret: [u8; KEY_BIN_SIZE],
    ) -> Result<Self, CryptoError> {
        let pair = Self::from_secret_bytes(secret)?;
        if pair.public.as_bytes() != &public {
            return Err(CryptoError::KeyMismatch);
        }
        Ok(pair)
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

pub(crate) fn random_secret_bytes() -> Result<[u8; KEY_BIN_SIZE], CryptoError> {
    let mut bytes = [0u8; KEY_BIN_SIZE];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
    Ok(bytes)
}
