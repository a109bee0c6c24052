//! Crypto error type.

use thiserror::Error;

/// Errors from key handling, sealing, hashing and the hex codec.
///
/// Every way a sealed message can fail to open is reported as
/// [`CryptoError::DecryptionFailed`] so callers cannot tell tampering
/// apart from corruption.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("output buffer too small: need {needed} bytes, have {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },

    #[error("write of {requested} bytes exceeds buffer capacity {capacity}")]
    Overflow { requested: usize, capacity: usize },

    #[error("plaintext too large: {len} bytes (max {max})")]
    PlaintextTooLarge { len: usize, max: usize },

    #[error("plaintext contains a NUL byte")]
    NulInPlaintext,

    #[error("invalid hex encoding")]
    InvalidHex,

    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("public key does not match secret key")]
    KeyMismatch,

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("key file error: {0}")]
    Io(#[from] std::io::Error),
}
