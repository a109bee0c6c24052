//! Cryptographic primitives for Warden.
//!
//! This crate provides:
//! - X25519 key pairs with a cached hex rendering of each key
//! - Anonymous sealed boxes (encrypt to a public key, no sender key pair)
//! - Fixed-size SHA-256 digests rendered as hex
//! - An exact-size hex codec writing into bounded buffers
//! - Key file persistence with regenerate-on-invalid semantics
//!
//! # Size contracts
//!
//! Every buffer size used by the handshake is a compile-time constant.
//! Sealed ciphertexts travel as hex inside text command arguments, so the
//! hex size is checked against [`MAX_TEXT_ARG_SIZE`] at build time.

#![forbid(unsafe_code)]

pub mod buffer;
pub mod codec;
pub mod digest;
pub mod error;
pub mod keyfile;
pub mod keys;
pub mod seal;

pub use buffer::{BoundedBuf, HexBuf};
pub use digest::{hash, hash_hex, HashHex};
pub use error::CryptoError;
pub use keyfile::{load_or_generate, KeyMaterial};
pub use keys::{KeyHex, KeyPair, PublicKey, SecretKey};
pub use seal::{open, seal, CipherHex};

/// Raw size of an X25519 key.
pub const KEY_BIN_SIZE: usize = 32;
/// Hex rendering of a key, including room for a terminator.
pub const KEY_HEX_SIZE: usize = KEY_BIN_SIZE * 2 + 1;

/// Plaintext capacity of a sealed message, including room for a terminator.
pub const CIPHER_RAW_SIZE: usize = 80;
/// Longest plaintext that can be sealed.
pub const MAX_PLAINTEXT_LEN: usize = CIPHER_RAW_SIZE - 1;
/// Ephemeral public key plus AEAD tag.
pub const SEAL_OVERHEAD: usize = KEY_BIN_SIZE + 16;
/// Every sealed message has exactly this many bytes.
pub const CIPHER_BIN_SIZE: usize = MAX_PLAINTEXT_LEN + SEAL_OVERHEAD;
/// Hex rendering of a sealed message, including room for a terminator.
pub const CIPHER_HEX_SIZE: usize = CIPHER_BIN_SIZE * 2 + 1;

/// Raw digest size.
pub const HASH_BIN_SIZE: usize = 32;
/// Hex rendering of a digest, including room for a terminator.
pub const HASH_HEX_SIZE: usize = HASH_BIN_SIZE * 2 + 1;

/// Longest text argument the command transport carries.
pub const MAX_TEXT_ARG_SIZE: usize = 256;

const _: () = assert!(
    CIPHER_HEX_SIZE <= MAX_TEXT_ARG_SIZE,
    "sealed message hex does not fit in a command argument"
);
const _: () = assert!(HASH_BIN_SIZE >= 16, "digest is too small");
const _: () = assert!(HASH_BIN_SIZE <= 64, "digest is too large");
