//! Fixed-size digests.

use sha2::{Digest, Sha256};

use crate::codec::bin_to_hex;
use crate::{CryptoError, HexBuf, HASH_BIN_SIZE, HASH_HEX_SIZE};

/// Hex rendering of a digest.
pub type HashHex = HexBuf<HASH_HEX_SIZE>;

/// SHA-256 of `input`, rendered as hex into a buffer of capacity `CAP`.
///
/// Fails only when `CAP` is smaller than [`HASH_HEX_SIZE`].
pub fn hash<const CAP: usize>(input: &str) -> Result<HexBuf<CAP>, CryptoError> {
    if CAP < HASH_HEX_SIZE {
        return Err(CryptoError::BufferTooSmall {
            needed: HASH_HEX_SIZE,
            capacity: CAP,
        });
    }
    let digest: [u8; HASH_BIN_SIZE] = Sha256::digest(input.as_bytes()).into();
    bin_to_hex(&digest)
}

/// [`hash`] into a buffer of exactly [`HASH_HEX_SIZE`].
pub fn hash_hex(input: &str) -> Result<HashHex, CryptoError> {
    hash(input)
}
