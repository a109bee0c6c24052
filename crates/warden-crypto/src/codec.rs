//! Exact-size binary/hex codec.

use crate::{CryptoError, HexBuf};

/// Render `input` as lowercase hex into a buffer of capacity `CAP`.
///
/// `CAP` must be at least `2 * input.len() + 1`; otherwise nothing is
/// written and [`CryptoError::BufferTooSmall`] is returned.
pub fn bin_to_hex<const CAP: usize>(input: &[u8]) -> Result<HexBuf<CAP>, CryptoError> {
    let needed = input.len() * 2 + 1;
    if CAP < needed {
        return Err(CryptoError::BufferTooSmall {
            needed,
            capacity: CAP,
        });
    }
    HexBuf::from_ascii(&hex::encode(input))
}

/// Decode hex that must describe exactly `N` bytes.
///
/// Odd lengths, short or long input, and non-hex characters are all
/// rejected; there is no partial acceptance.
pub fn hex_to_bin<const N: usize>(text: &str) -> Result<[u8; N], CryptoError> {
    let mut out = [0u8; N];
    hex::decode_to_slice(text, &mut out).map_err(|_| CryptoError::InvalidHex)?;
    Ok(out)
}
