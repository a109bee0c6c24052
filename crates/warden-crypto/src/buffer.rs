//! Fixed-capacity buffers.
//!
//! A [`BoundedBuf`] owns its storage and refuses writes past its capacity,
//! so call sites never pass a capacity alongside a pointer. [`HexBuf`] is a
//! bounded buffer that only the hex codec can fill, which keeps its contents
//! valid ASCII.

use std::fmt;

use zeroize::Zeroize;

use crate::CryptoError;

/// Byte buffer with a compile-time capacity.
#[derive(Clone)]
pub struct BoundedBuf<const CAP: usize> {
    bytes: [u8; CAP],
    len: usize,
}

impl<const CAP: usize> BoundedBuf<CAP> {
    pub const fn new() -> Self {
        Self {
            bytes: [0u8; CAP],
            len: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        CAP
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn remaining(&self) -> usize {
        CAP - self.len
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Append `data`, or leave the buffer untouched if it would not fit.
    pub fn extend_from_slice(&mut self, data: &[u8]) -> Result<(), CryptoError> {
        let requested = self.len + data.len();
        if requested > CAP {
            return Err(CryptoError::Overflow {
                requested,
                capacity: CAP,
            });
        }
        self.bytes[self.len..requested].copy_from_slice(data);
        self.len = requested;
        Ok(())
    }

    /// Replace the contents with `data`.
    pub fn set(&mut self, data: &[u8]) -> Result<(), CryptoError> {
        if data.len() > CAP {
            return Err(CryptoError::Overflow {
                requested: data.len(),
                capacity: CAP,
            });
        }
        self.clear();
        self.extend_from_slice(data)
    }

    pub fn clear(&mut self) {
        self.bytes[..self.len].zeroize();
        self.len = 0;
    }
}

impl<const CAP: usize> Default for BoundedBuf<CAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAP: usize> PartialEq for BoundedBuf<CAP> {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl<const CAP: usize> Eq for BoundedBuf<CAP> {}

impl<const CAP: usize> Zeroize for BoundedBuf<CAP> {
    fn zeroize(&mut self) {
        self.bytes.zeroize();
        self.len = 0;
    }
}

impl<const CAP: usize> fmt::Debug for BoundedBuf<CAP> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedBuf")
            .field("len", &self.len)
            .field("capacity", &CAP)
            .finish()
    }
}

/// Lowercase hex text in a bounded buffer.
///
/// `CAP` counts a terminator slot, so a buffer holding the hex of `n`
/// bytes needs `CAP >= 2n + 1`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct HexBuf<const CAP: usize>(BoundedBuf<CAP>);

impl<const CAP: usize> HexBuf<CAP> {
    pub(crate) fn from_ascii(text: &str) -> Result<Self, CryptoError> {
        // reserve the terminator slot
        if text.len() + 1 > CAP {
            return Err(CryptoError::BufferTooSmall {
                needed: text.len() + 1,
                capacity: CAP,
            });
        }
        let mut buf = BoundedBuf::new();
        buf.extend_from_slice(text.as_bytes())?;
        Ok(Self(buf))
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(self.0.as_bytes()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        CAP
    }
}

impl<const CAP: usize> Zeroize for HexBuf<CAP> {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl<const CAP: usize> fmt::Display for HexBuf<CAP> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<const CAP: usize> fmt::Debug for HexBuf<CAP> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HexBuf({})", self.as_str())
    }
}
