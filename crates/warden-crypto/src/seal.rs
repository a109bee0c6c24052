//! Anonymous sealed boxes.
//!
//! A sealed box lets anyone holding the server's public key send it a
//! message that only the matching secret key can open. The sender needs no
//! key pair of its own.
//!
//! # Construction
//!
//! ```text
//! esk, epk   = fresh X25519 key pair
//! shared     = X25519(esk, recipient_pk)
//! key        = HKDF-SHA256(salt = epk || recipient_pk, ikm = shared, info = SEAL_INFO)
//! nonce      = SHA-256(epk || recipient_pk)[..12]
//! box        = epk || ChaCha20-Poly1305(key, nonce, padded_plaintext)
//! ```
//!
//! The plaintext is zero-padded to [`MAX_PLAINTEXT_LEN`] bytes, so every box
//! is exactly [`CIPHER_BIN_SIZE`] bytes and travels as hex.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use x25519_dalek::StaticSecret;
use zeroize::Zeroize;

use crate::codec::{bin_to_hex, hex_to_bin};
use crate::keys::random_secret_bytes;
use crate::{
    BoundedBuf, CryptoError, HexBuf, KeyPair, PublicKey, CIPHER_BIN_SIZE, CIPHER_HEX_SIZE,
    CIPHER_RAW_SIZE, KEY_BIN_SIZE, MAX_PLAINTEXT_LEN,
};

/// Hex rendering of a sealed message.
pub type CipherHex = HexBuf<CIPHER_HEX_SIZE>;

const SEAL_INFO: &[u8] = b"warden-seal-v1";

/// Seal `plaintext` for the holder of `recipient`.
///
/// The output buffer capacity `CAP` must be at least [`CIPHER_HEX_SIZE`] and
/// the plaintext at most [`MAX_PLAINTEXT_LEN`] bytes with no NUL, since NUL
/// is the padding byte. Violations are reported before any work is done.
pub fn seal<const CAP: usize>(
    recipient: &PublicKey,
    plaintext: &str,
) -> Result<HexBuf<CAP>, CryptoError> {
    if plaintext.len() > MAX_PLAINTEXT_LEN {
        return Err(CryptoError::PlaintextTooLarge {
            len: plaintext.len(),
            max: MAX_PLAINTEXT_LEN,
        });
    }
    if plaintext.bytes().any(|b| b == 0) {
        return Err(CryptoError::NulInPlaintext);
    }
    if CAP < CIPHER_HEX_SIZE {
        return Err(CryptoError::BufferTooSmall {
            needed: CIPHER_HEX_SIZE,
            capacity: CAP,
        });
    }

    let mut esk_bytes = random_secret_bytes().map_err(|_| CryptoError::EncryptionFailed)?;
    let esk = StaticSecret::from(esk_bytes);
    esk_bytes.zeroize();
    let epk = x25519_dalek::PublicKey::from(&esk);

    let shared = esk.diffie_hellman(&x25519_dalek::PublicKey::from(*recipient.as_bytes()));
    if !shared.was_contributory() {
        return Err(CryptoError::EncryptionFailed);
    }

    let (cipher, nonce) = derive_cipher(shared.as_bytes(), epk.as_bytes(), recipient.as_bytes())?;

    let mut padded = [0u8; MAX_PLAINTEXT_LEN];
    padded[..plaintext.len()].copy_from_slice(plaintext.as_bytes());
    let sealed = cipher.encrypt(&nonce, padded.as_slice());
    padded.zeroize();
    let sealed = sealed.map_err(|_| CryptoError::EncryptionFailed)?;

    let mut wire = [0u8; CIPHER_BIN_SIZE];
    wire[..KEY_BIN_SIZE].copy_from_slice(epk.as_bytes());
    wire[KEY_BIN_SIZE..].copy_from_slice(&sealed);

    bin_to_hex(&wire)
}

/// Open a sealed message into `out`.
///
/// Oversized input, a short output buffer, malformed hex, a wrong-size box
/// and a failed authentication check all return
/// [`CryptoError::DecryptionFailed`].
pub fn open_into<const CAP: usize>(
    keypair: &KeyPair,
    cipher_hex: &str,
    out: &mut BoundedBuf<CAP>,
) -> Result<(), CryptoError> {
    if cipher_hex.len() > CIPHER_HEX_SIZE - 1 {
        return Err(CryptoError::DecryptionFailed);
    }
    if CAP < CIPHER_RAW_SIZE {
        tracing::warn!(
            capacity = CAP,
            needed = CIPHER_RAW_SIZE,
            "decryption output buffer is too small"
        );
        return Err(CryptoError::DecryptionFailed);
    }

    let wire: [u8; CIPHER_BIN_SIZE] =
        hex_to_bin(cipher_hex).map_err(|_| CryptoError::DecryptionFailed)?;

    let mut epk = [0u8; KEY_BIN_SIZE];
    epk.copy_from_slice(&wire[..KEY_BIN_SIZE]);

    let shared = keypair
        .secret()
        .to_static()
        .diffie_hellman(&x25519_dalek::PublicKey::from(epk));
    if !shared.was_contributory() {
        return Err(CryptoError::DecryptionFailed);
    }

    let (cipher, nonce) = derive_cipher(shared.as_bytes(), &epk, keypair.public().as_bytes())
        .map_err(|_| CryptoError::DecryptionFailed)?;

    let mut padded = cipher
        .decrypt(&nonce, &wire[KEY_BIN_SIZE..])
        .map_err(|_| CryptoError::DecryptionFailed)?;

    let end = padded.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    let result = match std::str::from_utf8(&padded[..end]) {
        Ok(_) => out.set(&padded[..end]).map_err(|_| CryptoError::DecryptionFailed),
        Err(_) => Err(CryptoError::DecryptionFailed),
    };
    padded.zeroize();
    result
}

/// Open a sealed message and return its text.
pub fn open(keypair: &KeyPair, cipher_hex: &str) -> Result<String, CryptoError> {
    let mut out = BoundedBuf::<CIPHER_RAW_SIZE>::new();
    open_into(keypair, cipher_hex, &mut out)?;
    let text = std::str::from_utf8(out.as_bytes())
        .map_err(|_| CryptoError::DecryptionFailed)?
        .to_string();
    out.zeroize();
    Ok(text)
}

fn derive_cipher(
    shared: &[u8; KEY_BIN_SIZE],
    epk: &[u8; KEY_BIN_SIZE],
    recipient: &[u8; KEY_BIN_SIZE],
) -> Result<(ChaCha20Poly1305, Nonce), CryptoError> {
    let mut salt = [0u8; KEY_BIN_SIZE * 2];
    salt[..KEY_BIN_SIZE].copy_from_slice(epk);
    salt[KEY_BIN_SIZE..].copy_from_slice(recipient);

    let mut key = [0u8; 32];
    Hkdf::<Sha256>::new(Some(&salt), shared)
        .expand(SEAL_INFO, &mut key)
        .map_err(|_| CryptoError::EncryptionFailed)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    key.zeroize();

    let digest = Sha256::digest(salt);
    let nonce = *Nonce::from_slice(&digest[..12]);

    Ok((cipher, nonce))
}
