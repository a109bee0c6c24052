//! Randomized checks of the codec and sealed-box contracts.

use rand::{thread_rng, Rng, RngCore};
use warden_crypto::codec::{bin_to_hex, hex_to_bin};
use warden_crypto::{
    hash_hex, open, seal, CipherHex, CryptoError, KeyPair, HASH_HEX_SIZE, KEY_BIN_SIZE,
    KEY_HEX_SIZE, MAX_PLAINTEXT_LEN,
};

const HEX_DIGITS: &[u8] = b"0123456789abcdef";

fn random_text(rng: &mut impl Rng, len: usize) -> String {
    (0..len)
        .map(|_| rng.gen_range(b' '..=b'~') as char)
        .collect()
}

#[test]
fn hex_roundtrip_for_key_sized_input() {
    let mut rng = thread_rng();
    for _ in 0..1_000 {
        let mut bytes = [0u8; KEY_BIN_SIZE];
        rng.fill_bytes(&mut bytes);
        let hex = bin_to_hex::<KEY_HEX_SIZE>(&bytes).unwrap();
        assert_eq!(hex_to_bin::<KEY_BIN_SIZE>(hex.as_str()).unwrap(), bytes);
    }
}

#[test]
fn seal_roundtrip_for_every_length() {
    let mut rng = thread_rng();
    let keypair = KeyPair::generate().unwrap();

    for len in 0..=MAX_PLAINTEXT_LEN {
        let plaintext = random_text(&mut rng, len);
        let sealed: CipherHex = seal(keypair.public(), &plaintext).unwrap();
        assert_eq!(open(&keypair, sealed.as_str()).unwrap(), plaintext);
    }
}

#[test]
fn single_hex_character_flip_is_rejected() {
    let mut rng = thread_rng();
    let keypair = KeyPair::generate().unwrap();
    let sealed: CipherHex = seal(keypair.public(), "skx=12345\ncid=abc123").unwrap();
    let original = sealed.as_str().as_bytes().to_vec();

    for idx in 0..original.len() {
        let mut mutated = original.clone();
        let mut replacement = HEX_DIGITS[rng.gen_range(0..HEX_DIGITS.len())];
        while replacement == mutated[idx] {
            replacement = HEX_DIGITS[rng.gen_range(0..HEX_DIGITS.len())];
        }
        mutated[idx] = replacement;
        let mutated = String::from_utf8(mutated).unwrap();

        assert!(
            matches!(open(&keypair, &mutated), Err(CryptoError::DecryptionFailed)),
            "flip at {idx} was accepted"
        );
    }
}

#[test]
fn random_garbage_never_opens() {
    let mut rng = thread_rng();
    let keypair = KeyPair::generate().unwrap();
    for _ in 0..1_000 {
        let len: usize = rng.gen_range(0..300);
        let garbage = random_text(&mut rng, len);
        assert!(open(&keypair, &garbage).is_err());
    }
}

#[test]
fn hash_is_stable_and_sized() {
    let mut rng = thread_rng();
    for _ in 0..100 {
        let len: usize = rng.gen_range(0..200);
        let input = random_text(&mut rng, len);
        let a = hash_hex(&input).unwrap();
        assert_eq!(a, hash_hex(&input).unwrap());
        assert_eq!(a.len(), HASH_HEX_SIZE - 1);
    }
}
