//! AES-128-CBC payload cipher.
//!
//! An encrypted payload is the base64 encoding of
//! `[pad length: u8][IV: 16 bytes][ciphertext]`. Padding is `1..=16` bytes of
//! random printable characters; the length is transmitted rather than
//! inferred from the pad bytes themselves.
//!
//! There is no MAC: the cipher provides confidentiality only.

use aes::Aes128;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use rand::rngs::OsRng;

/// Cipher block (and IV) size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Key size in bytes.
pub const KEY_SIZE: usize = 16;

/// Size of the seed handed to the interpreter's pseudo-random generator.
pub const SEED_SIZE: usize = 8;

/// Errors raised while decrypting or decoding a payload.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CryptoError {
    /// The payload was not valid base64.
    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The decoded payload cannot hold a pad byte, an IV and whole blocks.
    #[error("malformed ciphertext of {0} bytes")]
    Malformed(usize),

    /// The stated pad length is out of range.
    #[error("invalid pad length {0}")]
    Pad(u8),

    /// The plaintext was not UTF-8.
    #[error("plaintext is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// A key given in hex had the wrong form.
    #[error("invalid key: {0}")]
    Key(String),

    /// The peer did not acknowledge a key change.
    #[error("key handshake failed: {0}")]
    Handshake(String),
}

/// A 128-bit session key.
#[derive(Clone, PartialEq, Eq)]
pub struct Key([u8; KEY_SIZE]);

impl Key {
    /// Generates a fresh random key from the OS generator.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wraps raw key bytes.
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parses a hex-encoded key.
    pub fn from_hex(text: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(text.trim()).map_err(|e| CryptoError::Key(e.to_string()))?;
        let bytes: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| CryptoError::Key(format!("expected 16 bytes, got {}", v.len())))?;
        Ok(Self(bytes))
    }

    /// Hex encoding, as passed on the interpreter's command line.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Key(..)")
    }
}

/// Generates a hex-encoded seed for the interpreter's pseudo-random generator.
pub fn generate_seed() -> String {
    let mut seed = [0u8; SEED_SIZE];
    OsRng.fill_bytes(&mut seed);
    hex::encode(seed)
}

/// Symmetric payload cipher bound to one key.
#[derive(Debug, Clone)]
pub struct Cipher {
    /// Current key.
    key: Key,
}

impl Cipher {
    /// Creates a cipher for `key`.
    pub const fn new(key: Key) -> Self {
        Self { key }
    }

    /// The key in use.
    pub const fn key(&self) -> &Key {
        &self.key
    }

    /// Encrypts with IV and padding drawn from the OS generator.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        self.encrypt_with(plaintext, &mut OsRng)
    }

    /// Encrypts with IV and padding drawn from `rng`.
    ///
    /// Returns the base64 text as bytes, ready to be framed.
    pub fn encrypt_with(&self, plaintext: &[u8], rng: &mut impl RngCore) -> Vec<u8> {
        let mut iv = [0u8; BLOCK_SIZE];
        rng.fill_bytes(&mut iv);

        let pad = BLOCK_SIZE - plaintext.len() % BLOCK_SIZE;
        let mut padding = [0u8; BLOCK_SIZE];
        rng.fill_bytes(&mut padding[..pad]);

        let mut data = Vec::with_capacity(plaintext.len() + pad);
        data.extend_from_slice(plaintext);
        data.extend(padding[..pad].iter().map(|b| b'0' + b % 64));

        let ciphertext = cbc::Encryptor::<Aes128>::new(&self.key.0.into(), &iv.into())
            .encrypt_padded_vec_mut::<NoPadding>(&data);

        let mut raw = Vec::with_capacity(1 + BLOCK_SIZE + ciphertext.len());
        #[allow(clippy::cast_possible_truncation)]
        raw.push(pad as u8);
        raw.extend_from_slice(&iv);
        raw.extend_from_slice(&ciphertext);
        STANDARD.encode(raw).into_bytes()
    }

    /// Decrypts a framed payload back to text.
    pub fn decrypt(&self, payload: &[u8]) -> Result<String, CryptoError> {
        let raw = STANDARD.decode(payload)?;
        let body_len = raw.len().saturating_sub(1 + BLOCK_SIZE);
        if raw.len() < 1 + BLOCK_SIZE + BLOCK_SIZE || body_len % BLOCK_SIZE != 0 {
            return Err(CryptoError::Malformed(raw.len()));
        }
        let pad = raw[0];
        if usize::from(pad) > BLOCK_SIZE {
            return Err(CryptoError::Pad(pad));
        }
        let mut iv = [0u8; BLOCK_SIZE];
        iv.copy_from_slice(&raw[1..=BLOCK_SIZE]);

        let mut data = cbc::Decryptor::<Aes128>::new(&self.key.0.into(), &iv.into())
            .decrypt_padded_vec_mut::<NoPadding>(&raw[1 + BLOCK_SIZE..])
            .map_err(|_| CryptoError::Malformed(raw.len()))?;
        data.truncate(data.len() - usize::from(pad));
        Ok(String::from_utf8(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_all_lengths_around_block_boundaries() {
        let cipher = Cipher::new(Key::generate());
        for n in 0..=(BLOCK_SIZE * 3 + 1) {
            let text = "k".repeat(n);
            let payload = cipher.encrypt(text.as_bytes());
            assert_eq!(cipher.decrypt(&payload).unwrap(), text, "length {n}");
        }
    }

    #[test]
    fn roundtrip_multibyte_text() {
        let cipher = Cipher::new(Key::generate());
        let text = "Cputs {größe → ∞}";
        assert_eq!(cipher.decrypt(&cipher.encrypt(text.as_bytes())).unwrap(), text);
    }

    #[test]
    fn same_plaintext_encrypts_differently() {
        let cipher = Cipher::new(Key::generate());
        let a = cipher.encrypt(b"set x 1");
        let b = cipher.encrypt(b"set x 1");
        assert_ne!(a, b);
    }

    #[test]
    fn aligned_plaintext_gets_a_full_pad_block() {
        let cipher = Cipher::new(Key::generate());
        let payload = cipher.encrypt(&[b'a'; BLOCK_SIZE]);
        let raw = STANDARD.decode(payload).unwrap();
        assert_eq!(raw[0], 16);
        assert_eq!(raw.len(), 1 + BLOCK_SIZE + 2 * BLOCK_SIZE);
    }

    #[test]
    fn wrong_key_does_not_yield_the_plaintext() {
        let a = Cipher::new(Key::generate());
        let b = Cipher::new(Key::generate());
        let payload = a.encrypt(b"Rsecret value");
        match b.decrypt(&payload) {
            Ok(text) => assert_ne!(text, "Rsecret value"),
            Err(_) => {}
        }
    }

    #[test]
    fn rejects_malformed_payloads() {
        let cipher = Cipher::new(Key::generate());
        assert!(matches!(cipher.decrypt(b"!!!"), Err(CryptoError::Base64(_))));
        let short = STANDARD.encode([1u8; 10]);
        assert!(matches!(
            cipher.decrypt(short.as_bytes()),
            Err(CryptoError::Malformed(10))
        ));
        let mut raw = vec![17u8];
        raw.extend_from_slice(&[0u8; 32]);
        assert!(matches!(
            cipher.decrypt(STANDARD.encode(raw).as_bytes()),
            Err(CryptoError::Pad(17))
        ));
    }

    #[test]
    fn key_hex_roundtrip() {
        let key = Key::generate();
        assert_eq!(Key::from_hex(&key.to_hex()).unwrap(), key);
        assert!(Key::from_hex("abcd").is_err());
        assert!(Key::from_hex("zz").is_err());
        assert_eq!(generate_seed().len(), SEED_SIZE * 2);
    }

    #[test]
    fn debug_hides_key_material() {
        assert_eq!(format!("{:?}", Key::from_bytes([7; KEY_SIZE])), "Key(..)");
    }
}
