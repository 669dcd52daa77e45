//! Symmetric envelope codec.
//!
//! Payloads are AES-CBC encrypted with PKCS#7 padding under a shared key,
//! a fresh random IV is prepended, and the result is base64 encoded. The
//! base64 text is wrapped in a ```` ```^ ... ``` ```` fence so a plain-text
//! scanner on the receiving side can spot it inside a chat message.
//!
//! The AES variant follows the key length: 16, 24 or 32 bytes of the UTF-8
//! key string select AES-128, AES-192 or AES-256.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use cipher::block_padding::Pkcs7;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

/// AES block size, which is also the IV length.
pub const BLOCK_SIZE: usize = 16;

/// Opening fence of an envelope.
pub const FENCE_OPEN: &str = "```^";
/// Closing fence of an envelope.
pub const FENCE_CLOSE: &str = "```";

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes192CbcEnc = cbc::Encryptor<aes::Aes192>;
type Aes192CbcDec = cbc::Decryptor<aes::Aes192>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("key must be 16, 24 or 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("envelope is not valid base64: {0}")]
    Base64(String),

    #[error("envelope holds {0} bytes, fewer than one IV")]
    Truncated(usize),

    #[error("ciphertext padding is invalid")]
    Padding,

    #[error("decrypted payload is not UTF-8")]
    Utf8,
}

/// Encrypts and decrypts relay payloads with one fixed key.
pub struct Codec {
    key: SecretString,
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("key_len", &self.key.expose_secret().len())
            .finish()
    }
}

impl Codec {
    /// Build a codec, rejecting keys the cipher cannot use.
    ///
    /// A bad key is a configuration error and is reported here, never at
    /// encrypt/decrypt time.
    pub fn new(key: &SecretString) -> Result<Self, CodecError> {
        validate_key(key.expose_secret())?;
        Ok(Self {
            key: SecretString::from(key.expose_secret()),
        })
    }

    /// Encrypt `plaintext` into `base64(iv || ciphertext)`.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let iv: [u8; BLOCK_SIZE] = rand::random();
        self.encrypt_with_iv(plaintext, &iv)
    }

    fn encrypt_with_iv(&self, plaintext: &str, iv: &[u8; BLOCK_SIZE]) -> String {
        let key = self.key.expose_secret().as_bytes();
        let data = plaintext.as_bytes();
        // Key length was validated in `new`, so construction cannot fail.
        let ciphertext = match key.len() {
            16 => Aes128CbcEnc::new_from_slices(key, iv)
                .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(data)),
            24 => Aes192CbcEnc::new_from_slices(key, iv)
                .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(data)),
            _ => Aes256CbcEnc::new_from_slices(key, iv)
                .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(data)),
        }
        .unwrap_or_default();

        let mut out = Vec::with_capacity(BLOCK_SIZE + ciphertext.len());
        out.extend_from_slice(iv);
        out.extend_from_slice(&ciphertext);
        STANDARD.encode(out)
    }

    /// Decrypt `base64(iv || ciphertext)` back to text.
    ///
    /// Input shorter than one IV is rejected with [`CodecError::Truncated`]:
    /// the ciphertext after a short IV is always empty, so substituting a
    /// random IV could never recover a payload.
    pub fn decrypt(&self, encoded: &str) -> Result<String, CodecError> {
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CodecError::Base64(e.to_string()))?;
        if decoded.len() < BLOCK_SIZE {
            return Err(CodecError::Truncated(decoded.len()));
        }
        let (iv, ciphertext) = decoded.split_at(BLOCK_SIZE);
        let key = self.key.expose_secret().as_bytes();

        let plain = match key.len() {
            16 => Aes128CbcDec::new_from_slices(key, iv)
                .map_err(|_| CodecError::InvalidKeyLength(key.len()))?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
            24 => Aes192CbcDec::new_from_slices(key, iv)
                .map_err(|_| CodecError::InvalidKeyLength(key.len()))?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
            _ => Aes256CbcDec::new_from_slices(key, iv)
                .map_err(|_| CodecError::InvalidKeyLength(key.len()))?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        }
        .map_err(|_| CodecError::Padding)?;

        String::from_utf8(plain).map_err(|_| CodecError::Utf8)
    }

    /// Encrypt and wrap in the envelope fence.
    pub fn seal(&self, plaintext: &str) -> String {
        fence(&self.encrypt(plaintext))
    }

    /// Decrypt an envelope. The fence is optional.
    pub fn open(&self, envelope: &str) -> Result<String, CodecError> {
        self.decrypt(unfence(envelope).unwrap_or(envelope))
    }
}

/// Check that a key string can drive the cipher.
pub fn validate_key(key: &str) -> Result<(), CodecError> {
    match key.len() {
        16 | 24 | 32 => Ok(()),
        n => Err(CodecError::InvalidKeyLength(n)),
    }
}

/// Wrap encoded text in the envelope fence.
pub fn fence(encoded: &str) -> String {
    format!("{FENCE_OPEN}{encoded}{FENCE_CLOSE}")
}

/// Is `content` a fenced envelope?
pub fn is_envelope(content: &str) -> bool {
    content.len() >= FENCE_OPEN.len() + FENCE_CLOSE.len()
        && content.starts_with(FENCE_OPEN)
        && content.ends_with(FENCE_CLOSE)
}

/// Strip the envelope fence, if present.
pub fn unfence(content: &str) -> Option<&str> {
    if !is_envelope(content) {
        return None;
    }
    Some(&content[FENCE_OPEN.len()..content.len() - FENCE_CLOSE.len()])
}
