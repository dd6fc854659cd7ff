//! Payload encryption: AEAD material generation, encrypt/decrypt, base64.
//!
//! The whole payload is encrypted once before chunking, so a single nonce
//! per session is never reused across distinct plaintexts.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;

/// One transfer's symmetric key and nonce. Generated by the sending side
/// and conveyed to the receiver inside the announcement configuration.
#[derive(Clone)]
pub struct CipherMaterial {
    key: Key,
    nonce: Nonce,
}

impl CipherMaterial {
    /// Generate fresh material from the OS RNG.
    pub fn generate() -> Self {
        Self {
            key: ChaCha20Poly1305::generate_key(&mut OsRng),
            nonce: ChaCha20Poly1305::generate_nonce(&mut OsRng),
        }
    }

    /// Rebuild material from the base64 form carried in a configuration.
    /// Fails with [`CryptoError::Unavailable`] when either part is missing
    /// or the wrong size, and with [`CryptoError::Decode`] on bad base64.
    pub fn from_base64(key: Option<&str>, iv: Option<&str>) -> Result<Self, CryptoError> {
        let (key_b64, iv_b64) = match (key, iv) {
            (Some(k), Some(i)) => (k, i),
            _ => return Err(CryptoError::Unavailable),
        };
        let key_bytes = BASE64.decode(key_b64)?;
        let nonce_bytes = BASE64.decode(iv_b64)?;
        if key_bytes.len() != KEY_LEN || nonce_bytes.len() != NONCE_LEN {
            return Err(CryptoError::Unavailable);
        }
        Ok(Self {
            key: *Key::from_slice(&key_bytes),
            nonce: *Nonce::from_slice(&nonce_bytes),
        })
    }

    pub fn key_base64(&self) -> String {
        BASE64.encode(self.key)
    }

    pub fn iv_base64(&self) -> String {
        BASE64.encode(self.nonce)
    }
}

impl std::fmt::Debug for CipherMaterial {
    // Never print key bytes.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherMaterial").finish_non_exhaustive()
    }
}

/// Authenticated encryption of the whole payload. Returns base64 of
/// ciphertext + tag, ready to be chunked as wire text.
pub fn encrypt(plaintext: &str, material: &CipherMaterial) -> Result<String, CryptoError> {
    let cipher = ChaCha20Poly1305::new(&material.key);
    let ciphertext = cipher
        .encrypt(&material.nonce, plaintext.as_bytes())
        .map_err(|_| CryptoError::Unavailable)?;
    Ok(BASE64.encode(ciphertext))
}

/// Decrypt a base64 ciphertext produced by [`encrypt`]. A tag mismatch is
/// [`CryptoError::AuthenticationFailed`]; malformed input is
/// [`CryptoError::Decode`] or [`CryptoError::Utf8`].
pub fn decrypt(ciphertext_b64: &str, material: &CipherMaterial) -> Result<String, CryptoError> {
    let ciphertext = BASE64.decode(ciphertext_b64)?;
    let cipher = ChaCha20Poly1305::new(&material.key);
    let plaintext = cipher
        .decrypt(&material.nonce, ciphertext.as_slice())
        .map_err(|_| CryptoError::AuthenticationFailed)?;
    Ok(String::from_utf8(plaintext)?)
}

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// No usable cipher material (missing, wrong size, or the primitive
    /// refused it).
    #[error("cipher material unavailable or malformed")]
    Unavailable,
    /// The integrity tag did not verify.
    #[error("ciphertext authentication failed")]
    AuthenticationFailed,
    /// The input was not validly base64-structured.
    #[error("ciphertext decode failed: {0}")]
    Decode(#[from] base64::DecodeError),
    /// The tag verified but the plaintext is not valid text.
    #[error("decrypted payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
