//! Hybrid encryption: RSA-OAEP(SHA-256) wrapping a fresh AES-256-GCM key.
//!
//! This is the wire format the Fallback Uploader emits (spec §4.6 step 5)
//! and a matching server-side ingestor reads:
//!
//! ```text
//! [4 bytes big-endian encrypted-key-length][encrypted key][12-byte nonce][ciphertext]
//! ```
//!
//! A fresh AES key is generated per call and protected asymmetrically, so
//! the sender never needs (or holds) the private key.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use thiserror::Error;

const KEY_LEN_HEADER: usize = 4;
const NONCE_LEN: usize = 12;
const AES_KEY_LEN: usize = 32;

/// Errors from hybrid encrypt/decrypt operations.
#[derive(Debug, Error)]
pub enum HybridCryptoError {
    #[error("RSA operation failed: {0}")]
    Rsa(String),
    #[error("AES-GCM operation failed: {0}")]
    Aead(String),
    #[error("malformed hybrid-encrypted payload: {0}")]
    Malformed(String),
    #[error("failed to parse PEM key: {0}")]
    Pem(String),
}

type Result<T> = std::result::Result<T, HybridCryptoError>;

/// Parse a PEM-encoded RSA public key (SPKI format).
pub fn parse_public_key_pem(pem: &str) -> Result<RsaPublicKey> {
    use rsa::pkcs8::DecodePublicKey;
    RsaPublicKey::from_public_key_pem(pem).map_err(|e| HybridCryptoError::Pem(e.to_string()))
}

/// Parse a PEM-encoded RSA private key (PKCS#8 or PKCS#1 format).
pub fn parse_private_key_pem(pem: &str) -> Result<RsaPrivateKey> {
    use rsa::pkcs1::DecodeRsaPrivateKey;
    use rsa::pkcs8::DecodePrivateKey;
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| HybridCryptoError::Pem(e.to_string()))
}

/// Encrypt `plaintext` under a fresh AES-256-GCM key, itself wrapped with
/// RSA-OAEP(SHA-256) under `public_key`. No associated data is used.
pub fn encrypt(public_key: &RsaPublicKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut aes_key = [0u8; AES_KEY_LEN];
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut aes_key);
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(&aes_key)
        .map_err(|e| HybridCryptoError::Aead(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| HybridCryptoError::Aead(e.to_string()))?;

    let padding = Oaep::new::<Sha256>();
    let encrypted_key = public_key
        .encrypt(&mut OsRng, padding, &aes_key)
        .map_err(|e| HybridCryptoError::Rsa(e.to_string()))?;

    let mut out = Vec::with_capacity(
        KEY_LEN_HEADER + encrypted_key.len() + NONCE_LEN + ciphertext.len(),
    );
    out.extend_from_slice(&(encrypted_key.len() as u32).to_be_bytes());
    out.extend_from_slice(&encrypted_key);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Reverse of [`encrypt`]: unwrap the AES key with `private_key`, then
/// decrypt the payload.
pub fn decrypt(private_key: &RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < KEY_LEN_HEADER {
        return Err(HybridCryptoError::Malformed("payload shorter than key-length header".into()));
    }
    let key_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;

    let key_end = KEY_LEN_HEADER + key_len;
    let nonce_end = key_end + NONCE_LEN;
    if data.len() < nonce_end {
        return Err(HybridCryptoError::Malformed("payload shorter than key + nonce".into()));
    }

    let encrypted_key = &data[KEY_LEN_HEADER..key_end];
    let nonce = &data[key_end..nonce_end];
    let ciphertext = &data[nonce_end..];

    let padding = Oaep::new::<Sha256>();
    let aes_key = private_key
        .decrypt(padding, encrypted_key)
        .map_err(|e| HybridCryptoError::Rsa(e.to_string()))?;

    let cipher =
        Aes256Gcm::new_from_slice(&aes_key).map_err(|e| HybridCryptoError::Aead(e.to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| HybridCryptoError::Aead(e.to_string()))
}
