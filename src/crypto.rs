//! Feishu Event Envelope Cryptography
//!
//! When an encrypt key is set on the Feishu app, every callback body is
//! replaced by `{"encrypt": "<base64>"}`. The blob decodes to a 16-byte IV
//! followed by AES-256-CBC ciphertext (PKCS#7 padded). The AES key is the
//! SHA-256 digest of the configured encrypt key string.
//!
//! `encrypt` is the inverse operation. The platform never needs it from us,
//! but tests and the `encrypt` CLI helper use it to build envelopes.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{BridgeError, Result};

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

/// AES block (and IV) length in bytes
pub const IV_LEN: usize = 16;

/// Derive the 256-bit AES key from the configured encrypt key
pub fn derive_key(encrypt_key: &str) -> [u8; 32] {
    let digest = Sha256::digest(encrypt_key.as_bytes());
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    key
}

/// Decrypt a base64 envelope and parse the plaintext as JSON
///
/// # Errors
///
/// Returns [`BridgeError::Decryption`] for malformed base64, input shorter
/// than one IV, empty or unaligned ciphertext, bad padding (wrong key or
/// corrupted data) and plaintext that is not valid JSON.
pub fn decrypt(ciphertext_b64: &str, encrypt_key: &str) -> Result<Value> {
    let raw = STANDARD
        .decode(ciphertext_b64.trim())
        .map_err(|e| BridgeError::Decryption(format!("invalid base64: {}", e)))?;

    if raw.len() < IV_LEN {
        return Err(BridgeError::Decryption(format!(
            "envelope is {} bytes, shorter than the {}-byte IV",
            raw.len(),
            IV_LEN
        )));
    }

    let (iv, body) = raw.split_at(IV_LEN);
    if body.is_empty() || body.len() % IV_LEN != 0 {
        return Err(BridgeError::Decryption(format!(
            "ciphertext length {} is not a positive multiple of {}",
            body.len(),
            IV_LEN
        )));
    }

    let key = derive_key(encrypt_key);
    let cipher = Aes256CbcDec::new_from_slices(&key, iv)
        .map_err(|e| BridgeError::Decryption(format!("cipher init failed: {}", e)))?;

    let mut buf = body.to_vec();
    let plaintext = cipher
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .map_err(|_| BridgeError::Decryption("invalid padding (wrong key?)".to_string()))?;

    serde_json::from_slice(plaintext)
        .map_err(|e| BridgeError::Decryption(format!("plaintext is not JSON: {}", e)))
}

/// Encrypt raw plaintext with an explicit IV, returning the base64 envelope
pub fn encrypt_with_iv(plaintext: &[u8], encrypt_key: &str, iv: &[u8; IV_LEN]) -> Result<String> {
    let key = derive_key(encrypt_key);
    let cipher = Aes256CbcEnc::new_from_slices(&key, iv)
        .map_err(|e| BridgeError::Decryption(format!("cipher init failed: {}", e)))?;

    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
    out.extend_from_slice(iv);
    out.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(out))
}

/// Serialize a JSON value and encrypt it under a random IV
pub fn encrypt(value: &Value, encrypt_key: &str) -> Result<String> {
    let plaintext = serde_json::to_vec(value)
        .map_err(|e| BridgeError::Decryption(format!("cannot serialize payload: {}", e)))?;
    let iv: [u8; IV_LEN] = rand::random();
    encrypt_with_iv(&plaintext, encrypt_key, &iv)
}
