// SPDX-License-Identifier: MIT OR Apache-2.0
//! Encryption at rest for monitor auth material.
//!
//! A monitor's password (or OAuth refresh token) is stored as
//! `base64(nonce || ciphertext)` under AES-256-GCM, keyed by
//! `EMAIL_ENCRYPTION_KEY`. The key itself is never persisted; it only ever
//! lives in the process environment.

use aes_gcm::aead::{Aead, KeyInit, OsRng, RngCore};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use iv_error::{ErrorCode, IvError, IvResult};
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

/// Derive a 32-byte AES key from the configured `EMAIL_ENCRYPTION_KEY`.
/// A 64-character hex string is taken as raw key bytes; anything else is
/// hashed with SHA-256 so operators can use a plain passphrase.
#[must_use]
pub fn derive_key(raw: &str) -> [u8; 32] {
    if raw.len() == 64 && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
        let mut key = [0u8; 32];
        let mut valid = true;
        for (i, chunk) in key.iter_mut().enumerate() {
            match u8::from_str_radix(&raw[i * 2..i * 2 + 2], 16) {
                Ok(b) => *chunk = b,
                Err(_) => {
                    valid = false;
                    break;
                }
            }
        }
        if valid {
            return key;
        }
    }
    let digest = Sha256::digest(raw.as_bytes());
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    key
}

/// Encrypt `plaintext`, returning `base64(nonce || ciphertext)`.
pub fn encrypt(key: &[u8; 32], plaintext: &str) -> IvResult<String> {
    let cipher = Aes256Gcm::new(key.into());
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| IvError::new(ErrorCode::Internal, "failed to encrypt auth material"))?;

    let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(combined))
}

/// Decrypt a blob produced by [`encrypt`].
pub fn decrypt(key: &[u8; 32], encoded: &str) -> IvResult<String> {
    let combined = STANDARD.decode(encoded).map_err(|e| {
        IvError::new(ErrorCode::AuthFailed, "auth material is not valid base64").with_source(e)
    })?;
    if combined.len() < NONCE_LEN {
        return Err(IvError::new(
            ErrorCode::AuthFailed,
            "auth material is too short to contain a nonce",
        ));
    }
    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(key.into());
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| IvError::new(ErrorCode::AuthFailed, "failed to decrypt auth material"))?;
    String::from_utf8(plaintext).map_err(|e| {
        IvError::new(ErrorCode::AuthFailed, "decrypted auth material is not utf-8").with_source(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encrypt_and_decrypt() {
        let key = derive_key("a passphrase, not a hex key");
        let ciphertext = encrypt(&key, "hunter2").unwrap();
        assert_ne!(ciphertext, "hunter2");
        assert_eq!(decrypt(&key, &ciphertext).unwrap(), "hunter2");
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let key_a = derive_key("key-a");
        let key_b = derive_key("key-b");
        let ciphertext = encrypt(&key_a, "secret").unwrap();
        assert!(decrypt(&key_b, &ciphertext).is_err());
    }

    #[test]
    fn hex_key_is_used_as_raw_bytes() {
        let hex = "00".repeat(32);
        let key = derive_key(&hex);
        assert_eq!(key, [0u8; 32]);
    }

    #[test]
    fn truncated_ciphertext_is_rejected() {
        let key = derive_key("k");
        assert!(decrypt(&key, "YQ==").is_err());
    }
}
