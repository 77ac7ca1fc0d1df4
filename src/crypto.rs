//! Provider token sealing with AES-256-GCM.
//!
//! Tokens are stored as `version || nonce || ciphertext+tag`. The AAD binds a
//! sealed token to the provider it was issued for, so copying a ciphertext to
//! another provider row makes it undecryptable.

#![allow(deprecated)]

use std::fmt;

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

const VERSION_SEALED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_SEALED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("decrypted token is not valid UTF-8")]
    InvalidUtf8,
}

/// 256-bit key, wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CryptoKey(Vec<u8>);

impl CryptoKey {
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength(bytes.len()));
        }
        Ok(CryptoKey(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for CryptoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CryptoKey([REDACTED])")
    }
}

/// A provider access token in plaintext. Never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(token: impl Into<String>) -> Self {
        SecretToken(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken([REDACTED])")
    }
}

pub fn encrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_SEALED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

pub fn decrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    sealed: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if !is_sealed_payload(sealed) {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&sealed[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let body = &sealed[VERSION_FIELD_LEN + NONCE_LEN..];
    debug_assert!(body.len() >= TAG_LEN);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .decrypt(nonce, Payload { msg: body, aad })
        .map_err(|_| CryptoError::DecryptionFailed)
}

pub fn is_sealed_payload(payload: &[u8]) -> bool {
    payload.len() >= MIN_SEALED_LEN && payload[0] == VERSION_SEALED
}

fn provider_aad(kind: &str, name: &str) -> String {
    format!("provider|{kind}|{name}")
}

/// Seal a provider token for storage in `providers.token_ciphertext`.
pub fn seal_token(
    key: &CryptoKey,
    kind: &str,
    name: &str,
    token: &SecretToken,
) -> Result<Vec<u8>, CryptoError> {
    encrypt_bytes(
        key,
        provider_aad(kind, name).as_bytes(),
        token.expose().as_bytes(),
    )
}

pub fn open_token(
    key: &CryptoKey,
    kind: &str,
    name: &str,
    sealed: &[u8],
) -> Result<SecretToken, CryptoError> {
    let mut bytes = decrypt_bytes(key, provider_aad(kind, name).as_bytes(), sealed)?;
    let token = match std::str::from_utf8(&bytes) {
        Ok(text) => SecretToken::new(text),
        Err(_) => {
            bytes.zeroize();
            return Err(CryptoError::InvalidUtf8);
        }
    };
    bytes.zeroize();
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> CryptoKey {
        CryptoKey::new(vec![7u8; 32]).expect("valid test key")
    }

    #[test]
    fn sealed_token_opens_for_same_provider() {
        let key = test_key();
        let token = SecretToken::new("ghp_secret");
        let sealed = seal_token(&key, "github", "work", &token).unwrap();

        assert!(is_sealed_payload(&sealed));
        assert!(!sealed.windows(10).any(|w| w == b"ghp_secret"));
        let opened = open_token(&key, "github", "work", &sealed).unwrap();
        assert_eq!(opened, token);
    }

    #[test]
    fn sealed_token_is_bound_to_provider() {
        let key = test_key();
        let sealed = seal_token(&key, "github", "work", &SecretToken::new("t1")).unwrap();

        assert!(matches!(
            open_token(&key, "github", "personal", &sealed),
            Err(CryptoError::DecryptionFailed)
        ));
        assert!(open_token(&key, "gitlab", "work", &sealed).is_err());
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let key = test_key();
        let mut sealed = encrypt_bytes(&key, b"aad", b"secret message").unwrap();
        sealed[13] ^= 0x01;
        assert!(decrypt_bytes(&key, b"aad", &sealed).is_err());
    }

    #[test]
    fn nonces_differ_between_seals() {
        let key = test_key();
        let a = encrypt_bytes(&key, b"aad", b"same").unwrap();
        let b = encrypt_bytes(&key, b"aad", b"same").unwrap();
        assert_ne!(&a[1..13], &b[1..13]);
    }

    #[test]
    fn unversioned_or_short_payloads_are_invalid() {
        let key = test_key();
        assert!(matches!(
            decrypt_bytes(&key, b"aad", b"plaintext-token-that-is-long-enough"),
            Err(CryptoError::InvalidFormat)
        ));
        assert!(matches!(
            decrypt_bytes(&key, b"aad", &[VERSION_SEALED, 0x02]),
            Err(CryptoError::InvalidFormat)
        ));
    }

    #[test]
    fn key_length_is_enforced() {
        assert!(matches!(
            CryptoKey::new(vec![0u8; 16]),
            Err(CryptoError::InvalidKeyLength(16))
        ));
        assert!(CryptoKey::new(vec![0u8; 64]).is_err());
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let token = SecretToken::new("glpat-abc");
        assert_eq!(format!("{token:?}"), "SecretToken([REDACTED])");
        assert_eq!(format!("{:?}", test_key()), "CryptoKey([REDACTED])");
    }
}
