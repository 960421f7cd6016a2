// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Ciphers for tenant secrets stored by Fleet Manager.
//!
//! Fleet Manager keeps encrypted copies of a few tenant secrets (TLS material,
//! encryption keys) so that a tenant can be restored onto a fresh cluster. The
//! agent decrypts them with the cipher selected by `SECRET_ENCRYPTION_TYPE`.
//!
//! The local cipher uses AES-256-GCM; a ciphertext is the 12-byte nonce followed
//! by the sealed payload.

use crate::config::{Config, SecretEncryptionType};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::Rng;
use std::sync::Arc;
use thiserror::Error;

const NONCE_LEN: usize = 12;

/// Cipher failures.
#[derive(Error, Debug)]
pub enum CipherError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("ciphertext is too short")]
    Truncated,

    #[error("decryption failed: {0}")]
    Decrypt(String),

    #[error("encryption failed: {0}")]
    Encrypt(String),
}

/// Encrypts and decrypts secret payloads.
#[async_trait]
pub trait SecretCipher: Send + Sync {
    async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError>;

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError>;
}

/// AES-256-GCM with a locally configured key.
pub struct LocalAesGcm {
    cipher: Aes256Gcm,
}

impl LocalAesGcm {
    /// Build the cipher from a base64-encoded 32-byte key.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidKey`] when the key is not valid base64 or not
    /// 32 bytes long.
    pub fn from_base64_key(key: &str) -> Result<Self, CipherError> {
        let bytes = BASE64
            .decode(key.trim())
            .map_err(|e| CipherError::InvalidKey(e.to_string()))?;
        let cipher = Aes256Gcm::new_from_slice(&bytes)
            .map_err(|_| CipherError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len())))?;
        Ok(LocalAesGcm { cipher })
    }
}

#[async_trait]
impl SecretCipher for LocalAesGcm {
    async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill(&mut nonce);
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| CipherError::Encrypt(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        if ciphertext.len() <= NONCE_LEN {
            return Err(CipherError::Truncated);
        }
        let (nonce, sealed) = ciphertext.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|e| CipherError::Decrypt(e.to_string()))
    }
}

/// AWS KMS envelope.
pub struct KmsCipher {
    client: aws_sdk_kms::Client,
    key_id: String,
}

impl KmsCipher {
    #[must_use]
    pub fn new(client: aws_sdk_kms::Client, key_id: &str) -> Self {
        KmsCipher {
            client,
            key_id: key_id.to_string(),
        }
    }
}

#[async_trait]
impl SecretCipher for KmsCipher {
    async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let output = self
            .client
            .encrypt()
            .key_id(&self.key_id)
            .plaintext(aws_sdk_kms::primitives::Blob::new(plaintext))
            .send()
            .await
            .map_err(|e| CipherError::Encrypt(aws_sdk_kms::error::DisplayErrorContext(e).to_string()))?;
        output
            .ciphertext_blob()
            .map(|blob| blob.as_ref().to_vec())
            .ok_or_else(|| CipherError::Encrypt("KMS returned no ciphertext".into()))
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let output = self
            .client
            .decrypt()
            .key_id(&self.key_id)
            .ciphertext_blob(aws_sdk_kms::primitives::Blob::new(ciphertext))
            .send()
            .await
            .map_err(|e| CipherError::Decrypt(aws_sdk_kms::error::DisplayErrorContext(e).to_string()))?;
        output
            .plaintext()
            .map(|blob| blob.as_ref().to_vec())
            .ok_or_else(|| CipherError::Decrypt("KMS returned no plaintext".into()))
    }
}

/// Identity cipher. The transport encoding is already base64, so this leaves
/// secrets readable by anyone who can read the ciphertext.
pub struct Base64Cipher;

#[async_trait]
impl SecretCipher for Base64Cipher {
    async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        Ok(plaintext.to_vec())
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        Ok(ciphertext.to_vec())
    }
}

/// Decode the base64 transport encoding of a stored secret and decrypt it.
///
/// # Errors
///
/// Returns [`CipherError::Decrypt`] when the payload is not base64 or the cipher
/// rejects it.
pub async fn decrypt_encoded(
    cipher: &dyn SecretCipher,
    encoded: &str,
) -> Result<Vec<u8>, CipherError> {
    let ciphertext = BASE64
        .decode(encoded.trim())
        .map_err(|e| CipherError::Decrypt(format!("payload is not base64: {e}")))?;
    cipher.decrypt(&ciphertext).await
}

/// Build the cipher selected by the configuration.
///
/// # Errors
///
/// Returns [`CipherError::InvalidKey`] when the key settings are missing or invalid.
pub fn from_config(
    config: &Config,
    kms: Option<aws_sdk_kms::Client>,
) -> Result<Arc<dyn SecretCipher>, CipherError> {
    match config.secret_encryption_type {
        SecretEncryptionType::Local => {
            let key = config
                .secret_encryption_key
                .as_deref()
                .ok_or_else(|| CipherError::InvalidKey("SECRET_ENCRYPTION_KEY is not set".into()))?;
            Ok(Arc::new(LocalAesGcm::from_base64_key(key)?))
        }
        SecretEncryptionType::Kms => {
            let key_id = config.secret_encryption_key_id.as_deref().ok_or_else(|| {
                CipherError::InvalidKey("SECRET_ENCRYPTION_KEY_ID is not set".into())
            })?;
            let client =
                kms.ok_or_else(|| CipherError::InvalidKey("no KMS client configured".into()))?;
            Ok(Arc::new(KmsCipher::new(client, key_id)))
        }
        SecretEncryptionType::Base64 => Ok(Arc::new(Base64Cipher)),
    }
}

#[cfg(test)]
#[path = "cipher_tests.rs"]
mod cipher_tests;
