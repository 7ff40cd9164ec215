//! Chunked RSA-OAEP (SHA-256) payload encryption
//!
//! A single OAEP operation can only carry `key_size - 2 * 32 - 2` bytes, so
//! payloads are split into chunks of that size, each encrypted on its own.
//! Every ciphertext block is exactly `key_size` bytes, which is how the
//! receiving side splits the concatenation again.

use std::path::Path;

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::rand_core::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use super::CodecError;

/// SHA-256 output length
const HASH_SIZE: usize = 32;

/// Largest plaintext chunk one OAEP operation accepts for a key of `key_size` bytes
pub fn chunk_size(key_size: usize) -> usize {
    key_size.saturating_sub(2 * HASH_SIZE + 2)
}

fn read_pem(path: &Path) -> Result<String, CodecError> {
    std::fs::read_to_string(path).map_err(|e| CodecError::KeyFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Agent side: encrypts with the hub's public key
#[derive(Debug, Clone)]
pub struct Encryptor {
    key: RsaPublicKey,
}

impl Encryptor {
    pub fn new(key: RsaPublicKey) -> Self {
        Self { key }
    }

    /// Parse an SPKI (`BEGIN PUBLIC KEY`) or PKCS#1 (`BEGIN RSA PUBLIC KEY`) PEM
    pub fn from_pem(pem: &str) -> Result<Self, CodecError> {
        RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map(Self::new)
            .map_err(|e| CodecError::InvalidPem(e.to_string()))
    }

    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, CodecError> {
        Self::from_pem(&read_pem(path.as_ref())?)
    }

    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let key_size = self.key.size();
        let chunk = chunk_size(key_size);
        if chunk == 0 {
            return Err(CodecError::Encryption(format!(
                "key of {} bytes is too small for OAEP-SHA256",
                key_size
            )));
        }

        let mut rng = OsRng;
        let mut out = Vec::with_capacity(data.len().div_ceil(chunk) * key_size);
        for block in data.chunks(chunk) {
            let encrypted = self
                .key
                .encrypt(&mut rng, Oaep::new::<Sha256>(), block)
                .map_err(|e| CodecError::Encryption(e.to_string()))?;
            out.extend_from_slice(&encrypted);
        }

        Ok(out)
    }
}

/// Hub side: decrypts with the private key
#[derive(Debug, Clone)]
pub struct Decryptor {
    key: RsaPrivateKey,
}

impl Decryptor {
    pub fn new(key: RsaPrivateKey) -> Self {
        Self { key }
    }

    /// Parse a PKCS#1 (`BEGIN RSA PRIVATE KEY`) or PKCS#8 (`BEGIN PRIVATE KEY`) PEM
    pub fn from_pem(pem: &str) -> Result<Self, CodecError> {
        RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map(Self::new)
            .map_err(|e| CodecError::InvalidPem(e.to_string()))
    }

    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, CodecError> {
        Self::from_pem(&read_pem(path.as_ref())?)
    }

    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let key_size = self.key.size();
        if data.len() % key_size != 0 {
            return Err(CodecError::CiphertextLength {
                len: data.len(),
                block: key_size,
            });
        }

        let mut out = Vec::with_capacity(data.len());
        for block in data.chunks(key_size) {
            let decrypted = self
                .key
                .decrypt(Oaep::new::<Sha256>(), block)
                .map_err(|e| CodecError::Decryption(e.to_string()))?;
            out.extend_from_slice(&decrypted);
        }

        Ok(out)
    }
}

/// Process-wide 1024-bit key pair; generating one per test is too slow
#[cfg(test)]
pub(crate) fn test_keys() -> &'static (RsaPublicKey, RsaPrivateKey) {
    use std::sync::OnceLock;

    static KEYS: OnceLock<(RsaPublicKey, RsaPrivateKey)> = OnceLock::new();
    KEYS.get_or_init(|| {
        let private = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        (RsaPublicKey::from(&private), private)
    })
}
