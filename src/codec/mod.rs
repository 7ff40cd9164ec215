//! Payload codecs shared by agent and hub
//!
//! The agent turns a batch into a request body in four steps, the hub undoes
//! them in reverse:
//!
//! ```text
//! agent: JSON ─► HMAC(JSON) header ─► chunked RSA-OAEP ─► gzip
//! hub:   gunzip ─► decrypt ─► verify HMAC(JSON) ─► parse
//! ```
//!
//! Signing and encryption are optional and enabled by configuration.

pub mod compression;
pub mod encryption;
pub mod signing;

use std::fmt;
use std::path::PathBuf;

use crate::Metric;

use self::encryption::Encryptor;

/// Errors raised while encoding or decoding payloads
#[derive(Debug)]
pub enum CodecError {
    /// Batch could not be (de)serialized
    Serialization(serde_json::Error),

    /// Shared secret rejected by the MAC implementation
    InvalidKey(String),

    /// Integrity header is not valid hex or does not match the payload
    IntegrityMismatch,

    /// Key file could not be read
    KeyFile { path: PathBuf, reason: String },

    /// Key material could not be parsed
    InvalidPem(String),

    /// RSA-OAEP encryption failed
    Encryption(String),

    /// RSA-OAEP decryption failed
    Decryption(String),

    /// Ciphertext is not a whole number of key-sized blocks
    CiphertextLength { len: usize, block: usize },

    /// gzip (de)compression failed
    Compression(std::io::Error),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Serialization(err) => write!(f, "failed to serialize payload: {}", err),
            CodecError::InvalidKey(msg) => write!(f, "invalid signing key: {}", msg),
            CodecError::IntegrityMismatch => write!(f, "invalid hash value"),
            CodecError::KeyFile { path, reason } => {
                write!(f, "failed to read key file {}: {}", path.display(), reason)
            }
            CodecError::InvalidPem(msg) => write!(f, "invalid key material: {}", msg),
            CodecError::Encryption(msg) => write!(f, "encryption failed: {}", msg),
            CodecError::Decryption(msg) => write!(f, "decryption failed: {}", msg),
            CodecError::CiphertextLength { len, block } => write!(
                f,
                "ciphertext length {} is not a multiple of the key size {}",
                len, block
            ),
            CodecError::Compression(err) => write!(f, "gzip error: {}", err),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::Serialization(err) => Some(err),
            CodecError::Compression(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        CodecError::Serialization(err)
    }
}

/// A request body ready for transmission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBatch {
    /// gzip-compressed (and possibly encrypted) body
    pub body: Vec<u8>,

    /// Hex HMAC-SHA256 of the JSON, when a shared secret is configured
    pub signature: Option<String>,
}

/// Agent-side encoder for metric batches
#[derive(Clone, Default)]
pub struct BatchEncoder {
    hash_key: Option<String>,
    encryptor: Option<Encryptor>,
}

impl BatchEncoder {
    pub fn new(hash_key: Option<String>, encryptor: Option<Encryptor>) -> Self {
        Self {
            hash_key: hash_key.filter(|key| !key.is_empty()),
            encryptor,
        }
    }

    pub fn signs(&self) -> bool {
        self.hash_key.is_some()
    }

    pub fn encrypts(&self) -> bool {
        self.encryptor.is_some()
    }

    /// Serialize, sign, encrypt and compress `batch`
    pub fn encode(&self, batch: &[Metric]) -> Result<EncodedBatch, CodecError> {
        let json = serde_json::to_vec(batch)?;

        let signature = match &self.hash_key {
            Some(key) => Some(signing::sign(key.as_bytes(), &json)?),
            None => None,
        };

        let payload = match &self.encryptor {
            Some(encryptor) => encryptor.encrypt(&json)?,
            None => json,
        };

        Ok(EncodedBatch {
            body: compression::compress(&payload)?,
            signature,
        })
    }
}
