//! HMAC-SHA256 payload signatures, hex encoded

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::CodecError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex signature of a request or response body
pub const HASH_HEADER: &str = "HashSHA256";

fn mac(key: &[u8]) -> Result<HmacSha256, CodecError> {
    HmacSha256::new_from_slice(key).map_err(|e| CodecError::InvalidKey(e.to_string()))
}

/// Hex encoded HMAC-SHA256 of `data`
pub fn sign(key: &[u8], data: &[u8]) -> Result<String, CodecError> {
    let mut mac = mac(key)?;
    mac.update(data);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check `signature` against `data` in constant time
pub fn verify(key: &[u8], data: &[u8], signature: &str) -> Result<(), CodecError> {
    let expected = hex::decode(signature.trim()).map_err(|_| CodecError::IntegrityMismatch)?;

    let mut mac = mac(key)?;
    mac.update(data);
    mac.verify_slice(&expected)
        .map_err(|_| CodecError::IntegrityMismatch)
}
