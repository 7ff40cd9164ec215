//! Helper functions for integration tests

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use metrics_relay::service::MetricService;
use metrics_relay::storage::memory::MemoryBackend;
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::pkcs8::EncodePublicKey;
use rsa::{RsaPrivateKey, RsaPublicKey};

pub fn memory_service() -> Arc<MetricService> {
    Arc::new(MetricService::new(Arc::new(MemoryBackend::new())))
}

/// One 1024-bit key pair shared by every test in the binary
pub fn key_pair() -> &'static (RsaPublicKey, RsaPrivateKey) {
    static KEYS: OnceLock<(RsaPublicKey, RsaPrivateKey)> = OnceLock::new();
    KEYS.get_or_init(|| {
        let private = RsaPrivateKey::new(&mut rsa::rand_core::OsRng, 1024).unwrap();
        (RsaPublicKey::from(&private), private)
    })
}

/// Write the shared key pair as PEM files, returning (public, private)
pub fn write_key_files(dir: &Path) -> (PathBuf, PathBuf) {
    let (public, private) = key_pair();

    let public_path = dir.join("public.pem");
    let private_path = dir.join("private.pem");
    std::fs::write(
        &public_path,
        public.to_public_key_pem(LineEnding::LF).unwrap(),
    )
    .unwrap();
    std::fs::write(
        &private_path,
        private.to_pkcs1_pem(LineEnding::LF).unwrap().as_bytes(),
    )
    .unwrap();

    (public_path, private_path)
}
