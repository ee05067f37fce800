//! Fixtures shared by the unit tests.

use shared_crypto::PrivateKey;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Gateway decryption key. Generated once per test binary.
pub fn gateway_key() -> &'static PrivateKey {
    static KEY: OnceLock<PrivateKey> = OnceLock::new();
    KEY.get_or_init(|| PrivateKey::generate(1024).unwrap())
}

/// Organization signing key. Generated once per test binary.
pub fn org_key() -> &'static PrivateKey {
    static KEY: OnceLock<PrivateKey> = OnceLock::new();
    KEY.get_or_init(|| PrivateKey::generate(1024).unwrap())
}

/// Write `key` as `<dir>/<name>.priv`.
pub fn write_private_key(dir: &Path, name: &str, key: &PrivateKey) -> PathBuf {
    let path = dir.join(format!("{name}.priv"));
    std::fs::write(&path, key.to_pkcs1_pem().unwrap().as_bytes()).unwrap();
    path
}

/// Write the public half of `key` as `<dir>/<name>.pub`.
pub fn write_public_key(dir: &Path, name: &str, key: &PrivateKey) -> PathBuf {
    let path = dir.join(format!("{name}.pub"));
    std::fs::write(&path, key.public_key().to_public_key_pem().unwrap()).unwrap();
    path
}
