//! # Key Registry
//!
//! Two independent name -> key maps:
//!
//! - decryption keys (`.priv`, PKCS#1 PEM) by fingerprint
//! - verification keys (`.pub`, PKIX PEM) by signer id
//!
//! A key's name is its file name without directory and extension.
//!
//! ## Locking
//!
//! Each map has its own mutex. Files are read and parsed before the lock is
//! taken and keys are handed out as `Arc`s, so the lock only ever covers a
//! single map operation and never a cryptographic one.

use crate::domain::error::GatewayError;
use parking_lot::Mutex;
use shared_crypto::{CryptoError, PrivateKey, PublicKey};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// File extension of decryption keys.
pub const PRIVATE_KEY_EXTENSION: &str = "priv";

/// File extension of verification keys.
pub const PUBLIC_KEY_EXTENSION: &str = "pub";

/// Errors reading key files.
#[derive(Debug, thiserror::Error)]
pub enum KeyLoadError {
    /// Directory or file could not be read
    #[error("cannot read {}: {source}", path.display())]
    Io {
        /// Offending path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
    /// File is not a key of the expected encoding
    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        /// Offending path
        path: PathBuf,
        /// Underlying error
        source: CryptoError,
    },
    /// File name does not yield a key name
    #[error("{} is not a key file", .0.display())]
    NotAKeyFile(PathBuf),
    /// The directory watcher could not be started
    #[error("cannot watch {}: {reason}", path.display())]
    Watch {
        /// Watched directory
        path: PathBuf,
        /// Watcher error
        reason: String,
    },
}

/// Key types the registry can load from PEM.
pub trait KeyMaterial: Sized + Send + Sync + 'static {
    /// Human-readable kind, for logs.
    const KIND: &'static str;

    /// Parse one PEM document.
    fn from_pem(pem: &str) -> Result<Self, CryptoError>;
}

impl KeyMaterial for PrivateKey {
    const KIND: &'static str = "decryption";

    fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        PrivateKey::from_pkcs1_pem(pem)
    }
}

impl KeyMaterial for PublicKey {
    const KIND: &'static str = "verification";

    fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        PublicKey::from_public_key_pem(pem)
    }
}

/// Name a key file maps to, if it has the expected extension.
pub fn key_name(path: &Path, extension: &str) -> Option<String> {
    if path.extension() != Some(OsStr::new(extension)) {
        return None;
    }
    path.file_stem()
        .and_then(OsStr::to_str)
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
}

/// A filesystem change relevant to one key directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyEvent {
    /// A key file appeared
    Added(PathBuf),
    /// A key file disappeared
    Removed(PathBuf),
    /// A key file changed in place
    Replaced(PathBuf),
}

/// One name -> key map.
pub struct KeyStore<K> {
    extension: &'static str,
    keys: Mutex<HashMap<String, Arc<K>>>,
}

impl<K: KeyMaterial> KeyStore<K> {
    /// Create an empty store for files with `extension`.
    pub fn new(extension: &'static str) -> Self {
        Self {
            extension,
            keys: Mutex::new(HashMap::new()),
        }
    }

    /// Extension (without dot) of this store's key files.
    pub fn extension(&self) -> &'static str {
        self.extension
    }

    /// Look up a key.
    pub fn get(&self, name: &str) -> Option<Arc<K>> {
        self.keys.lock().get(name).cloned()
    }

    /// Register or replace a key.
    pub fn insert(&self, name: impl Into<String>, key: K) {
        self.keys.lock().insert(name.into(), Arc::new(key));
    }

    /// Drop a key. Returns whether it was present.
    pub fn remove(&self, name: &str) -> bool {
        self.keys.lock().remove(name).is_some()
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    /// True if no keys are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.keys.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Read and parse one key file without touching the map.
    pub fn read_key_file(&self, path: &Path) -> Result<(String, K), KeyLoadError> {
        let name = key_name(path, self.extension)
            .ok_or_else(|| KeyLoadError::NotAKeyFile(path.to_path_buf()))?;
        let pem = std::fs::read_to_string(path).map_err(|source| KeyLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let key = K::from_pem(&pem).map_err(|source| KeyLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok((name, key))
    }

    /// Read, parse and register one key file.
    pub fn load_file(&self, path: &Path) -> Result<String, KeyLoadError> {
        let (name, key) = self.read_key_file(path)?;
        self.insert(name.clone(), key);
        Ok(name)
    }

    /// Register every key file under `dir`, subdirectories included.
    ///
    /// Unreadable or malformed files are logged and skipped. Returns the
    /// number of keys registered.
    ///
    /// # Errors
    ///
    /// Only if `dir` itself is missing or not a directory.
    pub fn load_dir(&self, dir: &Path) -> Result<usize, KeyLoadError> {
        let metadata = std::fs::metadata(dir).map_err(|source| KeyLoadError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(KeyLoadError::Io {
                path: dir.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
            });
        }

        let mut loaded = 0;
        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_file() || key_name(path, self.extension).is_none() {
                continue;
            }
            match self.load_file(path) {
                Ok(name) => {
                    debug!(kind = K::KIND, key = %name, "Key loaded");
                    loaded += 1;
                }
                Err(e) => warn!(kind = K::KIND, error = %e, "Skipping key file"),
            }
        }

        info!(kind = K::KIND, dir = %dir.display(), count = loaded, "Keys loaded");
        Ok(loaded)
    }

    /// Apply a watcher event.
    ///
    /// `Replaced` re-reads the file and swaps the key in a single map
    /// operation; if the new contents do not parse, the stale key is dropped.
    pub fn apply(&self, event: &KeyEvent) {
        match event {
            KeyEvent::Added(path) => match self.load_file(path) {
                Ok(name) => info!(kind = K::KIND, key = %name, "Key added"),
                Err(e) => warn!(kind = K::KIND, error = %e, "Ignoring new key file"),
            },
            KeyEvent::Removed(path) => {
                if let Some(name) = key_name(path, self.extension) {
                    if self.remove(&name) {
                        info!(kind = K::KIND, key = %name, "Key removed");
                    }
                }
            }
            KeyEvent::Replaced(path) => {
                let Some(name) = key_name(path, self.extension) else {
                    return;
                };
                match self.read_key_file(path) {
                    Ok((_, key)) => {
                        self.insert(name.clone(), key);
                        info!(kind = K::KIND, key = %name, "Key replaced");
                    }
                    Err(e) => {
                        self.remove(&name);
                        warn!(kind = K::KIND, key = %name, error = %e, "Key removed, replacement unreadable");
                    }
                }
            }
        }
    }
}

/// Decryption and verification keys used by the request pipeline.
pub struct KeyRegistry {
    decryption: Arc<KeyStore<PrivateKey>>,
    verification: Arc<KeyStore<PublicKey>>,
}

impl Default for KeyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            decryption: Arc::new(KeyStore::new(PRIVATE_KEY_EXTENSION)),
            verification: Arc::new(KeyStore::new(PUBLIC_KEY_EXTENSION)),
        }
    }

    /// Load both key directories.
    pub fn load(&self, decryption_dir: &Path, verification_dir: &Path) -> Result<(), KeyLoadError> {
        self.decryption.load_dir(decryption_dir)?;
        self.verification.load_dir(verification_dir)?;
        Ok(())
    }

    /// Decryption key for an envelope fingerprint.
    pub fn decryption_key(&self, fingerprint: &str) -> Result<Arc<PrivateKey>, GatewayError> {
        self.decryption
            .get(fingerprint)
            .ok_or_else(|| GatewayError::DecryptionKeyUnknown(fingerprint.to_string()))
    }

    /// Verification key for a ticket signer.
    pub fn verification_key(&self, signer_id: &str) -> Result<Arc<PublicKey>, GatewayError> {
        self.verification
            .get(signer_id)
            .ok_or_else(|| GatewayError::VerificationKeyUnknown(signer_id.to_string()))
    }

    /// The decryption key map.
    pub fn decryption_keys(&self) -> &Arc<KeyStore<PrivateKey>> {
        &self.decryption
    }

    /// The verification key map.
    pub fn verification_keys(&self) -> &Arc<KeyStore<PublicKey>> {
        &self.verification
    }

    /// Number of decryption keys.
    pub fn decryption_key_count(&self) -> usize {
        self.decryption.len()
    }

    /// Number of verification keys.
    pub fn verification_key_count(&self) -> usize {
        self.verification.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{gateway_key, org_key, write_private_key, write_public_key};

    #[test]
    fn test_key_name() {
        assert_eq!(
            key_name(Path::new("/keys/abc123.priv"), "priv"),
            Some("abc123".to_string())
        );
        assert_eq!(key_name(Path::new("/keys/abc123.pub"), "priv"), None);
        assert_eq!(key_name(Path::new("/keys/README"), "priv"), None);
        assert_eq!(key_name(Path::new("/keys/.priv"), "priv"), None);
    }

    #[test]
    fn test_load_dir_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        write_private_key(dir.path(), "fp1", gateway_key());
        std::fs::write(dir.path().join("broken.priv"), "not a key").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = KeyStore::<PrivateKey>::new(PRIVATE_KEY_EXTENSION);
        assert_eq!(store.load_dir(dir.path()).unwrap(), 1);
        assert_eq!(store.names(), vec!["fp1".to_string()]);
    }

    #[test]
    fn test_load_dir_descends_into_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("partners").join("2026");
        std::fs::create_dir_all(&nested).unwrap();
        write_public_key(dir.path(), "acme", org_key());
        write_public_key(&nested, "initech", org_key());

        let store = KeyStore::<PublicKey>::new(PUBLIC_KEY_EXTENSION);
        assert_eq!(store.load_dir(dir.path()).unwrap(), 2);
        let mut names = store.names();
        names.sort();
        assert_eq!(names, vec!["acme".to_string(), "initech".to_string()]);
    }

    #[test]
    fn test_load_dir_rejects_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_public_key(dir.path(), "acme", org_key());
        let store = KeyStore::<PublicKey>::new(PUBLIC_KEY_EXTENSION);
        assert!(matches!(store.load_dir(&path), Err(KeyLoadError::Io { .. })));
    }

    #[test]
    fn test_load_dir_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::<PublicKey>::new(PUBLIC_KEY_EXTENSION);
        assert!(matches!(
            store.load_dir(&dir.path().join("absent")),
            Err(KeyLoadError::Io { .. })
        ));
    }

    #[test]
    fn test_public_key_file_in_private_store_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_public_key(dir.path(), "org", org_key());
        let path = dir.path().join("org.pub");
        std::fs::rename(&path, dir.path().join("org.priv")).unwrap();

        let store = KeyStore::<PrivateKey>::new(PRIVATE_KEY_EXTENSION);
        assert!(matches!(
            store.load_file(&dir.path().join("org.priv")),
            Err(KeyLoadError::Parse { .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_registry_lookup_errors() {
        let registry = KeyRegistry::new();
        assert_eq!(
            registry.decryption_key("fp").err(),
            Some(GatewayError::DecryptionKeyUnknown("fp".into()))
        );
        assert_eq!(
            registry.verification_key("acme").err(),
            Some(GatewayError::VerificationKeyUnknown("acme".into()))
        );

        registry
            .verification_keys()
            .insert("acme", org_key().public_key());
        assert!(registry.verification_key("acme").is_ok());
        assert_eq!(registry.verification_key_count(), 1);
        assert_eq!(registry.decryption_key_count(), 0);
    }

    #[test]
    fn test_apply_events() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::<PublicKey>::new(PUBLIC_KEY_EXTENSION);
        let path = write_public_key(dir.path(), "acme", org_key());

        store.apply(&KeyEvent::Added(path.clone()));
        assert!(store.get("acme").is_some());

        // Modified into garbage: stale key must not survive
        std::fs::write(&path, "garbage").unwrap();
        store.apply(&KeyEvent::Replaced(path.clone()));
        assert!(store.get("acme").is_none());

        // Modified back into a valid key
        write_public_key(dir.path(), "acme", org_key());
        store.apply(&KeyEvent::Replaced(path.clone()));
        assert!(store.get("acme").is_some());

        store.apply(&KeyEvent::Removed(path));
        assert!(store.is_empty());
    }

    #[test]
    fn test_lookup_survives_removal() {
        let store = KeyStore::<PublicKey>::new(PUBLIC_KEY_EXTENSION);
        store.insert("acme", org_key().public_key());

        let held = store.get("acme").unwrap();
        assert!(store.remove("acme"));
        assert!(!store.remove("acme"));
        // In-flight users keep their Arc
        assert!(held.to_public_key_pem().is_ok());
    }
}
