//! Key management: the registry and its directory watcher.

pub mod registry;
pub mod watcher;

pub use registry::{
    key_name, KeyEvent, KeyLoadError, KeyMaterial, KeyRegistry, KeyStore, PRIVATE_KEY_EXTENSION,
    PUBLIC_KEY_EXTENSION,
};
pub use watcher::{classify, watch, KeyWatcher};
