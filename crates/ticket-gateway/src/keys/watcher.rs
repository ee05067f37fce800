//! # Key Directory Watcher
//!
//! `notify` delivers filesystem events on its own thread. The callback only
//! classifies them into [`KeyEvent`]s and forwards them over a channel; a
//! single tokio task owns all writes to the store.
//!
//! | Filesystem event | Key event |
//! |------------------|-----------|
//! | create | `Added` |
//! | delete, rename away | `Removed` |
//! | rename into the directory | `Added` |
//! | content modification | `Replaced` |
//!
//! Only the top level is watched. Keys in subdirectories are picked up by the
//! startup load and need a restart to change.

use super::registry::{key_name, KeyEvent, KeyLoadError, KeyMaterial, KeyStore};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Map one `notify` event onto key events for files with `extension`.
pub fn classify(event: &Event, extension: &str) -> Vec<KeyEvent> {
    let relevant = |path: &&std::path::PathBuf| key_name(path, extension).is_some();

    match &event.kind {
        EventKind::Create(_) => event
            .paths
            .iter()
            .filter(relevant)
            .map(|p| KeyEvent::Added(p.clone()))
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .iter()
            .filter(relevant)
            .map(|p| KeyEvent::Removed(p.clone()))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => event
            .paths
            .iter()
            .filter(relevant)
            .map(|p| KeyEvent::Removed(p.clone()))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event
            .paths
            .iter()
            .filter(relevant)
            .map(|p| KeyEvent::Added(p.clone()))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // paths = [from, to]
            let mut events = Vec::with_capacity(2);
            if let Some(from) = event.paths.first().filter(relevant) {
                events.push(KeyEvent::Removed(from.clone()));
            }
            if let Some(to) = event.paths.get(1).filter(relevant) {
                events.push(KeyEvent::Added(to.clone()));
            }
            events
        }
        // Unspecified renames and content changes: re-read, dropping the key
        // if the file is gone or unreadable.
        EventKind::Modify(ModifyKind::Name(_))
        | EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Any) => event
            .paths
            .iter()
            .filter(relevant)
            .map(|p| KeyEvent::Replaced(p.clone()))
            .collect(),
        _ => Vec::new(),
    }
}

/// A running directory watch. Dropping it stops the watch.
pub struct KeyWatcher {
    _watcher: RecommendedWatcher,
    writer: JoinHandle<()>,
}

impl KeyWatcher {
    /// Stop watching and wait for queued events to be applied.
    pub async fn stop(self) {
        let KeyWatcher { _watcher, writer } = self;
        drop(_watcher);
        if let Err(e) = writer.await {
            warn!(error = %e, "Key watcher task ended abnormally");
        }
    }
}

/// Keep `store` in sync with the key files in `dir`.
///
/// Must be called from within a tokio runtime.
pub fn watch<K: KeyMaterial>(store: Arc<KeyStore<K>>, dir: &Path) -> Result<KeyWatcher, KeyLoadError> {
    let (tx, mut rx) = mpsc::unbounded_channel::<KeyEvent>();
    let extension = store.extension();

    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        match result {
            Ok(event) => {
                for key_event in classify(&event, extension) {
                    // Receiver gone means the watcher is shutting down
                    let _ = tx.send(key_event);
                }
            }
            Err(e) => warn!(error = %e, "Key directory watch error"),
        }
    })
    .map_err(|e| KeyLoadError::Watch {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;

    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(|e| KeyLoadError::Watch {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            debug!(kind = K::KIND, ?event, "Key directory event");
            store.apply(&event);
        }
    });

    debug!(kind = K::KIND, dir = %dir.display(), "Watching key directory");
    Ok(KeyWatcher {
        _watcher: watcher,
        writer,
    })
}
