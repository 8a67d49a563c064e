//! `status` and `clear`: inspect or reset the stored dismissal counter.

use std::path::Path;

use popup_core::{DismissalTracker, EngineOptions, FileStore, KeyValueStore, StorageConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub dismissals: u32,
    pub threshold: u32,
    pub popups_allowed: bool,
}

fn open(storage: Option<&Path>) -> FileStore {
    match storage {
        Some(path) => FileStore::open_path(path),
        None => FileStore::open(&StorageConfig::default()),
    }
}

pub fn status(storage: Option<&Path>, options: &EngineOptions) -> Status {
    let tracker = DismissalTracker::with_key(
        open(storage),
        &options.storage_key,
        options.dismissal_threshold,
    );
    Status {
        dismissals: tracker.current_count(),
        threshold: tracker.threshold(),
        popups_allowed: tracker.popups_allowed(),
    }
}

/// Removes the dismissal key. Other keys in the file are left alone.
pub fn clear(storage: Option<&Path>, options: &EngineOptions) -> Result<(), String> {
    let mut store = open(storage);
    store
        .remove(&options.storage_key)
        .map_err(|err| format!("Failed to clear {}: {}", store.path().display(), err))?;
    tracing::info!(path = %store.path().display(), "Dismissal count cleared");
    Ok(())
}
