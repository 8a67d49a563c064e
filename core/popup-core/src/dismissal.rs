//! Dismissal throttling.
//!
//! A per-browser counter of explicit popup closes. Once it reaches the
//! threshold, popups stop for that browser. The counter only ever goes up;
//! clearing it is the browser's business, not ours.

use tracing::{debug, warn};

use crate::config::{DISMISSAL_STORAGE_KEY, DISMISSAL_THRESHOLD};
use crate::error::EngineError;
use crate::storage::KeyValueStore;

pub struct DismissalTracker<K> {
    store: K,
    key: String,
    threshold: u32,
}

impl<K: KeyValueStore> DismissalTracker<K> {
    pub fn new(store: K) -> Self {
        Self::with_key(store, DISMISSAL_STORAGE_KEY, DISMISSAL_THRESHOLD)
    }

    pub fn with_key(store: K, key: &str, threshold: u32) -> Self {
        Self {
            store,
            key: key.to_string(),
            threshold,
        }
    }

    /// Persisted count. Absent reads as 0, and so does anything that is not
    /// a non-negative integer.
    pub fn current_count(&self) -> u32 {
        match parse_count(self.store.get(&self.key)) {
            Ok(count) => count,
            Err(err) => {
                debug!(error = %err, "Treating stored dismissal count as 0");
                0
            }
        }
    }

    /// Increments and persists the counter, returning the new value.
    ///
    /// A failed write is logged; the returned value is still the incremented
    /// one so the current page view honors the dismissal.
    pub fn record_dismissal(&mut self) -> u32 {
        let next = self.current_count().saturating_add(1);
        if let Err(err) = self.store.set(&self.key, &next.to_string()) {
            warn!(error = %err, count = next, "Failed to persist dismissal count");
        }
        next
    }

    pub fn popups_allowed(&self) -> bool {
        self.current_count() < self.threshold
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn store(&self) -> &K {
        &self.store
    }

    pub fn into_store(self) -> K {
        self.store
    }
}

fn parse_count(raw: Option<String>) -> Result<u32, EngineError> {
    let Some(raw) = raw else {
        return Ok(0);
    };
    raw.trim()
        .parse::<u32>()
        .map_err(|_| EngineError::StorageCorrupt { raw })
}
