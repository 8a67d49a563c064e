//! Per-browser key-value storage.
//!
//! The engine persists exactly one value (the dismissal counter), but it does
//! so through the [`KeyValueStore`] seam so the host decides where bytes live:
//!
//! - [`MemoryStore`]: tests and hosts with their own persistence.
//! - [`FileStore`]: a JSON object on disk, the native stand-in for
//!   `localStorage`. Path resolved by [`StorageConfig`].
//!
//! ## Design Principles
//!
//! - **Graceful degradation**: missing or corrupt files read as empty.
//! - **Atomic writes**: temp file + rename, so a crash never leaves half a file.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use fs_err as fs;
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::{EngineError, Result};

/// String key-value storage with `localStorage` semantics.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Paths
// ═══════════════════════════════════════════════════════════════════════════════

/// Where on-disk storage lives.
///
/// Production uses `StorageConfig::default()` (platform data dir).
/// Tests use `StorageConfig::with_root(temp_dir)`.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);
        Self {
            root: base.join("sales-popup"),
        }
    }
}

impl StorageConfig {
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to storage.json (the browser-storage equivalent).
    pub fn storage_file(&self) -> PathBuf {
        self.root.join("storage.json")
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-Memory Store
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a store, e.g. with a value left behind by a previous visit.
    pub fn with_entry(key: &str, value: &str) -> Self {
        let mut store = Self::new();
        store.entries.insert(key.to_string(), value.to_string());
        store
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// File Store
// ═══════════════════════════════════════════════════════════════════════════════

/// JSON-object file store. Entries are cached in memory; every write rewrites
/// the whole file atomically.
pub struct FileStore {
    entries: BTreeMap<String, String>,
    file_path: PathBuf,
}

impl FileStore {
    pub fn open(config: &StorageConfig) -> Self {
        Self::open_path(&config.storage_file())
    }

    /// Opens the store at `file_path`. Never fails: unreadable or corrupt
    /// content is logged and treated as an empty store.
    pub fn open_path(file_path: &Path) -> Self {
        let entries = match Self::read_entries(file_path) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, path = %file_path.display(), "Storage unreadable; starting empty");
                BTreeMap::new()
            }
        };

        FileStore {
            entries,
            file_path: file_path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn read_entries(file_path: &Path) -> Result<BTreeMap<String, String>> {
        let content = match fs::read_to_string(file_path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => {
                return Err(EngineError::Storage {
                    context: "reading storage file".to_string(),
                    source: err,
                })
            }
        };

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content).map_err(|source| EngineError::StorageMalformed {
            path: file_path.to_path_buf(),
            source,
        })
    }

    fn save(&self) -> Result<()> {
        let io_err = |context: &str| {
            let context = context.to_string();
            move |source: std::io::Error| EngineError::Storage { context, source }
        };

        let parent_dir = self.file_path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent_dir).map_err(io_err("creating storage dir"))?;

        let content = serde_json::to_string_pretty(&self.entries).map_err(|source| {
            EngineError::StorageMalformed {
                path: self.file_path.clone(),
                source,
            }
        })?;

        let mut temp_file =
            NamedTempFile::new_in(parent_dir).map_err(io_err("creating temp storage file"))?;
        temp_file
            .write_all(content.as_bytes())
            .map_err(io_err("writing temp storage file"))?;
        temp_file
            .flush()
            .map_err(io_err("flushing temp storage file"))?;
        temp_file
            .persist(&self.file_path)
            .map_err(|e| EngineError::Storage {
                context: "replacing storage file".to_string(),
                source: e.error,
            })?;

        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        self.save()
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.entries.remove(key).is_some() {
            self.save()?;
        }
        Ok(())
    }
}
