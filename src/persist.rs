//! Durable key-value storage.
//!
//! The movie snapshot and the user's filter criteria each live under their own key. `FileStore`
//! keeps one JSON document per key and replaces it atomically, so a reader after a restart sees
//! either the previous document or the new one, never a torn write.

use chrono::Datelike;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::error::{CatalogError, CatalogResult};
use crate::models::{is_four_digit_year, FilterCriteria};

pub const CRITERIA_KEY: &str = "filter_criteria";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> CatalogResult<Option<String>>;
    fn put(&self, key: &str, value: &str) -> CatalogResult<()>;
}

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> CatalogResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(CatalogError::persistence(format!("invalid key '{key}'")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> CatalogResult<Option<String>> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CatalogError::persistence(format!(
                "reading {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn put(&self, key: &str, value: &str) -> CatalogResult<()> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path)
            .map_err(|e| CatalogError::persistence(format!("replacing {}: {}", path.display(), e)))?;
        debug!(key, bytes = value.len(), "Persisted value");
        Ok(())
    }
}

/// In-process store; contents vanish with the value.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> CatalogResult<Option<String>> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> CatalogResult<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// The single authoritative writer of the persisted filter criteria.
#[derive(Clone)]
pub struct Preferences {
    kv: Arc<dyn KeyValueStore>,
}

impl Preferences {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Loads the saved criteria; the first load seeds the release year with the current year.
    ///
    /// A read failure is returned as-is and nothing is written back.
    pub fn load_criteria(&self) -> CatalogResult<FilterCriteria> {
        let stored = match self.kv.get(CRITERIA_KEY)? {
            Some(text) => match serde_json::from_str::<FilterCriteria>(&text) {
                Ok(c) => Some(c),
                Err(e) => {
                    warn!("Ignoring unreadable saved criteria: {}", e);
                    None
                }
            },
            None => None,
        };

        let mut criteria = stored.unwrap_or_default();
        if seed_release_year(&mut criteria, chrono::Local::now().year()) {
            info!("Defaulting release year to {}", criteria.release_year);
            if let Err(e) = self.save_criteria(&criteria) {
                warn!("Failed to persist seeded release year: {}", e);
            }
        }
        Ok(criteria)
    }

    pub fn save_criteria(&self, criteria: &FilterCriteria) -> CatalogResult<()> {
        let text = serde_json::to_string(criteria).map_err(CatalogError::persistence)?;
        self.kv.put(CRITERIA_KEY, &text)
    }
}

fn seed_release_year(criteria: &mut FilterCriteria, current_year: i32) -> bool {
    if is_four_digit_year(&criteria.release_year) {
        return false;
    }
    criteria.release_year = current_year.to_string();
    true
}
