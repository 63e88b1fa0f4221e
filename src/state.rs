//! Durable wizard state.
//!
//! The wizard keeps two logical entries in a key-value store: the step pointer and the
//! serialized committed profile. They are written, read and cleared together so that a
//! reader never pairs a new step with a stale profile.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::profile::ProfileRecord;

/// Key holding the active step index
pub const STEP_KEY: &str = "wizard.step";
/// Key holding the serialized committed profile
pub const PROFILE_KEY: &str = "wizard.profile";

const STATE_FILE: &str = "wizard-state.json";

/// All entries of a store
pub type Entries = BTreeMap<String, String>;

/// Errors from the underlying key-value store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store contents are corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Errors from the persistence adapter
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("failed to serialize wizard state: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to write wizard state: {0}")]
    Store(#[from] StoreError),
}

/// A set of writes and removals flushed in one go
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    puts: Vec<(String, String)>,
    removes: Vec<String>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(mut self, key: &str, value: String) -> Self {
        self.puts.push((key.to_string(), value));
        self
    }

    pub fn remove(mut self, key: &str) -> Self {
        self.removes.push(key.to_string());
        self
    }

    fn apply_to(self, entries: &mut Entries) {
        for key in self.removes {
            entries.remove(&key);
        }
        entries.extend(self.puts);
    }
}

/// Synchronous key-value storage that survives restarts.
///
/// Each call holds the store for its whole duration and releases it on return; `apply` is
/// visible to readers either completely or not at all.
pub trait KeyValueStore: Send + Sync {
    /// Read a consistent view of every entry
    fn read_all(&self) -> Result<Entries, StoreError>;

    /// Apply a batch of writes as one flush
    fn apply(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

/// Store backed by one JSON document on disk, replaced atomically on every flush
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store at `{state}/wizard-state.json`
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.state_path().join(STATE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_unlocked(&self) -> Result<Entries, StoreError> {
        if !self.path.exists() {
            return Ok(Entries::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(Entries::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_unlocked(&self, entries: &Entries) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn read_all(&self) -> Result<Entries, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read_unlocked()
    }

    fn apply(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        // A corrupt document is replaced rather than blocking every future write
        let mut entries = self.read_unlocked().unwrap_or_else(|e| {
            warn!(path = %self.path.display(), "Discarding unreadable wizard state: {}", e);
            Entries::new()
        });
        batch.apply_to(&mut entries);
        self.write_unlocked(&entries)
    }
}

/// Process-local store, used for tests and for session-scoped data
#[derive(Default, Clone)]
pub struct MemoryStore {
    entries: Arc<Mutex<Entries>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a raw entry, bypassing the adapter
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }
}

impl KeyValueStore for MemoryStore {
    fn read_all(&self) -> Result<Entries, StoreError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn apply(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        batch.apply_to(&mut entries);
        Ok(())
    }
}

/// Step pointer and profile as read back from storage
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedWizard {
    pub step_index: usize,
    pub profile: ProfileRecord,
}

/// The only component that touches durable wizard storage
#[derive(Clone)]
pub struct PersistenceAdapter {
    store: Arc<dyn KeyValueStore>,
}

impl PersistenceAdapter {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Adapter over the on-disk store in the configured state directory
    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(FileStore::from_config(config)))
    }

    /// Write step pointer and profile together. Nothing is written if serialization fails.
    pub fn save(&self, step_index: usize, profile: &ProfileRecord) -> Result<(), PersistenceError> {
        let step = serde_json::to_string(&step_index).map_err(PersistenceError::Serialize)?;
        let profile = serde_json::to_string(profile).map_err(PersistenceError::Serialize)?;

        self.store.apply(
            WriteBatch::new()
                .put(STEP_KEY, step)
                .put(PROFILE_KEY, profile),
        )?;

        debug!(step_index, "Persisted wizard state");
        Ok(())
    }

    /// Read step pointer and profile back.
    ///
    /// Fails soft: unreadable storage, a missing half of the pair or an undecodable value
    /// all read as "nothing persisted".
    pub fn load(&self) -> Option<PersistedWizard> {
        let entries = match self.store.read_all() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to read wizard state: {}", e);
                return None;
            }
        };

        let (step, profile) = match (entries.get(STEP_KEY), entries.get(PROFILE_KEY)) {
            (Some(step), Some(profile)) => (step, profile),
            (None, None) => return None,
            _ => {
                warn!("Wizard state is incomplete, ignoring it");
                return None;
            }
        };

        let step_index = match serde_json::from_str::<usize>(step) {
            Ok(index) => index,
            Err(e) => {
                warn!("Failed to decode persisted step pointer: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<ProfileRecord>(profile) {
            Ok(profile) => Some(PersistedWizard {
                step_index,
                profile,
            }),
            Err(e) => {
                warn!("Failed to decode persisted profile: {}", e);
                None
            }
        }
    }

    /// Remove both entries. Clearing an empty store is a no-op.
    pub fn clear(&self) -> Result<(), PersistenceError> {
        self.store
            .apply(WriteBatch::new().remove(STEP_KEY).remove(PROFILE_KEY))?;
        Ok(())
    }
}
