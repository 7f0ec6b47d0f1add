use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::Context;
use attendance_core::{KeyValueStore, StoreError};
use fs2::FileExt;

type Entries = BTreeMap<String, String>;

/// Persistent key/value store backed by one JSON object on disk, shared by
/// every process pointed at the same state directory.
///
/// Nothing is cached: each read loads the file under a shared lock, and each
/// mutation is a load-modify-save of one key under an exclusive lock on a
/// sibling `.lock` file. Saves go through a temporary sibling and a rename,
/// so a crash never leaves a half-written store behind.
pub struct JsonFileStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`. An existing file must parse.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let store = Self {
            lock_path: path.with_extension("json.lock"),
            path,
        };

        let entries = store
            .load()
            .with_context(|| format!("failed to load store {}", store.path.display()))?;
        log::debug!("Opened store {} ({} keys)", store.path.display(), entries.len());
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> anyhow::Result<Entries> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(Entries::new()),
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("corrupt store file {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Entries::new()),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", self.path.display())),
        }
    }

    fn save(&self, entries: &Entries) -> anyhow::Result<()> {
        let raw = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw).with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))
    }

    fn lock(&self, exclusive: bool) -> anyhow::Result<File> {
        if let Some(parent) = self.lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .with_context(|| format!("failed to open store lock {}", self.lock_path.display()))?;
        if exclusive {
            FileExt::lock_exclusive(&lock_file)
        } else {
            FileExt::lock_shared(&lock_file)
        }
        .with_context(|| format!("failed to lock store {}", self.lock_path.display()))?;
        Ok(lock_file)
    }

    /// Apply one change to the current on-disk state. The file is only
    /// rewritten when `change` reports that it modified the map.
    fn update(&self, key: &str, change: impl FnOnce(&mut Entries) -> bool) -> Result<(), StoreError> {
        let result = (|| -> anyhow::Result<()> {
            let lock_file = self.lock(true)?;
            let mut entries = self.load()?;
            if change(&mut entries) {
                self.save(&entries)?;
            }
            drop(lock_file);
            Ok(())
        })();

        result.map_err(|e| StoreError::write(key, format!("{e:#}")))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        if !self.path.exists() {
            return None;
        }

        let read = self.lock(false).and_then(|lock_file| {
            let entries = self.load();
            drop(lock_file);
            entries
        });
        match read {
            Ok(mut entries) => entries.remove(key),
            Err(e) => {
                log::warn!("Treating {key} as absent: {e:#}");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.update(key, |entries| {
            entries.insert(key.to_string(), value.to_string()).as_deref() != Some(value)
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.update(key, |entries| entries.remove(key).is_some())
    }
}
