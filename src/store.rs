//! Durable feed state, keyed by feed identifier.
//!
//! A store is handed around as `Arc<dyn FeedStore>`; every cache built on
//! the same handle sees the same state.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::NewsConfig;
use crate::entry::Entry;

/// Everything persisted for one feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedRecord {
    /// Append log; may hold duplicates and expired entries until pruned.
    #[serde(default)]
    pub entries: Vec<Entry>,
    #[serde(default)]
    pub last_fetch: Option<DateTime<Utc>>,
}

pub trait FeedStore: Send + Sync {
    /// Unknown feeds read as an empty record.
    fn load(&self, feed: &str) -> Result<FeedRecord>;
    fn save(&self, feed: &str, record: &FeedRecord) -> Result<()>;
    fn remove(&self, feed: &str) -> Result<()>;
}

/// Process-lifetime store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, FeedRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, FeedRecord>>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("memory store mutex poisoned"))
    }
}

impl FeedStore for MemoryStore {
    fn load(&self, feed: &str) -> Result<FeedRecord> {
        Ok(self.lock()?.get(feed).cloned().unwrap_or_default())
    }

    fn save(&self, feed: &str, record: &FeedRecord) -> Result<()> {
        self.lock()?.insert(feed.to_string(), record.clone());
        Ok(())
    }

    fn remove(&self, feed: &str) -> Result<()> {
        self.lock()?.remove(feed);
        Ok(())
    }
}

/// Single JSON document mapping feed key -> record. Survives restarts.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles on the file.
    io: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, FeedRecord>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("reading feed state from {}", self.path.display()))
            }
        };
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("parsing feed state in {}", self.path.display()))
    }

    fn write_all(&self, all: &BTreeMap<String, FeedRecord>) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating state dir {}", dir.display()))?;
        }
        let bytes = serde_json::to_vec_pretty(all).context("serializing feed state")?;
        fs::write(&self.path, bytes)
            .with_context(|| format!("writing feed state to {}", self.path.display()))
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.io
            .lock()
            .map_err(|_| anyhow!("feed state file mutex poisoned"))
    }
}

impl FeedStore for JsonFileStore {
    fn load(&self, feed: &str) -> Result<FeedRecord> {
        let _g = self.guard()?;
        Ok(self.read_all()?.remove(feed).unwrap_or_default())
    }

    fn save(&self, feed: &str, record: &FeedRecord) -> Result<()> {
        let _g = self.guard()?;
        let mut all = self.read_all()?;
        all.insert(feed.to_string(), record.clone());
        self.write_all(&all)
    }

    fn remove(&self, feed: &str) -> Result<()> {
        let _g = self.guard()?;
        let mut all = self.read_all()?;
        if all.remove(feed).is_some() {
            self.write_all(&all)?;
        }
        Ok(())
    }
}

/// File-backed store when `state_path` is configured, in-memory otherwise.
pub fn from_config(cfg: &NewsConfig) -> Arc<dyn FeedStore> {
    match &cfg.state_path {
        Some(p) => Arc::new(JsonFileStore::new(p.clone())),
        None => Arc::new(MemoryStore::new()),
    }
}
