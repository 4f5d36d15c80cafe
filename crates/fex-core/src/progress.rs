use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::MediaId;

/// Locally durable record of in-progress work for one visit or transfer.
/// Created on first check-in, written through on every local transition,
/// deleted on successful completion or explicit abandonment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Visit or transfer identifier this record belongs to.
    pub key: String,
    pub completed: BTreeSet<String>,
    pub skipped: BTreeSet<String>,
    pub media: Vec<MediaId>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            completed: BTreeSet::new(),
            skipped: BTreeSet::new(),
            media: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// No progress recorded at all. Gates skip-whole-visit.
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty() && self.skipped.is_empty() && self.media.is_empty()
    }

    pub fn mark_completed(&mut self, activity: impl Into<String>) {
        let name = activity.into();
        self.skipped.remove(&name);
        self.completed.insert(name);
        self.updated_at = Utc::now();
    }

    pub fn mark_skipped(&mut self, activity: impl Into<String>) {
        let name = activity.into();
        self.skipped.insert(name);
        self.updated_at = Utc::now();
    }

    pub fn add_media(&mut self, media: MediaId) {
        if !self.media.contains(&media) {
            self.media.push(media);
        }
        self.updated_at = Utc::now();
    }
}

/// File-per-key store under a progress directory. One JSON file per
/// in-progress visit/transfer identifier; survives process restarts.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    dir: PathBuf,
}

impl ProgressStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at the default progress directory (~/.fex/progress).
    pub fn default_location() -> Self {
        Self::new(crate::dirs::progress_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Read the record for `key`. A missing file is `None`; an unreadable
    /// or corrupt file is reported and treated as absent so a bad cache
    /// never wedges the engine.
    pub fn load(&self, key: &str) -> anyhow::Result<Option<ProgressRecord>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        match serde_json::from_str::<ProgressRecord>(&data) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                eprintln!("warning: discarding corrupt progress record {:?}: {e}", path);
                Ok(None)
            }
        }
    }

    /// Write the record, creating the progress directory if needed.
    pub fn save(&self, record: &ProgressRecord) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(record)?;
        std::fs::write(self.path_for(&record.key), json)?;
        Ok(())
    }

    /// Remove the record for `key`. Returns whether a record existed.
    pub fn clear(&self, key: &str) -> anyhow::Result<bool> {
        let path = self.path_for(key);
        if path.exists() {
            std::fs::remove_file(&path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Keys of all records currently on disk.
    pub fn keys(&self) -> anyhow::Result<Vec<String>> {
        let mut keys = Vec::new();
        if !self.dir.exists() {
            return Ok(keys);
        }
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}
