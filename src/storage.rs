//! Persisted state layout (spec.md §6).
//!
//! This module owns only the file-layout contract for four on-disk
//! locations under a configurable `storage_root`:
//!
//! - `<root>/feedback/<id>.json` — adaptation feedback entries
//! - `<root>/rules.json` — adaptation rules
//! - `<root>/adaptation_history.json` — append-only adaptation log
//! - `<root>/memory/<memory_type>/<id>.json` — memory items
//!
//! Per spec.md §9's open-question resolution, the adaptation engine itself
//! (rule evaluation, auto-triggered rules) is out of scope: this module only
//! reads the first three paths if present, and never writes them. The
//! memory layout is the one path the core writes to, via [`FileMemoryStore`]
//! — the fire-and-forget handoff target for [`crate::conversation`] session
//! teardown (spec.md §4.D).
//!
//! A missing or corrupt file is logged and skipped, never a hard error —
//! "the system starts empty" per spec.md §6.

use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Kind of long-term memory item, partitioning the `memory/` directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Episodic,
    Semantic,
    Procedural,
    Working,
    Interaction,
}

impl MemoryType {
    fn dir_name(self) -> &'static str {
        match self {
            MemoryType::Episodic => "episodic",
            MemoryType::Semantic => "semantic",
            MemoryType::Procedural => "procedural",
            MemoryType::Working => "working",
            MemoryType::Interaction => "interaction",
        }
    }
}

/// One persisted memory item, written as `<root>/memory/<type>/<id>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub memory_type: MemoryType,
    pub content: String,
    pub source_id: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Fire-and-forget long-term memory handoff, per spec.md §4.D: "the handoff
/// is fire-and-forget and MUST NOT block session teardown." Callers should
/// `tokio::spawn` the call rather than await it inline during teardown.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn store_memory(&self, content: &str, memory_type: MemoryType, metadata: serde_json::Value) -> Result<()>;
}

/// A [`MemoryStore`] that degrades to doing nothing. The default when no
/// concrete store is configured — matches spec.md §6: "absence of the store
/// degrades gracefully."
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMemoryStore;

#[async_trait]
impl MemoryStore for NullMemoryStore {
    async fn store_memory(&self, _content: &str, _memory_type: MemoryType, _metadata: serde_json::Value) -> Result<()> {
        Ok(())
    }
}

/// Concrete [`MemoryStore`] writing one JSON file per item under
/// `<root>/memory/<memory_type>/<id>.json`, grounded in
/// `memory_system.py::_persist_memory`'s file-per-item, type-partitioned
/// layout.
pub struct FileMemoryStore {
    root: PathBuf,
}

impl FileMemoryStore {
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            root: storage_root.into(),
        }
    }

    fn memory_dir(&self, memory_type: MemoryType) -> PathBuf {
        self.root.join("memory").join(memory_type.dir_name())
    }
}

#[async_trait]
impl MemoryStore for FileMemoryStore {
    async fn store_memory(&self, content: &str, memory_type: MemoryType, metadata: serde_json::Value) -> Result<()> {
        let item = MemoryItem {
            id: Uuid::new_v4().to_string(),
            memory_type,
            content: content.to_string(),
            source_id: None,
            metadata,
            created_at: Utc::now(),
        };

        let dir = self.memory_dir(memory_type);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{}.json", item.id));
        let json = serde_json::to_string_pretty(&item)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

/// A single applied adaptation, read from `<root>/adaptation_history.json`
/// if present. The core never writes this file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationRecord {
    pub id: String,
    pub description: String,
    pub applied_at: DateTime<Utc>,
}

/// Read `<root>/adaptation_history.json`. Returns an empty list (logging a
/// warning) if the file is missing or fails to parse — per spec.md §6, a
/// missing or corrupt file is never a hard error.
pub async fn read_adaptation_history(storage_root: &Path) -> Vec<AdaptationRecord> {
    read_json_or_empty(&storage_root.join("adaptation_history.json")).await
}

/// Read `<root>/rules.json`. Same missing/corrupt-file handling as
/// [`read_adaptation_history`].
pub async fn read_rules(storage_root: &Path) -> Vec<serde_json::Value> {
    read_json_or_empty(&storage_root.join("rules.json")).await
}

/// Read one feedback entry from `<root>/feedback/<id>.json`. Returns `None`
/// (logging a warning) if the file is missing or fails to parse.
pub async fn read_feedback_entry(storage_root: &Path, id: &str) -> Option<serde_json::Value> {
    let path = storage_root.join("feedback").join(format!("{id}.json"));
    match tokio::fs::read_to_string(&path).await {
        Ok(text) => match serde_json::from_str(&text) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "corrupt feedback entry, skipping");
                None
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to read feedback entry, skipping");
            None
        }
    }
}

async fn read_json_or_empty<T: for<'de> Deserialize<'de>>(path: &Path) -> Vec<T> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "corrupt state file, starting empty");
                Vec::new()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to read state file, starting empty");
            Vec::new()
        }
    }
}
