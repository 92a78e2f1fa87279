//! Storage layer for the backlog store.
//!
//! All durable state lives under `.backlog/` at the project root:
//!
//! ```text
//! .backlog/
//!   backlog.json    # materialized snapshot of all tasks
//!   events.jsonl    # append-only mutation journal, one record per line
//!   store.lock      # advisory lock taken by every writer
//! .backlog.toml     # optional configuration (loaded by config.rs)
//! ```
//!
//! The journal is the source of truth; the snapshot is a derived cache
//! that `state.rs` rebuilds by replay whenever the two disagree.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;
use crate::lock;

/// Name of the store directory at the project root
pub const STORE_DIR: &str = ".backlog";

/// Snapshot file name
const SNAPSHOT_FILE: &str = "backlog.json";

/// Event journal file name
const EVENTS_FILE: &str = "events.jsonl";

/// Lock file name, shared by snapshot and journal writers
const LOCK_FILE: &str = "store.lock";

/// Filesystem access for the backlog store
#[derive(Debug, Clone)]
pub struct Storage {
    /// Project root (the directory containing `.backlog/`)
    root: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Project root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the `.backlog/` store directory
    pub fn store_dir(&self) -> PathBuf {
        self.root.join(STORE_DIR)
    }

    /// Path to the snapshot file
    pub fn snapshot_path(&self) -> PathBuf {
        self.store_dir().join(SNAPSHOT_FILE)
    }

    /// Path to the event journal
    pub fn events_path(&self) -> PathBuf {
        self.store_dir().join(EVENTS_FILE)
    }

    /// Path to the store lock file
    pub fn lock_path(&self) -> PathBuf {
        self.store_dir().join(LOCK_FILE)
    }

    /// Create the store directory and touch the journal.
    ///
    /// The snapshot itself is written by the state manager so that the
    /// schema version lives in one place.
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(self.store_dir())?;

        let events = self.events_path();
        if !events.exists() {
            File::create(&events)?;
        }

        Ok(())
    }

    /// Check whether the store directory exists
    pub fn is_initialized(&self) -> bool {
        self.store_dir().exists()
    }

    /// Modification time of the snapshot file, if present.
    ///
    /// Readers use this to notice external writers without taking the
    /// store lock.
    pub fn snapshot_mtime(&self) -> Option<SystemTime> {
        fs::metadata(self.snapshot_path())
            .and_then(|meta| meta.modified())
            .ok()
    }

    /// Write JSON data atomically (write to temp, then rename)
    pub fn write_json<T: Serialize>(&self, path: &Path, data: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(data)?;
        lock::write_atomic(path, json.as_bytes())
    }

    /// Read JSON data from a file
    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let content = fs::read_to_string(path)?;
        let data: T = serde_json::from_str(&content)?;
        Ok(data)
    }

    /// Append one record to a JSONL file.
    ///
    /// Not atomic on its own; writers hold the store lock.
    pub fn append_jsonl<T: Serialize>(&self, path: &Path, record: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string(record)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        writeln!(file, "{}", json)?;
        file.sync_all()?;

        Ok(())
    }

    /// Read all records from a JSONL file, skipping blank lines
    pub fn read_jsonl<T: DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: T = serde_json::from_str(&line)?;
            records.push(record);
        }

        Ok(records)
    }
}
