//! Authoritative task store and its mutation API.
//!
//! Every mutation flows through [`StateManager`]: it takes the store
//! lock, validates against the status state machine, appends exactly
//! one journal event, then atomically replaces the snapshot. The
//! journal is the source of truth; if the snapshot's tail pointer
//! disagrees with the journal (crash, external edit), the snapshot is
//! rebuilt by replay before the mutation proceeds.
//!
//! Readers never take the lock. `get_tasks` serves an in-memory cache
//! keyed on the snapshot file's mtime, so external writers are noticed
//! on the next read.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::lock::FileLock;
use crate::storage::Storage;
use crate::task::{
    clamp_progress, validate_transition, Dependencies, ExecutionLogEntry, NewTask, Priority,
    Status, Task, TaskId, TaskPatch, DEFAULT_PRIORITY,
};

pub const SNAPSHOT_SCHEMA_VERSION: &str = "backlog.snapshot.v1";

/// Materialized view of all tasks, insertion-ordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    /// Id of the last journal event this snapshot reflects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_id: Option<String>,
    pub tasks: Vec<Task>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            last_event_id: None,
            tasks: Vec::new(),
        }
    }
}

/// Mutation kind recorded in the journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    AddTask,
    UpdateTask,
    CompleteTask,
}

/// One journal record per mutation, immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub operation: Operation,
    pub task_id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Task>,
    pub after: Task,
}

impl Event {
    fn new(operation: Operation, task_id: TaskId, before: Option<Task>, after: Task) -> Self {
        Self {
            event_id: Ulid::new().to_string(),
            timestamp: Utc::now(),
            operation,
            task_id,
            before,
            after,
        }
    }
}

/// Query filter for `get_tasks`
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub category: Option<String>,
    pub ids: Option<Vec<TaskId>>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(status) = self.status {
            if task.status != status {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if task.priority != priority {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if task.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        if let Some(ids) = &self.ids {
            if !ids.contains(&task.id) {
                return false;
            }
        }
        true
    }
}

struct CacheEntry {
    tasks: Vec<Task>,
    mtime: Option<SystemTime>,
}

/// Single-writer task store.
///
/// Constructed once per process and passed by reference to the
/// resolver, monitor, and remediation engine.
pub struct StateManager {
    storage: Storage,
    lock_timeout_ms: u64,
    cache: Mutex<Option<CacheEntry>>,
}

impl StateManager {
    pub fn new(storage: Storage, config: &StoreConfig) -> Self {
        Self {
            storage,
            lock_timeout_ms: config.lock_timeout_ms,
            cache: Mutex::new(None),
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Create the store directory, journal, and an empty snapshot.
    pub fn init(&self) -> Result<()> {
        self.storage.init()?;
        if !self.storage.snapshot_path().exists() {
            self.storage
                .write_json(&self.storage.snapshot_path(), &Snapshot::empty())?;
        }
        Ok(())
    }

    fn require_initialized(&self) -> Result<()> {
        if self.storage.is_initialized() {
            Ok(())
        } else {
            Err(Error::StoreNotFound(self.storage.root().to_path_buf()))
        }
    }

    // =========================================================================
    // Queries (lock-free, cached)
    // =========================================================================

    /// Current snapshot, optionally filtered.
    pub fn get_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let tasks = self.load_tasks_cached()?;
        Ok(tasks.into_iter().filter(|t| filter.matches(t)).collect())
    }

    /// Look up a single task by id.
    pub fn get_task(&self, id: TaskId) -> Result<Task> {
        self.load_tasks_cached()?
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))
    }

    /// Recent journal events, most recent first.
    pub fn recent_events(&self, limit: usize) -> Result<Vec<Event>> {
        self.require_initialized()?;
        let mut events: Vec<Event> = self.storage.read_jsonl(&self.storage.events_path())?;
        let skip = events.len().saturating_sub(limit);
        let mut recent: Vec<Event> = events.drain(skip..).collect();
        recent.reverse();
        Ok(recent)
    }

    fn load_tasks_cached(&self) -> Result<Vec<Task>> {
        self.require_initialized()?;
        let mtime = self.storage.snapshot_mtime();

        {
            let cache = self.cache.lock().expect("cache lock poisoned");
            if let Some(entry) = cache.as_ref() {
                if mtime.is_some() && entry.mtime == mtime {
                    return Ok(entry.tasks.clone());
                }
            }
        }

        let snapshot = self.load_snapshot_readonly()?;
        let tasks = snapshot.tasks;
        let mut cache = self.cache.lock().expect("cache lock poisoned");
        *cache = Some(CacheEntry {
            tasks: tasks.clone(),
            mtime,
        });
        Ok(tasks)
    }

    fn load_snapshot_readonly(&self) -> Result<Snapshot> {
        let path = self.storage.snapshot_path();
        if path.exists() {
            return self.storage.read_json(&path);
        }
        // Snapshot missing: derive from the journal without writing
        let events: Vec<Event> = self.storage.read_jsonl(&self.storage.events_path())?;
        Ok(rebuild_snapshot(&events))
    }

    // =========================================================================
    // Mutations (locked read-modify-write)
    // =========================================================================

    /// Create a task. Assigns `max(existing ids) + 1`, starts at
    /// `not-started` with zero progress, and journals an `addTask`
    /// event before the snapshot becomes durable.
    pub fn add_task(&self, input: NewTask) -> Result<Task> {
        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(Error::Validation("title cannot be empty".to_string()));
        }

        self.require_initialized()?;
        let _lock = FileLock::acquire(self.storage.lock_path(), self.lock_timeout_ms)?;
        let mut snapshot = self.load_snapshot_for_write()?;

        let id = snapshot
            .tasks
            .iter()
            .map(|t| t.id.number())
            .max()
            .map(|n| TaskId::new(n).next())
            .unwrap_or_else(|| TaskId::new(1));

        let now = Utc::now();
        let task = Task {
            id,
            title,
            category: input.category,
            priority: input.priority.unwrap_or(DEFAULT_PRIORITY),
            status: Status::NotStarted,
            progress: 0,
            dependencies: Dependencies {
                blocked_by: input.blocked_by,
                ..Dependencies::default()
            },
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            estimate_hours: input.estimate_hours,
            needs_attention: false,
            execution_log: vec![ExecutionLogEntry {
                timestamp: now,
                progress: 0,
                notes: input.note.unwrap_or_else(|| "task created".to_string()),
                agent: input.agent,
            }],
        };

        tracing::debug!(task_id = %task.id, "adding task");
        let event = Event::new(Operation::AddTask, task.id, None, task.clone());
        snapshot.tasks.push(task.clone());
        self.commit(&mut snapshot, &event)?;
        Ok(task)
    }

    /// Apply a partial update. Transition violations reject the whole
    /// call with zero mutation.
    pub fn update_task(&self, id: TaskId, patch: TaskPatch) -> Result<Task> {
        self.apply_update(id, patch, Operation::UpdateTask)
    }

    /// Mark a task completed: `update_task(id, {status: completed,
    /// progress: 100})` journaled as a `completeTask` event. Fails
    /// unless the task is in progress with progress already at 100.
    pub fn complete_task(
        &self,
        id: TaskId,
        note: Option<String>,
        agent: Option<String>,
    ) -> Result<Task> {
        let patch = TaskPatch {
            status: Some(Status::Completed),
            progress: Some(100),
            note,
            agent,
            ..TaskPatch::default()
        };
        self.apply_update(id, patch, Operation::CompleteTask)
    }

    fn apply_update(&self, id: TaskId, patch: TaskPatch, operation: Operation) -> Result<Task> {
        self.require_initialized()?;
        let _lock = FileLock::acquire(self.storage.lock_path(), self.lock_timeout_ms)?;
        let mut snapshot = self.load_snapshot_for_write()?;

        let position = snapshot
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;
        let before = snapshot.tasks[position].clone();
        let mut task = before.clone();

        let transition = patch.status.filter(|&to| to != before.status);
        if let Some(to) = transition {
            validate_transition(&before, to)?;
            if to == Status::Blocked {
                let blockers = patch
                    .blocked_by
                    .as_ref()
                    .unwrap_or(&before.dependencies.blocked_by);
                if blockers.is_empty() {
                    return Err(Error::InvalidTransition {
                        from: before.status.as_str().to_string(),
                        to: to.as_str().to_string(),
                        reason: "blocked requires at least one blocker".to_string(),
                    });
                }
            }
        }

        if let Some(title) = &patch.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(Error::Validation("title cannot be empty".to_string()));
            }
            task.title = title.to_string();
        }
        if let Some(category) = patch.category.clone() {
            task.category = Some(category);
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(estimate) = patch.estimate_hours {
            task.estimate_hours = Some(estimate);
        }
        if let Some(flag) = patch.needs_attention {
            task.needs_attention = flag;
        }
        if let Some(blocked_by) = patch.blocked_by.clone() {
            task.dependencies.blocked_by = blocked_by;
        }
        if let Some(blocks) = patch.blocks.clone() {
            task.dependencies.blocks = blocks;
        }
        if let Some(parallel_with) = patch.parallel_with.clone() {
            task.dependencies.parallel_with = parallel_with;
        }
        if let Some(raw) = patch.progress {
            task.progress = clamp_progress(raw);
        }

        let now = Utc::now();
        if let Some(to) = transition {
            task.status = to;
            match to {
                Status::InProgress => {
                    if task.started_at.is_none() {
                        task.started_at = Some(now);
                    }
                }
                Status::Completed => {
                    task.completed_at = Some(now);
                    task.progress = 100;
                }
                Status::NotStarted => {
                    task.completed_at = None;
                    if patch.progress.is_none() {
                        task.progress = 0;
                    }
                }
                Status::Blocked => {}
            }
        }

        // Store-boundary invariants, regardless of which fields moved
        if task.status == Status::Completed && task.progress != 100 {
            return Err(Error::Validation(
                "completed task must hold progress 100".to_string(),
            ));
        }
        if task.status == Status::Blocked && task.dependencies.blocked_by.is_empty() {
            return Err(Error::Validation(
                "blocked task requires at least one blocker".to_string(),
            ));
        }

        task.updated_at = now;
        task.execution_log.push(ExecutionLogEntry {
            timestamp: now,
            progress: task.progress,
            notes: patch
                .note
                .clone()
                .unwrap_or_else(|| describe_change(&before, &task)),
            agent: patch.agent.clone(),
        });

        tracing::debug!(task_id = %id, ?operation, "updating task");
        let event = Event::new(operation, id, Some(before), task.clone());
        snapshot.tasks[position] = task.clone();
        self.commit(&mut snapshot, &event)?;
        Ok(task)
    }

    /// Append the event, then atomically replace the snapshot.
    /// Called with the store lock held.
    fn commit(&self, snapshot: &mut Snapshot, event: &Event) -> Result<()> {
        self.storage
            .append_jsonl(&self.storage.events_path(), event)?;
        snapshot.last_event_id = Some(event.event_id.clone());
        snapshot.generated_at = event.timestamp;
        self.storage
            .write_json(&self.storage.snapshot_path(), snapshot)?;

        let mut cache = self.cache.lock().expect("cache lock poisoned");
        *cache = Some(CacheEntry {
            tasks: snapshot.tasks.clone(),
            mtime: self.storage.snapshot_mtime(),
        });
        Ok(())
    }

    /// Load the snapshot for a mutation, rebuilding from the journal
    /// when the two disagree. Called with the store lock held.
    fn load_snapshot_for_write(&self) -> Result<Snapshot> {
        let events: Vec<Event> = self.storage.read_jsonl(&self.storage.events_path())?;
        let tail = events.last().map(|e| e.event_id.clone());

        let path = self.storage.snapshot_path();
        if path.exists() {
            let snapshot: Snapshot = self.storage.read_json(&path)?;
            if snapshot.last_event_id == tail {
                return Ok(snapshot);
            }
            tracing::warn!(
                snapshot_tail = ?snapshot.last_event_id,
                journal_tail = ?tail,
                "snapshot out of sync with journal, rebuilding by replay"
            );
        } else if events.is_empty() {
            return Ok(Snapshot::empty());
        } else {
            tracing::warn!("snapshot missing, rebuilding from journal");
        }

        Ok(rebuild_snapshot(&events))
    }
}

/// Replay the journal into a snapshot. Each event carries the full
/// post-mutation task, so replay is a last-write-wins fold per id.
pub fn rebuild_snapshot(events: &[Event]) -> Snapshot {
    let mut map: BTreeMap<TaskId, Task> = BTreeMap::new();
    for event in events {
        map.insert(event.task_id, event.after.clone());
    }

    Snapshot {
        schema_version: SNAPSHOT_SCHEMA_VERSION.to_string(),
        generated_at: Utc::now(),
        last_event_id: events.last().map(|e| e.event_id.clone()),
        tasks: map.into_values().collect(),
    }
}

fn describe_change(before: &Task, after: &Task) -> String {
    if before.status != after.status {
        format!("status {} -> {}", before.status, after.status)
    } else if before.progress != after.progress {
        format!("progress {}% -> {}%", before.progress, after.progress)
    } else {
        "task updated".to_string()
    }
}
