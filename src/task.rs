//! Task domain model for the backlog store.
//!
//! Tasks are validated at the store boundary: status and priority are
//! enums, ids are a parsed newtype, and the status state machine is an
//! explicit edge table. A `Task` held in memory always satisfies the
//! store invariants.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Rendered id prefix, e.g. `TASK-007`
pub const TASK_ID_PREFIX: &str = "TASK";

/// Zero-padding width of the numeric part
pub const TASK_ID_WIDTH: usize = 3;

/// Default priority for new tasks
pub const DEFAULT_PRIORITY: Priority = Priority::P2;

/// Task identifier: `TASK-<zero-padded integer>`, strictly increasing,
/// never reused. Accepts `TASK-7`, `task-007`, or a bare integer on
/// input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(u64);

impl TaskId {
    pub fn new(number: u64) -> Self {
        Self(number)
    }

    pub fn number(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{:0width$}",
            TASK_ID_PREFIX,
            self.0,
            width = TASK_ID_WIDTH
        )
    }
}

impl FromStr for TaskId {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(Error::Validation("task id cannot be empty".to_string()));
        }

        let digits = match trimmed.rsplit_once('-') {
            Some((prefix, digits)) if prefix.eq_ignore_ascii_case(TASK_ID_PREFIX) => digits,
            Some(_) => {
                return Err(Error::Validation(format!(
                    "invalid task id '{trimmed}' (expected {TASK_ID_PREFIX}-<number>)"
                )))
            }
            None => trimmed,
        };

        digits
            .parse::<u64>()
            .map(TaskId)
            .map_err(|_| {
                Error::Validation(format!(
                    "invalid task id '{trimmed}' (expected {TASK_ID_PREFIX}-<number>)"
                ))
            })
    }
}

impl TryFrom<String> for TaskId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.to_string()
    }
}

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    NotStarted,
    InProgress,
    Blocked,
    Completed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::NotStarted => "not-started",
            Status::InProgress => "in-progress",
            Status::Blocked => "blocked",
            Status::Completed => "completed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "not-started" => Ok(Status::NotStarted),
            "in-progress" => Ok(Status::InProgress),
            "blocked" => Ok(Status::Blocked),
            "completed" => Ok(Status::Completed),
            other => Err(Error::Validation(format!("unknown task status '{other}'"))),
        }
    }
}

/// Task priority, P0 highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    P0,
    P1,
    P2,
    P3,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::P0 => "P0",
            Priority::P1 => "P1",
            Priority::P2 => "P2",
            Priority::P3 => "P3",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "P0" => Ok(Priority::P0),
            "P1" => Ok(Priority::P1),
            "P2" => Ok(Priority::P2),
            "P3" => Ok(Priority::P3),
            other => Err(Error::Validation(format!(
                "unknown task priority '{other}' (expected P0-P3)"
            ))),
        }
    }
}

/// Dependency edges to other tasks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dependencies {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<TaskId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<TaskId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parallel_with: Vec<TaskId>,
}

impl Dependencies {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty() && self.blocked_by.is_empty() && self.parallel_with.is_empty()
    }
}

/// One entry in a task's append-only rationale trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub progress: u8,
    pub notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

/// A unit of trackable work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub priority: Priority,
    pub status: Status,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Dependencies::is_empty")]
    pub dependencies: Dependencies,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub needs_attention: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub execution_log: Vec<ExecutionLogEntry>,
}

impl Task {
    /// Timestamp of the most recent recorded activity: the last
    /// execution-log entry, falling back to `updated_at`.
    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.execution_log
            .last()
            .map(|entry| entry.timestamp)
            .unwrap_or(self.updated_at)
    }
}

/// Validate a status transition against the edge table.
///
/// ```text
/// not-started -> in-progress | blocked
/// in-progress -> completed (progress must already be 100) | blocked
/// blocked     -> in-progress | not-started
/// completed   -> not-started (explicit reopen only)
/// ```
///
/// The completion gate checks the task's progress as it currently
/// stands, not the value a patch may carry alongside the transition.
pub fn validate_transition(task: &Task, to: Status) -> Result<()> {
    use Status::*;

    let from = task.status;
    let rejected = |reason: &str| {
        Err(Error::InvalidTransition {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
            reason: reason.to_string(),
        })
    };

    match (from, to) {
        (NotStarted, InProgress)
        | (NotStarted, Blocked)
        | (InProgress, Blocked)
        | (Blocked, InProgress)
        | (Blocked, NotStarted)
        | (Completed, NotStarted) => Ok(()),
        (InProgress, Completed) => {
            if task.progress == 100 {
                Ok(())
            } else {
                rejected("progress must reach 100 before completion")
            }
        }
        (NotStarted, Completed) => rejected("task was never started"),
        (Blocked, Completed) => rejected("task is blocked"),
        (Completed, InProgress) | (Completed, Blocked) => rejected("reopen the task first"),
        (InProgress, NotStarted) => rejected("not an allowed edge"),
        (NotStarted, NotStarted)
        | (InProgress, InProgress)
        | (Blocked, Blocked)
        | (Completed, Completed) => rejected("task is already in this status"),
    }
}

/// Clamp a raw progress value into the valid range
pub fn clamp_progress(raw: i64) -> u8 {
    raw.clamp(0, 100) as u8
}

/// Input for creating a task
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub category: Option<String>,
    pub priority: Option<Priority>,
    pub estimate_hours: Option<f64>,
    pub blocked_by: Vec<TaskId>,
    pub note: Option<String>,
    pub agent: Option<String>,
}

/// Partial update applied by `StateManager::update_task`.
///
/// Progress arrives as a raw integer and is clamped into `[0, 100]`;
/// `note` and `agent` feed the execution-log entry the mutation writes.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub category: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<Status>,
    pub progress: Option<i64>,
    pub blocked_by: Option<Vec<TaskId>>,
    pub blocks: Option<Vec<TaskId>>,
    pub parallel_with: Option<Vec<TaskId>>,
    pub estimate_hours: Option<f64>,
    pub needs_attention: Option<bool>,
    pub note: Option<String>,
    pub agent: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with(status: Status, progress: u8) -> Task {
        let now = Utc::now();
        Task {
            id: TaskId::new(1),
            title: "Test".to_string(),
            category: None,
            priority: DEFAULT_PRIORITY,
            status,
            progress,
            dependencies: Dependencies::default(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            estimate_hours: None,
            needs_attention: false,
            execution_log: Vec::new(),
        }
    }

    #[test]
    fn id_renders_zero_padded() {
        assert_eq!(TaskId::new(7).to_string(), "TASK-007");
        assert_eq!(TaskId::new(1234).to_string(), "TASK-1234");
    }

    #[test]
    fn id_parses_prefixed_and_bare_forms() {
        assert_eq!("TASK-007".parse::<TaskId>().unwrap(), TaskId::new(7));
        assert_eq!("task-7".parse::<TaskId>().unwrap(), TaskId::new(7));
        assert_eq!("42".parse::<TaskId>().unwrap(), TaskId::new(42));
        assert!("JOB-7".parse::<TaskId>().is_err());
        assert!("TASK-".parse::<TaskId>().is_err());
        assert!("".parse::<TaskId>().is_err());
    }

    #[test]
    fn id_serde_uses_display_form() {
        let json = serde_json::to_string(&TaskId::new(7)).unwrap();
        assert_eq!(json, "\"TASK-007\"");
        let id: TaskId = serde_json::from_str("\"TASK-007\"").unwrap();
        assert_eq!(id, TaskId::new(7));
    }

    #[test]
    fn status_serde_is_kebab_case() {
        assert_eq!(
            serde_json::to_string(&Status::NotStarted).unwrap(),
            "\"not-started\""
        );
        assert_eq!(
            serde_json::from_str::<Status>("\"in-progress\"").unwrap(),
            Status::InProgress
        );
    }

    #[test]
    fn priority_parses_case_insensitive() {
        assert_eq!("p0".parse::<Priority>().unwrap(), Priority::P0);
        assert!("P4".parse::<Priority>().is_err());
    }

    #[test]
    fn allowed_edges_pass() {
        assert!(validate_transition(&task_with(Status::NotStarted, 0), Status::InProgress).is_ok());
        assert!(validate_transition(&task_with(Status::NotStarted, 0), Status::Blocked).is_ok());
        assert!(validate_transition(&task_with(Status::InProgress, 40), Status::Blocked).is_ok());
        assert!(validate_transition(&task_with(Status::Blocked, 0), Status::InProgress).is_ok());
        assert!(validate_transition(&task_with(Status::Blocked, 0), Status::NotStarted).is_ok());
        assert!(validate_transition(&task_with(Status::Completed, 100), Status::NotStarted).is_ok());
    }

    #[test]
    fn completion_requires_current_progress_100() {
        let err =
            validate_transition(&task_with(Status::InProgress, 25), Status::Completed).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert!(
            validate_transition(&task_with(Status::InProgress, 100), Status::Completed).is_ok()
        );
    }

    #[test]
    fn disallowed_edges_fail() {
        assert!(validate_transition(&task_with(Status::NotStarted, 0), Status::Completed).is_err());
        assert!(validate_transition(&task_with(Status::Completed, 100), Status::InProgress).is_err());
        assert!(validate_transition(&task_with(Status::Completed, 100), Status::Blocked).is_err());
        assert!(validate_transition(&task_with(Status::InProgress, 50), Status::NotStarted).is_err());
        assert!(validate_transition(&task_with(Status::Blocked, 0), Status::Completed).is_err());
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(clamp_progress(-10), 0);
        assert_eq!(clamp_progress(42), 42);
        assert_eq!(clamp_progress(250), 100);
    }

    #[test]
    fn last_activity_prefers_execution_log() {
        let mut task = task_with(Status::InProgress, 10);
        let later = task.updated_at + chrono::Duration::hours(1);
        task.execution_log.push(ExecutionLogEntry {
            timestamp: later,
            progress: 10,
            notes: "note".to_string(),
            agent: None,
        });
        assert_eq!(task.last_activity_at(), later);
    }
}
