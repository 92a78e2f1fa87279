//! Shared health signal extraction.
//!
//! The scorer and the monitor read the same [`TaskSignals`] so their
//! verdicts cannot drift apart. Extraction is pure: callers supply the
//! evaluation time and a pre-collected view of blocker statuses.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::task::{Status, Task, TaskId};

/// Evaluation context: the clock and what each referenced blocker is
/// currently doing.
#[derive(Debug, Clone)]
pub struct HealthContext {
    pub now: DateTime<Utc>,
    statuses: HashMap<TaskId, Status>,
}

impl HealthContext {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            statuses: HashMap::new(),
        }
    }

    /// Build a context covering every task in the given slice.
    pub fn from_tasks(now: DateTime<Utc>, tasks: &[Task]) -> Self {
        Self {
            now,
            statuses: tasks.iter().map(|t| (t.id, t.status)).collect(),
        }
    }

    pub fn blocker_status(&self, id: TaskId) -> Option<Status> {
        self.statuses.get(&id).copied()
    }
}

/// Summary of a task's `blocked_by` edges
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockerSummary {
    pub total: usize,
    pub completed: usize,
    pub active: usize,
    /// References to ids that do not exist in the store
    pub missing: usize,
}

impl BlockerSummary {
    /// All blockers are done; nothing justifies the blocked status.
    pub fn all_resolved(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }
}

/// Derived signals for one task
#[derive(Debug, Clone)]
pub struct TaskSignals {
    pub status: Status,
    pub progress: u8,
    /// Hours since `started_at`; zero when never started
    pub age_hours: f64,
    /// Hours since the last execution-log entry
    pub idle_hours: f64,
    /// Estimated effort, falling back to the configured baseline
    pub effort_hours: f64,
    /// Age relative to estimated effort
    pub overrun_ratio: f64,
    pub blockers: BlockerSummary,
}

/// Extract signals for a task against the given context.
pub fn collect(task: &Task, ctx: &HealthContext, baseline_effort_hours: f64) -> TaskSignals {
    let age_hours = task
        .started_at
        .map(|started| hours_between(started, ctx.now))
        .unwrap_or(0.0);
    let idle_hours = hours_between(task.last_activity_at(), ctx.now);

    let effort_hours = task
        .estimate_hours
        .filter(|estimate| *estimate > 0.0)
        .unwrap_or(baseline_effort_hours);
    let overrun_ratio = age_hours / effort_hours;

    let mut blockers = BlockerSummary {
        total: task.dependencies.blocked_by.len(),
        ..BlockerSummary::default()
    };
    for &blocker in &task.dependencies.blocked_by {
        match ctx.blocker_status(blocker) {
            Some(Status::Completed) => blockers.completed += 1,
            Some(_) => blockers.active += 1,
            None => blockers.missing += 1,
        }
    }

    TaskSignals {
        status: task.status,
        progress: task.progress,
        age_hours,
        idle_hours,
        effort_hours,
        overrun_ratio,
        blockers,
    }
}

fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let seconds = (to - from).num_seconds() as f64;
    (seconds / 3600.0).max(0.0)
}
