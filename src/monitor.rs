//! Discrete health issue detection.
//!
//! Where the scorer folds signals into one number, the monitor emits
//! typed findings that map one-to-one onto remediation strategies.
//! Both read the same [`signals`] extraction.

use serde::Serialize;

use crate::config::HealthConfig;
use crate::error::Result;
use crate::signals::{self, HealthContext};
use crate::state::{StateManager, TaskFilter};
use crate::task::{Status, Task, TaskId};

/// Finding category; dispatch key for remediation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueKind {
    Stuck,
    FalseCompletion,
    InvalidBlocked,
    ProgressMismatch,
}

impl IssueKind {
    /// Remediation order within equal severity, most urgent first
    pub fn priority(&self) -> u8 {
        match self {
            IssueKind::FalseCompletion => 0,
            IssueKind::Stuck => 1,
            IssueKind::InvalidBlocked => 2,
            IssueKind::ProgressMismatch => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    Critical,
}

impl Severity {
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::Medium => 1,
            Severity::Low => 2,
        }
    }
}

/// Derived, transient finding; never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub task_id: TaskId,
    pub detail: String,
    /// How certain the detection is; safe-mode remediation skips
    /// anything below the configured threshold
    pub confidence: f64,
}

/// Detect issues for one task. Pure given the context; ordered
/// most-severe-first.
pub fn detect_health_issues(task: &Task, ctx: &HealthContext, config: &HealthConfig) -> Vec<Issue> {
    let s = signals::collect(task, ctx, config.baseline_effort_hours);
    let mut issues = Vec::new();
    let issue = |kind, severity, detail: String, confidence| Issue {
        kind,
        severity,
        task_id: task.id,
        detail,
        confidence,
    };

    if s.status == Status::Completed && s.progress < 100 {
        issues.push(issue(
            IssueKind::FalseCompletion,
            Severity::Critical,
            format!("marked completed with progress {}%", s.progress),
            0.95,
        ));
    }

    if s.status == Status::InProgress && s.progress > 0 && s.idle_hours > config.stuck_hours {
        issues.push(issue(
            IssueKind::Stuck,
            Severity::Medium,
            format!("no activity for {:.0} hours", s.idle_hours),
            0.8,
        ));
    }

    if s.status == Status::Blocked {
        if s.blockers.total == 0 {
            issues.push(issue(
                IssueKind::InvalidBlocked,
                Severity::Medium,
                "blocked with no blockers".to_string(),
                0.9,
            ));
        } else if s.blockers.all_resolved() {
            issues.push(issue(
                IssueKind::InvalidBlocked,
                Severity::Medium,
                format!("all {} blockers completed", s.blockers.total),
                0.9,
            ));
        } else if s.blockers.missing > 0 && s.blockers.active == 0 {
            // Data-integrity problem, not a state the engine should
            // confidently rewrite on its own
            issues.push(issue(
                IssueKind::InvalidBlocked,
                Severity::Low,
                format!(
                    "{} blocker reference(s) point to nonexistent tasks",
                    s.blockers.missing
                ),
                0.4,
            ));
        }
    }

    if s.status == Status::InProgress && s.progress == 0 && s.age_hours > config.no_progress_hours {
        issues.push(issue(
            IssueKind::ProgressMismatch,
            Severity::Medium,
            format!("in progress for {:.0} hours with no recorded progress", s.age_hours),
            0.75,
        ));
    }
    if s.status == Status::NotStarted && s.progress > 0 {
        issues.push(issue(
            IssueKind::ProgressMismatch,
            Severity::Medium,
            format!("not started but progress is {}%", s.progress),
            0.85,
        ));
    }

    sort_issues(&mut issues);
    issues
}

/// Order most-severe-first, then by remediation priority.
pub fn sort_issues(issues: &mut [Issue]) {
    issues.sort_by_key(|issue| (issue.severity.rank(), issue.kind.priority()));
}

/// Cheap whole-backlog summary for fast reporting
#[derive(Debug, Clone, Default, Serialize)]
pub struct QuickCheck {
    pub stuck_tasks: Vec<TaskId>,
    pub false_completions: Vec<TaskId>,
    pub invalid_blocked: Vec<TaskId>,
    pub progress_mismatches: Vec<TaskId>,
    pub total: usize,
    pub healthy: usize,
}

impl QuickCheck {
    pub fn has_issues(&self) -> bool {
        self.healthy < self.total
    }
}

pub struct HealthMonitor<'a> {
    state: &'a StateManager,
    config: HealthConfig,
}

impl<'a> HealthMonitor<'a> {
    pub fn new(state: &'a StateManager, config: HealthConfig) -> Self {
        Self { state, config }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Detect issues for every task; tasks with no findings are
    /// omitted.
    pub fn scan(&self) -> Result<Vec<(Task, Vec<Issue>)>> {
        let tasks = self.state.get_tasks(&TaskFilter::default())?;
        let ctx = HealthContext::from_tasks(chrono::Utc::now(), &tasks);

        Ok(tasks
            .into_iter()
            .filter_map(|task| {
                let issues = detect_health_issues(&task, &ctx, &self.config);
                if issues.is_empty() {
                    None
                } else {
                    Some((task, issues))
                }
            })
            .collect())
    }

    /// One-pass summary scan across all tasks.
    pub fn quick_check(&self) -> Result<QuickCheck> {
        let tasks = self.state.get_tasks(&TaskFilter::default())?;
        let ctx = HealthContext::from_tasks(chrono::Utc::now(), &tasks);

        let mut check = QuickCheck {
            total: tasks.len(),
            ..QuickCheck::default()
        };

        for task in &tasks {
            let issues = detect_health_issues(task, &ctx, &self.config);
            if issues.is_empty() {
                check.healthy += 1;
                continue;
            }
            for issue in issues {
                let bucket = match issue.kind {
                    IssueKind::Stuck => &mut check.stuck_tasks,
                    IssueKind::FalseCompletion => &mut check.false_completions,
                    IssueKind::InvalidBlocked => &mut check.invalid_blocked,
                    IssueKind::ProgressMismatch => &mut check.progress_mismatches,
                };
                if !bucket.contains(&task.id) {
                    bucket.push(task.id);
                }
            }
        }

        Ok(check)
    }
}
