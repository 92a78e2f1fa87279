//! Bounded auto-remediation of detected health issues.
//!
//! Strategies are keyed by issue kind and go through the state
//! manager, so every fix is journaled and transition-checked like any
//! other mutation. The engine never deletes a task or its history, and
//! a stuck finding is escalated, never papered over with fabricated
//! progress.

use serde::Serialize;

use crate::config::RemedyConfig;
use crate::error::Result;
use crate::monitor::{sort_issues, HealthMonitor, Issue, IssueKind};
use crate::state::StateManager;
use crate::task::{Status, Task, TaskId, TaskPatch};

/// Identity recorded in execution-log entries written by the engine
const REMEDY_AGENT: &str = "auto-remediation";

/// Per-invocation options, defaulted from [`RemedyConfig`]
#[derive(Debug, Clone)]
pub struct RemediationOptions {
    /// Compute the action list without mutating anything
    pub dry_run: bool,
    /// Skip fixes whose confidence is below the threshold
    pub safe_mode: bool,
    /// Maximum corrective actions per task per call
    pub max_auto_fixes: usize,
}

impl RemediationOptions {
    pub fn from_config(config: &RemedyConfig) -> Self {
        Self {
            dry_run: false,
            safe_mode: config.safe_mode,
            max_auto_fixes: config.max_auto_fixes,
        }
    }
}

/// A fix that was applied (or would be, under dry run)
#[derive(Debug, Clone, Serialize)]
pub struct AppliedFix {
    pub kind: IssueKind,
    pub action: String,
    pub dry_run: bool,
}

/// A fix that was considered and not applied
#[derive(Debug, Clone, Serialize)]
pub struct SkippedFix {
    pub kind: IssueKind,
    pub reason: String,
}

/// Outcome of remediating one task
#[derive(Debug, Clone, Serialize)]
pub struct RemediationReport {
    pub task_id: TaskId,
    pub success: bool,
    pub applied: Vec<AppliedFix>,
    pub skipped: Vec<SkippedFix>,
}

pub struct AutoRemediationEngine<'a> {
    state: &'a StateManager,
    options: RemediationOptions,
    confidence_threshold: f64,
}

impl<'a> AutoRemediationEngine<'a> {
    pub fn new(
        state: &'a StateManager,
        config: &RemedyConfig,
        options: RemediationOptions,
    ) -> Self {
        Self {
            state,
            options,
            confidence_threshold: config.confidence_threshold,
        }
    }

    /// Remediate one task's issues, most-severe-first, applying at most
    /// `max_auto_fixes` actions. A mutation failure aborts remediation
    /// for this task only; the failure is recorded, not propagated.
    pub fn remediate(&self, task: &Task, issues: &[Issue]) -> RemediationReport {
        let mut ordered: Vec<Issue> = issues.to_vec();
        sort_issues(&mut ordered);

        let mut report = RemediationReport {
            task_id: task.id,
            success: true,
            applied: Vec::new(),
            skipped: Vec::new(),
        };

        for issue in &ordered {
            if report.applied.len() >= self.options.max_auto_fixes {
                report.skipped.push(SkippedFix {
                    kind: issue.kind,
                    reason: format!("fix budget of {} exhausted", self.options.max_auto_fixes),
                });
                continue;
            }

            if self.options.safe_mode && issue.confidence < self.confidence_threshold {
                report.skipped.push(SkippedFix {
                    kind: issue.kind,
                    reason: format!(
                        "confidence {:.2} below threshold {:.2}",
                        issue.confidence, self.confidence_threshold
                    ),
                });
                continue;
            }

            match self.apply_fix(task, issue) {
                Ok(Some(fix)) => report.applied.push(fix),
                Ok(None) => report.skipped.push(SkippedFix {
                    kind: issue.kind,
                    reason: "no longer applicable".to_string(),
                }),
                Err(err) => {
                    tracing::warn!(task_id = %task.id, kind = ?issue.kind, error = %err,
                        "remediation mutation failed, aborting task");
                    report.success = false;
                    report.skipped.push(SkippedFix {
                        kind: issue.kind,
                        reason: format!("mutation failed: {err}"),
                    });
                    break;
                }
            }
        }

        report
    }

    /// Scan the whole backlog and remediate every task with findings.
    /// Per-task failures are recorded in that task's report; the run
    /// continues.
    pub fn run(&self, monitor: &HealthMonitor<'_>) -> Result<Vec<RemediationReport>> {
        let findings = monitor.scan()?;
        Ok(findings
            .iter()
            .map(|(task, issues)| self.remediate(task, issues))
            .collect())
    }

    fn apply_fix(&self, task: &Task, issue: &Issue) -> Result<Option<AppliedFix>> {
        match issue.kind {
            IssueKind::FalseCompletion => self.fix_false_completion(task, issue),
            IssueKind::InvalidBlocked => self.fix_invalid_blocked(task, issue),
            IssueKind::ProgressMismatch => self.fix_progress_mismatch(task),
            IssueKind::Stuck => self.fix_stuck(task, issue),
        }
    }

    /// Revert a completion that contradicts its progress. The state
    /// machine has no completed -> in-progress edge, so the revert is
    /// the legal reopen-then-restart pair, counted as one fix.
    fn fix_false_completion(&self, task: &Task, issue: &Issue) -> Result<Option<AppliedFix>> {
        if task.status != Status::Completed {
            return Ok(None);
        }

        // Conservative restart point pending re-verification
        let restart_progress = if task.progress == 0 {
            50
        } else {
            task.progress.min(75)
        };
        let action = format!("reverted to in-progress at {restart_progress}%");

        if self.options.dry_run {
            return Ok(Some(AppliedFix {
                kind: issue.kind,
                action,
                dry_run: true,
            }));
        }

        self.state.update_task(
            task.id,
            TaskPatch {
                status: Some(Status::NotStarted),
                note: Some(format!("reopened: {}", issue.detail)),
                agent: Some(REMEDY_AGENT.to_string()),
                ..TaskPatch::default()
            },
        )?;
        self.state.update_task(
            task.id,
            TaskPatch {
                status: Some(Status::InProgress),
                progress: Some(i64::from(restart_progress)),
                note: Some("restarted pending re-verification".to_string()),
                agent: Some(REMEDY_AGENT.to_string()),
                ..TaskPatch::default()
            },
        )?;

        Ok(Some(AppliedFix {
            kind: issue.kind,
            action,
            dry_run: false,
        }))
    }

    /// Unblock via the same transition the dependency resolver uses.
    fn fix_invalid_blocked(&self, task: &Task, issue: &Issue) -> Result<Option<AppliedFix>> {
        if task.status != Status::Blocked {
            return Ok(None);
        }

        let action = "unblocked to not-started".to_string();
        if self.options.dry_run {
            return Ok(Some(AppliedFix {
                kind: issue.kind,
                action,
                dry_run: true,
            }));
        }

        self.state.update_task(
            task.id,
            TaskPatch {
                status: Some(Status::NotStarted),
                note: Some(format!("unblocked: {}", issue.detail)),
                agent: Some(REMEDY_AGENT.to_string()),
                ..TaskPatch::default()
            },
        )?;

        Ok(Some(AppliedFix {
            kind: issue.kind,
            action,
            dry_run: false,
        }))
    }

    /// Pull progress into a range consistent with the status.
    fn fix_progress_mismatch(&self, task: &Task) -> Result<Option<AppliedFix>> {
        let target = match task.status {
            Status::InProgress => i64::from(task.progress.clamp(1, 99)),
            Status::NotStarted => 0,
            _ => return Ok(None),
        };
        if target == i64::from(task.progress) {
            return Ok(None);
        }

        let action = format!("adjusted progress {}% -> {}%", task.progress, target);
        if self.options.dry_run {
            return Ok(Some(AppliedFix {
                kind: IssueKind::ProgressMismatch,
                action,
                dry_run: true,
            }));
        }

        self.state.update_task(
            task.id,
            TaskPatch {
                progress: Some(target),
                note: Some(format!(
                    "progress aligned with {} status",
                    task.status
                )),
                agent: Some(REMEDY_AGENT.to_string()),
                ..TaskPatch::default()
            },
        )?;

        Ok(Some(AppliedFix {
            kind: IssueKind::ProgressMismatch,
            action,
            dry_run: false,
        }))
    }

    /// Flag and escalate only. Rewriting progress here would mask a
    /// real delay.
    fn fix_stuck(&self, task: &Task, issue: &Issue) -> Result<Option<AppliedFix>> {
        let action = "flagged for attention".to_string();
        if self.options.dry_run {
            return Ok(Some(AppliedFix {
                kind: issue.kind,
                action,
                dry_run: true,
            }));
        }

        self.state.update_task(
            task.id,
            TaskPatch {
                needs_attention: Some(true),
                note: Some(format!("escalated: {}", issue.detail)),
                agent: Some(REMEDY_AGENT.to_string()),
                ..TaskPatch::default()
            },
        )?;

        Ok(Some(AppliedFix {
            kind: issue.kind,
            action,
            dry_run: false,
        }))
    }
}
