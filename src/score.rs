//! Composite health scoring.
//!
//! `calculate_health_score` is pure: the same task, context, and
//! config always produce the same score. It folds the shared signals
//! into three weighted components and a coarse label.

use serde::Serialize;

use crate::config::HealthConfig;
use crate::signals::{self, HealthContext, TaskSignals};
use crate::task::{Status, Task};

const STALENESS_WEIGHT: f64 = 0.30;
const COHERENCE_WEIGHT: f64 = 0.40;
const DEPENDENCIES_WEIGHT: f64 = 0.30;

/// Ceiling for any task whose status/progress pair contradicts a
/// store invariant; the weighted sum alone cannot express how serious
/// that is
const CONTRADICTION_CAP: u8 = 25;

/// Coarse health label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    fn for_score(score: u8) -> Self {
        match score {
            80..=100 => HealthStatus::Healthy,
            40..=79 => HealthStatus::Warning,
            _ => HealthStatus::Critical,
        }
    }
}

/// Per-component scores, each 0..=100
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreComponents {
    pub staleness: u8,
    pub coherence: u8,
    pub dependencies: u8,
}

/// Derived, transient health verdict; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthScore {
    pub overall: u8,
    pub status: HealthStatus,
    pub components: ScoreComponents,
}

/// Score a task's health from its timestamps, status, progress, and
/// blocker view. No I/O.
pub fn calculate_health_score(
    task: &Task,
    ctx: &HealthContext,
    config: &HealthConfig,
) -> HealthScore {
    let s = signals::collect(task, ctx, config.baseline_effort_hours);

    let components = ScoreComponents {
        staleness: staleness_component(&s, config),
        coherence: coherence_component(&s, config),
        dependencies: dependencies_component(&s),
    };

    let weighted = f64::from(components.staleness) * STALENESS_WEIGHT
        + f64::from(components.coherence) * COHERENCE_WEIGHT
        + f64::from(components.dependencies) * DEPENDENCIES_WEIGHT;
    let mut overall = weighted.round().clamp(0.0, 100.0) as u8;
    if components.coherence == 0 {
        overall = overall.min(CONTRADICTION_CAP);
    }

    HealthScore {
        overall,
        status: HealthStatus::for_score(overall),
        components,
    }
}

/// Activity recency against the stuck/stale thresholds and the
/// estimated effort. Only work in flight can be stale.
fn staleness_component(s: &TaskSignals, config: &HealthConfig) -> u8 {
    if matches!(s.status, Status::NotStarted | Status::Completed) {
        return 100;
    }

    let mut score: i32 = 100;
    if s.idle_hours > config.stuck_hours {
        score -= 25;
    }
    if s.idle_hours > config.no_progress_hours {
        score -= 20;
    }
    if s.idle_hours > config.stale_hours {
        score -= 35;
    }
    // Way past the estimate with nothing recent logged
    if s.overrun_ratio > 2.0 && s.idle_hours > config.stuck_hours {
        score -= 30;
    }
    score.max(0) as u8
}

/// Agreement between status and progress. A completed task below 100%
/// contradicts a store invariant and floors the component.
fn coherence_component(s: &TaskSignals, config: &HealthConfig) -> u8 {
    match s.status {
        Status::Completed if s.progress < 100 => 0,
        Status::InProgress if s.progress == 0 && s.age_hours > config.no_progress_hours => 40,
        Status::NotStarted if s.progress > 0 => 50,
        _ => 100,
    }
}

/// Whether a blocked status is still justified by its blockers.
fn dependencies_component(s: &TaskSignals) -> u8 {
    if s.status != Status::Blocked {
        return 100;
    }
    if s.blockers.total == 0 {
        return 30;
    }
    if s.blockers.all_resolved() {
        // Resolver should have picked this up already
        return 20;
    }
    if s.blockers.missing > 0 && s.blockers.active == 0 {
        return 50;
    }
    100
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Dependencies, ExecutionLogEntry, Priority, TaskId};
    use chrono::{DateTime, Duration, Utc};

    fn task(status: Status, progress: u8, now: DateTime<Utc>) -> Task {
        Task {
            id: TaskId::new(1),
            title: "scored".to_string(),
            category: None,
            priority: Priority::P2,
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

    fn config() -> HealthConfig {
        HealthConfig::default()
    }

    #[test]
    fn fresh_in_progress_task_is_healthy() {
        let now = Utc::now();
        let mut t = task(Status::InProgress, 30, now);
        t.started_at = Some(now - Duration::hours(1));

        let score = calculate_health_score(&t, &HealthContext::new(now), &config());
        assert_eq!(score.status, HealthStatus::Healthy);
        assert_eq!(score.overall, 100);
    }

    #[test]
    fn false_completion_scores_critical() {
        let now = Utc::now();
        let t = task(Status::Completed, 60, now);

        let score = calculate_health_score(&t, &HealthContext::new(now), &config());
        assert_eq!(score.components.coherence, 0);
        assert_eq!(score.status, HealthStatus::Critical);
    }

    #[test]
    fn idle_task_degrades_to_warning() {
        let now = Utc::now();
        let started = now - Duration::hours(30);
        let mut t = task(Status::InProgress, 50, started);
        t.started_at = Some(started);
        t.updated_at = started;
        t.execution_log.push(ExecutionLogEntry {
            timestamp: started,
            progress: 50,
            notes: "last touch".to_string(),
            agent: None,
        });

        let score = calculate_health_score(&t, &HealthContext::new(now), &config());
        assert!(score.components.staleness < 100);
        assert_eq!(score.status, HealthStatus::Warning);
    }

    #[test]
    fn blocked_with_resolved_blockers_is_penalized() {
        let now = Utc::now();
        let done = {
            let mut t = task(Status::Completed, 100, now);
            t.id = TaskId::new(2);
            t
        };
        let mut blocked = task(Status::Blocked, 0, now);
        blocked.dependencies.blocked_by = vec![TaskId::new(2)];

        let ctx = HealthContext::from_tasks(now, &[done, blocked.clone()]);
        let score = calculate_health_score(&blocked, &ctx, &config());
        assert_eq!(score.components.dependencies, 20);
        assert_eq!(score.status, HealthStatus::Warning);
    }

    #[test]
    fn legitimately_blocked_task_is_not_penalized() {
        let now = Utc::now();
        let active = {
            let mut t = task(Status::InProgress, 40, now);
            t.id = TaskId::new(2);
            t
        };
        let mut blocked = task(Status::Blocked, 0, now);
        blocked.dependencies.blocked_by = vec![TaskId::new(2)];

        let ctx = HealthContext::from_tasks(now, &[active, blocked.clone()]);
        let score = calculate_health_score(&blocked, &ctx, &config());
        assert_eq!(score.components.dependencies, 100);
        assert_eq!(score.status, HealthStatus::Healthy);
    }

    #[test]
    fn scoring_is_referentially_transparent() {
        let now = Utc::now();
        let started = now - Duration::hours(12);
        let mut t = task(Status::InProgress, 0, started);
        t.started_at = Some(started);
        t.updated_at = started;

        let ctx = HealthContext::new(now);
        let first = calculate_health_score(&t, &ctx, &config());
        let second = calculate_health_score(&t, &ctx, &config());
        assert_eq!(first, second);
    }

    #[test]
    fn labels_follow_thresholds() {
        assert_eq!(HealthStatus::for_score(100), HealthStatus::Healthy);
        assert_eq!(HealthStatus::for_score(80), HealthStatus::Healthy);
        assert_eq!(HealthStatus::for_score(79), HealthStatus::Warning);
        assert_eq!(HealthStatus::for_score(40), HealthStatus::Warning);
        assert_eq!(HealthStatus::for_score(39), HealthStatus::Critical);
        assert_eq!(HealthStatus::for_score(0), HealthStatus::Critical);
    }
}
