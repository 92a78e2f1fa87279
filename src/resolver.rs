//! Dependency resolution: unblocks tasks whose blockers have all
//! completed.
//!
//! Runs on demand (typically at the start of a status report) and goes
//! through the state manager like every other writer. A second run
//! with no intervening completions is a no-op.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::Result;
use crate::state::{StateManager, TaskFilter};
use crate::task::{Status, TaskId, TaskPatch};

/// Identity recorded in execution-log entries written by the resolver
const RESOLVER_AGENT: &str = "dependency-resolver";

/// Outcome of one resolution pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolutionReport {
    /// Tasks promoted from `blocked` to `not-started`
    pub unblocked: Vec<TaskId>,
    /// `(task, blocker)` pairs where the blocker id does not exist;
    /// such tasks stay blocked and are surfaced as integrity warnings
    pub dangling: Vec<DanglingReference>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DanglingReference {
    pub task_id: TaskId,
    pub blocker_id: TaskId,
}

pub struct DependencyResolver<'a> {
    state: &'a StateManager,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(state: &'a StateManager) -> Self {
        Self { state }
    }

    /// Unblock every task whose blockers are all completed; returns the
    /// number of tasks transitioned.
    pub fn auto_run(&self) -> Result<usize> {
        Ok(self.resolve()?.unblocked.len())
    }

    /// Full resolution pass with integrity warnings.
    pub fn resolve(&self) -> Result<ResolutionReport> {
        let tasks = self.state.get_tasks(&TaskFilter::default())?;
        let statuses: HashMap<TaskId, Status> =
            tasks.iter().map(|t| (t.id, t.status)).collect();

        let mut report = ResolutionReport::default();

        for task in tasks.iter().filter(|t| t.status == Status::Blocked) {
            if task.dependencies.blocked_by.is_empty() {
                // Invalid state; left to the health monitor to flag
                continue;
            }

            let mut all_completed = true;
            for &blocker in &task.dependencies.blocked_by {
                match statuses.get(&blocker) {
                    Some(Status::Completed) => {}
                    Some(_) => all_completed = false,
                    None => {
                        all_completed = false;
                        report.dangling.push(DanglingReference {
                            task_id: task.id,
                            blocker_id: blocker,
                        });
                    }
                }
            }

            if !all_completed {
                continue;
            }

            tracing::info!(task_id = %task.id, "all blockers completed, unblocking");
            self.state.update_task(
                task.id,
                TaskPatch {
                    status: Some(Status::NotStarted),
                    note: Some("unblocked: all blockers completed".to_string()),
                    agent: Some(RESOLVER_AGENT.to_string()),
                    ..TaskPatch::default()
                },
            )?;
            report.unblocked.push(task.id);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::state::StateManager;
    use crate::storage::Storage;
    use crate::task::NewTask;
    use tempfile::TempDir;

    fn manager(temp: &TempDir) -> StateManager {
        let storage = Storage::new(temp.path().to_path_buf());
        let config = Config::default();
        let state = StateManager::new(storage, &config.store);
        state.init().expect("init");
        state
    }

    fn add(state: &StateManager, title: &str) -> TaskId {
        state
            .add_task(NewTask {
                title: title.to_string(),
                ..NewTask::default()
            })
            .expect("add task")
            .id
    }

    fn finish(state: &StateManager, id: TaskId) {
        state
            .update_task(
                id,
                TaskPatch {
                    status: Some(Status::InProgress),
                    progress: Some(100),
                    ..TaskPatch::default()
                },
            )
            .expect("start");
        state.complete_task(id, None, None).expect("complete");
    }

    fn block_on(state: &StateManager, id: TaskId, blockers: Vec<TaskId>) {
        state
            .update_task(
                id,
                TaskPatch {
                    status: Some(Status::Blocked),
                    blocked_by: Some(blockers),
                    ..TaskPatch::default()
                },
            )
            .expect("block");
    }

    #[test]
    fn unblocks_when_all_blockers_complete() {
        let temp = TempDir::new().unwrap();
        let state = manager(&temp);
        let blocker = add(&state, "B");
        let dependent = add(&state, "A");
        block_on(&state, dependent, vec![blocker]);

        finish(&state, blocker);

        let resolver = DependencyResolver::new(&state);
        assert_eq!(resolver.auto_run().unwrap(), 1);
        assert_eq!(
            state.get_task(dependent).unwrap().status,
            Status::NotStarted
        );
    }

    #[test]
    fn second_run_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let state = manager(&temp);
        let blocker = add(&state, "B");
        let dependent = add(&state, "A");
        block_on(&state, dependent, vec![blocker]);
        finish(&state, blocker);

        let resolver = DependencyResolver::new(&state);
        assert_eq!(resolver.auto_run().unwrap(), 1);
        assert_eq!(resolver.auto_run().unwrap(), 0);
    }

    #[test]
    fn waits_for_every_blocker() {
        let temp = TempDir::new().unwrap();
        let state = manager(&temp);
        let first = add(&state, "first");
        let second = add(&state, "second");
        let dependent = add(&state, "gated");
        block_on(&state, dependent, vec![first, second]);

        finish(&state, first);
        let resolver = DependencyResolver::new(&state);
        assert_eq!(resolver.auto_run().unwrap(), 0);
        assert_eq!(state.get_task(dependent).unwrap().status, Status::Blocked);

        finish(&state, second);
        assert_eq!(resolver.auto_run().unwrap(), 1);
    }

    #[test]
    fn dangling_blocker_stays_blocked_with_warning() {
        let temp = TempDir::new().unwrap();
        let state = manager(&temp);
        let dependent = add(&state, "orphaned");
        block_on(&state, dependent, vec![TaskId::new(999)]);

        let resolver = DependencyResolver::new(&state);
        let report = resolver.resolve().unwrap();
        assert!(report.unblocked.is_empty());
        assert_eq!(report.dangling.len(), 1);
        assert_eq!(report.dangling[0].task_id, dependent);
        assert_eq!(report.dangling[0].blocker_id, TaskId::new(999));
        assert_eq!(state.get_task(dependent).unwrap().status, Status::Blocked);
    }

    #[test]
    fn unblocked_task_records_resolver_in_log() {
        let temp = TempDir::new().unwrap();
        let state = manager(&temp);
        let blocker = add(&state, "B");
        let dependent = add(&state, "A");
        block_on(&state, dependent, vec![blocker]);
        finish(&state, blocker);

        DependencyResolver::new(&state).auto_run().unwrap();

        let task = state.get_task(dependent).unwrap();
        let last = task.execution_log.last().unwrap();
        assert_eq!(last.agent.as_deref(), Some(RESOLVER_AGENT));
    }
}
