//! bk health and check command implementations.

use chrono::Utc;
use serde::Serialize;

use crate::cli::CliContext;
use crate::error::Result;
use crate::monitor::HealthMonitor;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::score::{calculate_health_score, HealthScore};
use crate::signals::HealthContext;
use crate::state::TaskFilter;
use crate::task::{TaskId, Task};

pub struct HealthOptions {
    pub id: Option<String>,
    pub json: bool,
    pub quiet: bool,
}

#[derive(Serialize)]
struct TaskHealth {
    task_id: TaskId,
    title: String,
    score: HealthScore,
}

#[derive(Serialize)]
struct HealthOutput {
    tasks: Vec<TaskHealth>,
}

pub fn run_health(ctx: &CliContext, options: HealthOptions) -> Result<()> {
    let all = ctx.state.get_tasks(&TaskFilter::default())?;
    let health_ctx = HealthContext::from_tasks(Utc::now(), &all);

    let selected: Vec<Task> = match &options.id {
        Some(raw) => {
            let id: TaskId = raw.parse()?;
            vec![ctx.state.get_task(id)?]
        }
        None => all.clone(),
    };

    let tasks: Vec<TaskHealth> = selected
        .iter()
        .map(|task| TaskHealth {
            task_id: task.id,
            title: task.title.clone(),
            score: calculate_health_score(task, &health_ctx, &ctx.config.health),
        })
        .collect();

    let mut human = HumanOutput::new("Backlog health");
    for entry in &tasks {
        human.push_detail(format!(
            "{} [{:?}] overall {} (staleness {}, coherence {}, dependencies {}) {}",
            entry.task_id,
            entry.score.status,
            entry.score.overall,
            entry.score.components.staleness,
            entry.score.components.coherence,
            entry.score.components.dependencies,
            entry.title
        ));
    }
    let critical = tasks
        .iter()
        .filter(|t| t.score.overall < 40)
        .count();
    human.push_summary("Tasks", tasks.len().to_string());
    human.push_summary("Critical", critical.to_string());
    if critical > 0 {
        human.push_next_step("bk remediate --dry-run");
    }

    let output = HealthOutput { tasks };
    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "health",
        &output,
        Some(&human),
    )
}

pub fn run_check(ctx: &CliContext, json: bool, quiet: bool) -> Result<()> {
    let monitor = HealthMonitor::new(&ctx.state, ctx.config.health.clone());
    let check = monitor.quick_check()?;

    let mut human = HumanOutput::new("Quick health check");
    human.push_summary("Total", check.total.to_string());
    human.push_summary("Healthy", check.healthy.to_string());
    push_bucket(&mut human, "Stuck", &check.stuck_tasks);
    push_bucket(&mut human, "False completions", &check.false_completions);
    push_bucket(&mut human, "Invalid blocked", &check.invalid_blocked);
    push_bucket(&mut human, "Progress mismatches", &check.progress_mismatches);
    if check.has_issues() {
        human.push_next_step("bk remediate --dry-run");
    }

    emit_success(OutputOptions { json, quiet }, "check", &check, Some(&human))
}

fn push_bucket(human: &mut HumanOutput, label: &str, ids: &[TaskId]) {
    if ids.is_empty() {
        return;
    }
    let list = ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    human.push_summary(label, format!("{} ({list})", ids.len()));
}
