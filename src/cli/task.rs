//! bk task command implementations: add, list, show, start, update,
//! complete, reopen, block, log.

use serde::Serialize;

use crate::cli::CliContext;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::state::{Event, TaskFilter};
use crate::task::{NewTask, Priority, Status, Task, TaskId, TaskPatch};

pub struct AddOptions {
    pub title: String,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub estimate: Option<f64>,
    pub blocked_by: Vec<String>,
    pub note: Option<String>,
    pub json: bool,
    pub quiet: bool,
}

pub struct ListOptions {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub json: bool,
    pub quiet: bool,
}

pub struct ShowOptions {
    pub id: String,
    pub json: bool,
    pub quiet: bool,
}

pub struct StartOptions {
    pub id: String,
    pub note: Option<String>,
    pub json: bool,
    pub quiet: bool,
}

pub struct UpdateOptions {
    pub id: String,
    pub status: Option<String>,
    pub progress: Option<i64>,
    pub title: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub estimate: Option<f64>,
    pub blocked_by: Option<Vec<String>>,
    pub blocks: Option<Vec<String>>,
    pub parallel_with: Option<Vec<String>>,
    pub clear_attention: bool,
    pub note: Option<String>,
    pub json: bool,
    pub quiet: bool,
}

pub struct CompleteOptions {
    pub id: String,
    pub note: Option<String>,
    pub json: bool,
    pub quiet: bool,
}

pub struct ReopenOptions {
    pub id: String,
    pub note: Option<String>,
    pub json: bool,
    pub quiet: bool,
}

pub struct BlockOptions {
    pub id: String,
    pub on: Vec<String>,
    pub note: Option<String>,
    pub json: bool,
    pub quiet: bool,
}

pub struct LogOptions {
    pub limit: usize,
    pub json: bool,
    pub quiet: bool,
}

#[derive(Serialize)]
struct TaskCreatedOutput {
    id: TaskId,
    status: Status,
    priority: Priority,
}

#[derive(Serialize)]
struct TaskListOutput {
    tasks: Vec<Task>,
    total: usize,
}

#[derive(Serialize)]
struct EventLogOutput {
    events: Vec<Event>,
    total: usize,
}

pub fn run_add(ctx: &CliContext, options: AddOptions) -> Result<()> {
    let blocked_by = parse_ids(&options.blocked_by)?;
    let priority = options
        .priority
        .as_deref()
        .map(str::parse::<Priority>)
        .transpose()?;

    let task = ctx.state.add_task(NewTask {
        title: options.title,
        category: options.category,
        priority,
        estimate_hours: options.estimate,
        blocked_by,
        note: options.note,
        agent: ctx.agent.clone(),
    })?;

    let output = TaskCreatedOutput {
        id: task.id,
        status: task.status,
        priority: task.priority,
    };

    let mut human = HumanOutput::new("Task created");
    human.push_summary("ID", task.id.to_string());
    human.push_summary("Title", task.title.clone());
    human.push_summary("Status", task.status.to_string());
    human.push_summary("Priority", task.priority.to_string());
    human.push_next_step(format!("bk start {}", task.id));

    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "add",
        &output,
        Some(&human),
    )
}

pub fn run_list(ctx: &CliContext, options: ListOptions) -> Result<()> {
    let filter = TaskFilter {
        status: options.status.as_deref().map(str::parse).transpose()?,
        priority: options.priority.as_deref().map(str::parse).transpose()?,
        category: options.category,
        ids: None,
    };

    let tasks = ctx.state.get_tasks(&filter)?;
    let output = TaskListOutput {
        total: tasks.len(),
        tasks,
    };

    let mut human = HumanOutput::new(format!("{} task(s)", output.total));
    for task in &output.tasks {
        human.push_detail(format_task_line(task));
    }
    if output.total == 0 {
        human.push_next_step("bk add \"<title>\"");
    }

    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "list",
        &output,
        Some(&human),
    )
}

pub fn run_show(ctx: &CliContext, options: ShowOptions) -> Result<()> {
    let id: TaskId = options.id.parse()?;
    let task = ctx.state.get_task(id)?;

    let mut human = HumanOutput::new(format!("{}: {}", task.id, task.title));
    human.push_summary("Status", task.status.to_string());
    human.push_summary("Priority", task.priority.to_string());
    human.push_summary("Progress", format!("{}%", task.progress));
    if let Some(category) = &task.category {
        human.push_summary("Category", category.clone());
    }
    if let Some(estimate) = task.estimate_hours {
        human.push_summary("Estimate", format!("{estimate}h"));
    }
    if !task.dependencies.blocked_by.is_empty() {
        human.push_summary("Blocked by", join_ids(&task.dependencies.blocked_by));
    }
    if !task.dependencies.blocks.is_empty() {
        human.push_summary("Blocks", join_ids(&task.dependencies.blocks));
    }
    if !task.dependencies.parallel_with.is_empty() {
        human.push_summary("Parallel with", join_ids(&task.dependencies.parallel_with));
    }
    human.push_summary("Created", task.created_at.to_rfc3339());
    if let Some(started) = task.started_at {
        human.push_summary("Started", started.to_rfc3339());
    }
    if let Some(completed) = task.completed_at {
        human.push_summary("Completed", completed.to_rfc3339());
    }
    if task.needs_attention {
        human.push_warning("flagged: needs attention");
    }
    for entry in task.execution_log.iter().rev().take(5) {
        let agent = entry.agent.as_deref().unwrap_or("-");
        human.push_detail(format!(
            "{} [{}] {}% {}",
            entry.timestamp.to_rfc3339(),
            agent,
            entry.progress,
            entry.notes
        ));
    }

    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "show",
        &task,
        Some(&human),
    )
}

pub fn run_start(ctx: &CliContext, options: StartOptions) -> Result<()> {
    let id: TaskId = options.id.parse()?;
    let task = ctx.state.update_task(
        id,
        TaskPatch {
            status: Some(Status::InProgress),
            note: options.note,
            agent: ctx.agent.clone(),
            ..TaskPatch::default()
        },
    )?;

    let mut human = HumanOutput::new("Task started");
    human.push_summary("ID", task.id.to_string());
    human.push_summary("Status", task.status.to_string());
    human.push_next_step(format!("bk update {} --progress <pct>", task.id));

    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "start",
        &task,
        Some(&human),
    )
}

pub fn run_update(ctx: &CliContext, options: UpdateOptions) -> Result<()> {
    let id: TaskId = options.id.parse()?;
    let patch = TaskPatch {
        title: options.title,
        category: options.category,
        priority: options.priority.as_deref().map(str::parse).transpose()?,
        status: options.status.as_deref().map(str::parse).transpose()?,
        progress: options.progress,
        blocked_by: options.blocked_by.as_deref().map(parse_ids).transpose()?,
        blocks: options.blocks.as_deref().map(parse_ids).transpose()?,
        parallel_with: options
            .parallel_with
            .as_deref()
            .map(parse_ids)
            .transpose()?,
        estimate_hours: options.estimate,
        needs_attention: options.clear_attention.then_some(false),
        note: options.note,
        agent: ctx.agent.clone(),
    };

    let task = ctx.state.update_task(id, patch)?;

    let mut human = HumanOutput::new("Task updated");
    human.push_summary("ID", task.id.to_string());
    human.push_summary("Status", task.status.to_string());
    human.push_summary("Progress", format!("{}%", task.progress));

    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "update",
        &task,
        Some(&human),
    )
}

pub fn run_complete(ctx: &CliContext, options: CompleteOptions) -> Result<()> {
    let id: TaskId = options.id.parse()?;
    let task = ctx
        .state
        .complete_task(id, options.note, ctx.agent.clone())?;

    let mut human = HumanOutput::new("Task completed");
    human.push_summary("ID", task.id.to_string());
    human.push_summary("Title", task.title.clone());
    human.push_next_step("bk resolve to unblock dependent tasks");

    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "complete",
        &task,
        Some(&human),
    )
}

pub fn run_reopen(ctx: &CliContext, options: ReopenOptions) -> Result<()> {
    let id: TaskId = options.id.parse()?;
    let task = ctx.state.update_task(
        id,
        TaskPatch {
            status: Some(Status::NotStarted),
            note: options.note.or_else(|| Some("reopened".to_string())),
            agent: ctx.agent.clone(),
            ..TaskPatch::default()
        },
    )?;

    let mut human = HumanOutput::new("Task reopened");
    human.push_summary("ID", task.id.to_string());
    human.push_summary("Status", task.status.to_string());

    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "reopen",
        &task,
        Some(&human),
    )
}

pub fn run_block(ctx: &CliContext, options: BlockOptions) -> Result<()> {
    let id: TaskId = options.id.parse()?;
    let blockers = parse_ids(&options.on)?;

    let task = ctx.state.update_task(
        id,
        TaskPatch {
            status: Some(Status::Blocked),
            blocked_by: Some(blockers),
            note: options.note,
            agent: ctx.agent.clone(),
            ..TaskPatch::default()
        },
    )?;

    let mut human = HumanOutput::new("Task blocked");
    human.push_summary("ID", task.id.to_string());
    human.push_summary("Blocked by", join_ids(&task.dependencies.blocked_by));
    human.push_next_step("bk resolve once blockers complete");

    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "block",
        &task,
        Some(&human),
    )
}

pub fn run_log(ctx: &CliContext, options: LogOptions) -> Result<()> {
    let events = ctx.state.recent_events(options.limit)?;
    let output = EventLogOutput {
        total: events.len(),
        events,
    };

    let mut human = HumanOutput::new(format!("{} event(s)", output.total));
    for event in &output.events {
        human.push_detail(format!(
            "{} {:?} {}",
            event.timestamp.to_rfc3339(),
            event.operation,
            event.task_id
        ));
    }

    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "log",
        &output,
        Some(&human),
    )
}

fn parse_ids(raw: &[String]) -> Result<Vec<TaskId>> {
    raw.iter()
        .filter(|value| !value.trim().is_empty())
        .map(|value| value.parse())
        .collect()
}

fn join_ids(ids: &[TaskId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_task_line(task: &Task) -> String {
    let attention = if task.needs_attention { " [!]" } else { "" };
    format!(
        "{} [{}] {} {}%{} {}",
        task.id, task.priority, task.status, task.progress, attention, task.title
    )
}
