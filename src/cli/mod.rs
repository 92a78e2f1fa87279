//! Command-line interface for bk
//!
//! This module defines the CLI structure using clap derive macros.
//! Command implementations live in the submodules.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::error::Result;
use crate::state::StateManager;
use crate::storage::Storage;

mod health;
mod init;
mod remedy;
mod resolve;
mod task;

/// bk - backlog tracker
///
/// A CLI that keeps a project's task backlog internally consistent:
/// a journaled single-writer store, a status state machine, dependency
/// resolution, health scoring, and bounded auto-remediation.
#[derive(Parser, Debug)]
#[command(name = "bk")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Project root holding .backlog/ (defaults to current directory)
    #[arg(long, global = true, env = "BK_DIR")]
    pub dir: Option<PathBuf>,

    /// Agent identity recorded in execution-log entries
    #[arg(long, global = true, env = "BK_AGENT")]
    pub agent: Option<String>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a backlog store in the project root
    Init,

    /// Add a task to the backlog
    Add {
        /// Task title
        title: String,

        /// Free-form category, e.g. "api" or "infra"
        #[arg(long)]
        category: Option<String>,

        /// Priority: P0-P3 (default P2)
        #[arg(long)]
        priority: Option<String>,

        /// Estimated effort in hours
        #[arg(long)]
        estimate: Option<f64>,

        /// Blocker task ids, comma separated
        #[arg(long = "blocked-by", value_delimiter = ',')]
        blocked_by: Vec<String>,

        /// Rationale recorded in the execution log
        #[arg(long)]
        note: Option<String>,
    },

    /// List tasks
    List {
        /// Filter by status
        #[arg(long)]
        status: Option<String>,

        /// Filter by priority
        #[arg(long)]
        priority: Option<String>,

        /// Filter by category
        #[arg(long)]
        category: Option<String>,
    },

    /// Show one task in full
    Show {
        /// Task id (TASK-007, task-7, or 7)
        id: String,
    },

    /// Start a task (shortcut for --status in-progress)
    Start {
        id: String,

        #[arg(long)]
        note: Option<String>,
    },

    /// Update task fields
    Update {
        id: String,

        /// New status: not-started, in-progress, blocked, completed
        #[arg(long)]
        status: Option<String>,

        /// Progress percentage, clamped to 0-100
        #[arg(long)]
        progress: Option<i64>,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        priority: Option<String>,

        /// Estimated effort in hours
        #[arg(long)]
        estimate: Option<f64>,

        /// Replace the blocker list, comma separated
        #[arg(long = "blocked-by", value_delimiter = ',')]
        blocked_by: Option<Vec<String>>,

        /// Replace the blocks list, comma separated
        #[arg(long, value_delimiter = ',')]
        blocks: Option<Vec<String>>,

        /// Replace the parallel-with list, comma separated
        #[arg(long = "parallel-with", value_delimiter = ',')]
        parallel_with: Option<Vec<String>>,

        /// Clear the needs-attention flag
        #[arg(long)]
        clear_attention: bool,

        #[arg(long)]
        note: Option<String>,
    },

    /// Complete a task (requires progress already at 100)
    Complete {
        id: String,

        #[arg(long)]
        note: Option<String>,
    },

    /// Reopen a completed task back to not-started
    Reopen {
        id: String,

        #[arg(long)]
        note: Option<String>,
    },

    /// Block a task on one or more others
    Block {
        id: String,

        /// Blocker task ids, comma separated
        #[arg(long = "on", value_delimiter = ',', required = true)]
        on: Vec<String>,

        #[arg(long)]
        note: Option<String>,
    },

    /// Unblock tasks whose blockers have all completed
    Resolve,

    /// Health scores for the backlog (or one task)
    Health {
        id: Option<String>,
    },

    /// Quick health summary across all tasks
    Check,

    /// Apply bounded automatic fixes for detected issues
    Remediate {
        /// Limit to one task
        id: Option<String>,

        /// Compute actions without mutating anything
        #[arg(long)]
        dry_run: bool,

        /// Apply low-confidence fixes too
        #[arg(long)]
        no_safe: bool,

        /// Override the per-task fix budget
        #[arg(long)]
        max_fixes: Option<usize>,
    },

    /// Recent mutation events, most recent first
    Log {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

/// Shared handle the command implementations work against
pub(crate) struct CliContext {
    pub state: StateManager,
    pub config: Config,
    pub agent: Option<String>,
}

pub(crate) fn load_context(dir: Option<PathBuf>, agent: Option<String>) -> Result<CliContext> {
    let root = match dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let config = Config::load(&root)?;
    let storage = Storage::new(root);
    let state = StateManager::new(storage, &config.store);
    Ok(CliContext {
        state,
        config,
        agent,
    })
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let ctx = load_context(self.dir, self.agent)?;
        let json = self.json;
        let quiet = self.quiet;

        match self.command {
            Commands::Init => init::run(&ctx, json, quiet),
            Commands::Add {
                title,
                category,
                priority,
                estimate,
                blocked_by,
                note,
            } => task::run_add(
                &ctx,
                task::AddOptions {
                    title,
                    category,
                    priority,
                    estimate,
                    blocked_by,
                    note,
                    json,
                    quiet,
                },
            ),
            Commands::List {
                status,
                priority,
                category,
            } => task::run_list(
                &ctx,
                task::ListOptions {
                    status,
                    priority,
                    category,
                    json,
                    quiet,
                },
            ),
            Commands::Show { id } => task::run_show(&ctx, task::ShowOptions { id, json, quiet }),
            Commands::Start { id, note } => {
                task::run_start(&ctx, task::StartOptions { id, note, json, quiet })
            }
            Commands::Update {
                id,
                status,
                progress,
                title,
                category,
                priority,
                estimate,
                blocked_by,
                blocks,
                parallel_with,
                clear_attention,
                note,
            } => task::run_update(
                &ctx,
                task::UpdateOptions {
                    id,
                    status,
                    progress,
                    title,
                    category,
                    priority,
                    estimate,
                    blocked_by,
                    blocks,
                    parallel_with,
                    clear_attention,
                    note,
                    json,
                    quiet,
                },
            ),
            Commands::Complete { id, note } => {
                task::run_complete(&ctx, task::CompleteOptions { id, note, json, quiet })
            }
            Commands::Reopen { id, note } => {
                task::run_reopen(&ctx, task::ReopenOptions { id, note, json, quiet })
            }
            Commands::Block { id, on, note } => {
                task::run_block(&ctx, task::BlockOptions { id, on, note, json, quiet })
            }
            Commands::Resolve => resolve::run(&ctx, json, quiet),
            Commands::Health { id } => health::run_health(&ctx, health::HealthOptions {
                id,
                json,
                quiet,
            }),
            Commands::Check => health::run_check(&ctx, json, quiet),
            Commands::Remediate {
                id,
                dry_run,
                no_safe,
                max_fixes,
            } => remedy::run(
                &ctx,
                remedy::RemediateOptions {
                    id,
                    dry_run,
                    no_safe,
                    max_fixes,
                    json,
                    quiet,
                },
            ),
            Commands::Log { limit } => task::run_log(&ctx, task::LogOptions { limit, json, quiet }),
        }
    }
}
