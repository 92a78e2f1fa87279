//! bk remediate command implementation.

use chrono::Utc;
use serde::Serialize;

use crate::cli::CliContext;
use crate::error::Result;
use crate::monitor::{detect_health_issues, HealthMonitor};
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::remedy::{AutoRemediationEngine, RemediationOptions, RemediationReport};
use crate::signals::HealthContext;
use crate::state::TaskFilter;
use crate::task::TaskId;

pub struct RemediateOptions {
    pub id: Option<String>,
    pub dry_run: bool,
    pub no_safe: bool,
    pub max_fixes: Option<usize>,
    pub json: bool,
    pub quiet: bool,
}

#[derive(Serialize)]
struct RemediateOutput {
    dry_run: bool,
    reports: Vec<RemediationReport>,
}

pub fn run(ctx: &CliContext, options: RemediateOptions) -> Result<()> {
    let mut engine_options = RemediationOptions::from_config(&ctx.config.remedy);
    engine_options.dry_run = options.dry_run;
    if options.no_safe {
        engine_options.safe_mode = false;
    }
    if let Some(max_fixes) = options.max_fixes {
        engine_options.max_auto_fixes = max_fixes;
    }

    let engine = AutoRemediationEngine::new(&ctx.state, &ctx.config.remedy, engine_options);

    let reports = match &options.id {
        Some(raw) => {
            let id: TaskId = raw.parse()?;
            let all = ctx.state.get_tasks(&TaskFilter::default())?;
            let health_ctx = HealthContext::from_tasks(Utc::now(), &all);
            let task = ctx.state.get_task(id)?;
            let issues = detect_health_issues(&task, &health_ctx, &ctx.config.health);
            if issues.is_empty() {
                Vec::new()
            } else {
                vec![engine.remediate(&task, &issues)]
            }
        }
        None => {
            let monitor = HealthMonitor::new(&ctx.state, ctx.config.health.clone());
            engine.run(&monitor)?
        }
    };

    let output = RemediateOutput {
        dry_run: options.dry_run,
        reports,
    };

    let header = if options.dry_run {
        "Remediation (dry run)"
    } else {
        "Remediation"
    };
    let mut human = HumanOutput::new(header);
    let applied: usize = output.reports.iter().map(|r| r.applied.len()).sum();
    let skipped: usize = output.reports.iter().map(|r| r.skipped.len()).sum();
    human.push_summary("Tasks with findings", output.reports.len().to_string());
    human.push_summary("Applied", applied.to_string());
    human.push_summary("Skipped", skipped.to_string());
    for report in &output.reports {
        for fix in &report.applied {
            human.push_detail(format!("{} {:?}: {}", report.task_id, fix.kind, fix.action));
        }
        for skip in &report.skipped {
            human.push_detail(format!(
                "{} {:?} skipped: {}",
                report.task_id, skip.kind, skip.reason
            ));
        }
        if !report.success {
            human.push_warning(format!("{}: remediation aborted early", report.task_id));
        }
    }
    if options.dry_run && applied > 0 {
        human.push_next_step("bk remediate to apply");
    }

    emit_success(
        OutputOptions {
            json: options.json,
            quiet: options.quiet,
        },
        "remediate",
        &output,
        Some(&human),
    )
}
