//! bk resolve command implementation.

use serde::Serialize;

use crate::cli::CliContext;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::resolver::{DependencyResolver, ResolutionReport};

#[derive(Serialize)]
struct ResolveOutput {
    unblocked_count: usize,
    #[serde(flatten)]
    report: ResolutionReport,
}

pub fn run(ctx: &CliContext, json: bool, quiet: bool) -> Result<()> {
    let resolver = DependencyResolver::new(&ctx.state);
    let report = resolver.resolve()?;

    let output = ResolveOutput {
        unblocked_count: report.unblocked.len(),
        report,
    };

    let mut human = HumanOutput::new("Dependency resolution");
    human.push_summary("Unblocked", output.unblocked_count.to_string());
    for id in &output.report.unblocked {
        human.push_detail(format!("{id} -> not-started"));
    }
    for dangling in &output.report.dangling {
        human.push_warning(format!(
            "{} is blocked by {}, which does not exist",
            dangling.task_id, dangling.blocker_id
        ));
    }
    if output.unblocked_count > 0 {
        human.push_next_step("bk list --status not-started");
    }

    emit_success(OutputOptions { json, quiet }, "resolve", &output, Some(&human))
}
