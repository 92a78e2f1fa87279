//! bk init command implementation.

use serde::Serialize;

use crate::cli::CliContext;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput, OutputOptions};

#[derive(Serialize)]
struct InitOutput {
    root: String,
    store_dir: String,
    created: bool,
}

pub fn run(ctx: &CliContext, json: bool, quiet: bool) -> Result<()> {
    let already = ctx.state.storage().is_initialized();
    ctx.state.init()?;

    let output = InitOutput {
        root: ctx.state.storage().root().display().to_string(),
        store_dir: ctx.state.storage().store_dir().display().to_string(),
        created: !already,
    };

    let mut human = HumanOutput::new(if already {
        "Backlog store already initialized"
    } else {
        "Backlog store initialized"
    });
    human.push_summary("Store", output.store_dir.clone());
    if !already {
        human.push_next_step("bk add \"<title>\" to create the first task");
    }

    emit_success(OutputOptions { json, quiet }, "init", &output, Some(&human))
}
