//! Invocation execution
//!
//! This module spawns the concrete invocations of a plan. Each one runs with
//! its own environment variables added on top of the inherited environment.

use crate::error::{ExecutionError, ExecutionResult};
use crate::runner::{Context, PlannedInvocation, Verbosity};
use colored::Colorize;
use std::process::{Command as StdCommand, Stdio};
use tracing::debug;

/// Execute one invocation in the given context
pub fn execute_invocation(planned: &PlannedInvocation, ctx: &Context) -> ExecutionResult<()> {
    let inv = &planned.invocation;

    if ctx.verbosity >= Verbosity::Normal {
        eprintln!("{} {}", "[RUN]".green().bold(), describe(planned));
    }

    let (program, args) = inv
        .args
        .split_first()
        .ok_or_else(|| ExecutionError::Spawn {
            task: planned.task.clone(),
            index: planned.index,
            error: "empty command line".to_string(),
        })?;

    let mut command = StdCommand::new(program);
    command.args(args);
    command.current_dir(&ctx.working_dir);
    command.envs(inv.env.iter().map(|(k, v)| (k, v)));

    command.stdin(Stdio::inherit());
    command.stdout(Stdio::inherit());
    command.stderr(Stdio::inherit());

    debug!(task = %planned.task, index = planned.index, ?command, "spawning");

    let status = command.status().map_err(|e| ExecutionError::Spawn {
        task: planned.task.clone(),
        index: planned.index,
        error: e.to_string(),
    })?;

    if !status.success() {
        return Err(ExecutionError::CommandFailed {
            task: planned.task.clone(),
            index: planned.index,
            code: status.code(),
        });
    }

    Ok(())
}

/// Execute invocations in order, stopping at the first failure
///
/// Returns the number of invocations that ran.
pub fn execute_all<I>(invocations: I, ctx: &Context) -> ExecutionResult<usize>
where
    I: IntoIterator<Item = PlannedInvocation>,
{
    let mut count = 0;
    for planned in invocations {
        execute_invocation(&planned, ctx)?;
        count += 1;
    }
    Ok(count)
}

/// Human readable form: `task#index: VAR=value program args...`
pub fn describe(planned: &PlannedInvocation) -> String {
    let mut out = format!("{}#{}: ", planned.task, planned.index);
    for (name, value) in &planned.invocation.env {
        out.push_str(&format!("{}={} ", name, value));
    }
    out.push_str(&planned.invocation.command_line());
    out
}
