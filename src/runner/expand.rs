//! Parameter expansion
//!
//! A task's command template plus its `params` and `environ` mappings
//! describe a set of concrete invocations: every multi-valued entry is one
//! dimension of a cartesian product. Dimensions are the multi-valued params
//! in declared order followed by the multi-valued environment variables in
//! declared order, and the last dimension varies fastest (odometer order).
//!
//! The expansion is never materialized. Invocation `i` is computed from its
//! index, which makes the sequence restartable and lets workers take a
//! contiguous slice by rank.

use crate::config::{Launchers, Value, PLACEHOLDER};
use crate::error::{ExpansionError, ExpansionResult};
use crate::runner::Task;
use serde::Serialize;
use std::ops::Range;
use std::path::Path;
use tracing::{debug, warn};

/// One concrete command line with its environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    /// Program followed by its arguments
    pub args: Vec<String>,

    /// Environment variables set for this invocation only
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn program(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or("")
    }

    /// Command line joined with spaces, for display
    pub fn command_line(&self) -> String {
        self.args.join(" ")
    }
}

#[derive(Debug, Clone)]
struct Param {
    flag: String,
    /// Empty for a bare flag
    values: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
enum Dim {
    Param(usize),
    Env(usize),
}

/// The lazily evaluated invocations of one task
#[derive(Debug, Clone)]
pub struct Expansion {
    task: String,
    base: Vec<String>,
    params: Vec<Param>,
    environ: Vec<(String, Vec<String>)>,
    dims: Vec<(Dim, usize)>,
    len: usize,
}

impl Expansion {
    /// Id of the task this expansion belongs to
    pub fn task(&self) -> &str {
        &self.task
    }

    /// Number of invocations
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Program and fixed arguments shared by every invocation
    pub fn base(&self) -> &[String] {
        &self.base
    }

    /// Invocation at `index`, or `None` past the end
    pub fn get(&self, index: usize) -> Option<Invocation> {
        if index >= self.len {
            return None;
        }

        // Odometer digits, last dimension fastest
        let mut param_choice = vec![0; self.params.len()];
        let mut env_choice = vec![0; self.environ.len()];
        let mut rest = index;
        for &(dim, size) in self.dims.iter().rev() {
            let digit = rest % size;
            rest /= size;
            match dim {
                Dim::Param(i) => param_choice[i] = digit,
                Dim::Env(i) => env_choice[i] = digit,
            }
        }

        let mut args = self.base.clone();
        for (param, &choice) in self.params.iter().zip(&param_choice) {
            args.push(param.flag.clone());
            if let Some(value) = param.values.get(choice) {
                args.push(value.clone());
            }
        }

        let env = self
            .environ
            .iter()
            .zip(&env_choice)
            .filter_map(|((name, values), &choice)| {
                values.get(choice).map(|v| (name.clone(), v.clone()))
            })
            .collect();

        Some(Invocation { args, env })
    }

    /// Iterate all invocations from the start
    pub fn iter(&self) -> Invocations<'_> {
        Invocations {
            expansion: self,
            range: 0..self.len,
        }
    }

    /// The contiguous block of invocations assigned to `rank` out of `size`
    pub fn slice(&self, rank: usize, size: usize) -> ExpansionResult<Invocations<'_>> {
        Ok(Invocations {
            expansion: self,
            range: slice_bounds(self.len, rank, size)?,
        })
    }
}

/// Iterator over (a range of) an expansion, yielding `(index, invocation)`
#[derive(Debug, Clone)]
pub struct Invocations<'a> {
    expansion: &'a Expansion,
    range: Range<usize>,
}

impl Iterator for Invocations<'_> {
    type Item = (usize, Invocation);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.range.next()?;
        self.expansion.get(index).map(|inv| (index, inv))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.range.size_hint()
    }
}

impl ExactSizeIterator for Invocations<'_> {}

impl<'a> IntoIterator for &'a Expansion {
    type Item = (usize, Invocation);
    type IntoIter = Invocations<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Bounds of the block owned by `rank` when `len` items are split over
/// `size` workers
///
/// Blocks are contiguous and balanced: the first `len % size` ranks get one
/// extra item. Concatenating the blocks of ranks `0..size` yields `0..len`.
pub fn slice_bounds(len: usize, rank: usize, size: usize) -> ExpansionResult<Range<usize>> {
    if size == 0 || rank >= size {
        return Err(ExpansionError::InvalidRank { rank, size });
    }

    let base = len / size;
    let extra = len % size;
    let start = rank * base + rank.min(extra);
    let end = start + base + usize::from(rank < extra);
    Ok(start..end)
}

/// Whether a program can be run as is
pub fn is_executable(program: &str) -> bool {
    which::which(program).is_ok()
}

/// Expand a task, probing the filesystem for executables
pub fn expand(task: &Task, launchers: &Launchers) -> ExpansionResult<Expansion> {
    expand_with(task, launchers, is_executable)
}

/// Expand a task with a custom executability check
pub fn expand_with<F>(task: &Task, launchers: &Launchers, executable: F) -> ExpansionResult<Expansion>
where
    F: Fn(&str) -> bool,
{
    let tokens: Vec<&str> = task.command.split_whitespace().collect();
    let (program, rest) = tokens
        .split_first()
        .ok_or_else(|| ExpansionError::EmptyCommand(task.id.clone()))?;

    let mut base = resolve_program(&task.id, program, launchers, &executable)?;
    base.extend(rest.iter().map(|s| s.to_string()));

    let params: Vec<Param> = task
        .params
        .iter()
        .map(|(flag, value)| Param {
            flag: flag.to_string(),
            values: values_of(value),
        })
        .collect();

    let environ: Vec<(String, Vec<String>)> = task
        .environ
        .iter()
        .map(|(name, value)| (name.to_string(), values_of(value)))
        .collect();

    let mut dims = Vec::new();
    for (i, param) in params.iter().enumerate() {
        if param.values.len() > 1 {
            dims.push((Dim::Param(i), param.values.len()));
        }
    }
    for (i, (_, values)) in environ.iter().enumerate() {
        if values.len() > 1 {
            dims.push((Dim::Env(i), values.len()));
        }
    }

    for (name, value) in task.params.iter().chain(task.environ.iter()) {
        if matches!(value, Value::List(items) if items.is_empty()) {
            warn!(task = %task.id, entry = name, "empty value list, entry contributes no value");
        }
    }

    let len = dims
        .iter()
        .try_fold(1usize, |acc, &(_, size)| acc.checked_mul(size))
        .ok_or_else(|| ExpansionError::TooManyInvocations {
            task: task.id.clone(),
        })?;
    debug!(task = %task.id, program = %base[0], dimensions = dims.len(), invocations = len, "expanded task");

    Ok(Expansion {
        task: task.id.clone(),
        base,
        params,
        environ,
        dims,
        len,
    })
}

fn values_of(value: &Value) -> Vec<String> {
    match value {
        Value::Scalar(s) => vec![s.clone()],
        Value::List(items) => items.clone(),
        Value::Null | Value::Map(_) => Vec::new(),
    }
}

/// Turn the first token of a command into the program prefix
///
/// A launcher template with `%` has it replaced by the program path without
/// its extension; a template without `%` is put in front of the program.
fn resolve_program<F>(
    task: &str,
    program: &str,
    launchers: &Launchers,
    executable: &F,
) -> ExpansionResult<Vec<String>>
where
    F: Fn(&str) -> bool,
{
    if executable(program) {
        return Ok(vec![program.to_string()]);
    }

    let extension = Path::new(program)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    let template = launchers
        .get(extension)
        .filter(|_| !extension.is_empty())
        .ok_or_else(|| ExpansionError::UnsupportedExtension {
            task: task.to_string(),
            program: program.to_string(),
            extension: extension.to_string(),
        })?;

    let mut prefix: Vec<String> = if template.contains(PLACEHOLDER) {
        let stem = &program[..program.len() - extension.len() - 1];
        template
            .split_whitespace()
            .map(|t| t.replace(PLACEHOLDER, stem))
            .collect()
    } else {
        template
            .split_whitespace()
            .map(str::to_string)
            .chain(std::iter::once(program.to_string()))
            .collect()
    };

    if prefix.is_empty() {
        warn!(task, extension, "launcher template is empty, running program as is");
        prefix.push(program.to_string());
    }

    debug!(task, program, launcher = template, "applied launcher");
    Ok(prefix)
}
