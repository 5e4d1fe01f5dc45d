//! Task model
//!
//! This module contains the normalized, fully resolved representation of the
//! tasks declared in a configuration.

use crate::config::{
    self, is_task_entry, Config, Section, Value, AFTER, COMMAND, ENVIRON, NAME, PARAMS, PROGRAM,
};
use crate::error::{ConfigError, ExpansionError, ExpansionResult, Result};
use crate::runner::interpolate::{check_value_syntax, Resolver};
use crate::runner::{Context, TaskId};
use tracing::debug;

/// Runtime task representation
///
/// This differs from a raw configuration entry in that every `${...}`
/// reference has been resolved and reserved fields have their final shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    /// Entry id, unique within the configuration
    pub id: String,

    /// Identity handed out by the loading context
    pub uid: TaskId,

    /// Free-form description
    pub name: Option<String>,

    /// Command template (single line)
    pub command: String,

    /// Flag -> value, scalar or list, in declaration order
    pub params: Section,

    /// Ids of prerequisite tasks
    pub after: Vec<String>,

    /// Environment variable -> value, scalar or list, in declaration order
    pub environ: Section,

    /// Every resolved field, including free-form ones
    pub fields: Section,
}

impl Task {
    /// Build a task from a raw entry, resolving it against the configuration
    pub fn from_entry(id: &str, raw: &Section, config: &Config, ctx: &mut Context) -> Result<Self> {
        config::validate_task(id, raw)?;

        let fields = Resolver::new(config).resolve_section(id, raw)?;

        let command = match fields.get(COMMAND).or_else(|| fields.get(PROGRAM)) {
            Some(Value::Scalar(s)) => s.trim().to_string(),
            Some(Value::List(lines)) => {
                return Err(ExpansionError::MultiLineCommand {
                    task: id.to_string(),
                    lines: lines.len(),
                }
                .into())
            }
            _ => return Err(ExpansionError::EmptyCommand(id.to_string()).into()),
        };
        if command.is_empty() {
            return Err(ExpansionError::EmptyCommand(id.to_string()).into());
        }

        let name = match fields.get(NAME) {
            Some(Value::Scalar(s)) => Some(s.clone()),
            Some(Value::List(lines)) => Some(lines.join(" ")),
            _ => None,
        };

        let after = match fields.get(AFTER) {
            Some(Value::Scalar(s)) => vec![s.trim().to_string()],
            Some(Value::List(items)) => items.iter().map(|s| s.trim().to_string()).collect(),
            _ => Vec::new(),
        };

        let params = mapping_field(&fields, PARAMS);
        let environ = mapping_field(&fields, ENVIRON);

        let uid = ctx.next_task_id();
        debug!(task = id, %uid, %command, "loaded task");

        Ok(Task {
            id: id.to_string(),
            uid,
            name,
            command,
            params,
            after,
            environ,
            fields,
        })
    }

    /// Description for listings: the `name` field, or the id
    pub fn description(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Number of concrete invocations this task expands to
    pub fn invocation_count(&self) -> ExpansionResult<usize> {
        self.params
            .iter()
            .chain(self.environ.iter())
            .try_fold(1usize, |acc, (_, v)| acc.checked_mul(v.arity()))
            .ok_or_else(|| ExpansionError::TooManyInvocations {
                task: self.id.clone(),
            })
    }
}

fn mapping_field(fields: &Section, key: &str) -> Section {
    fields
        .get(key)
        .and_then(Value::as_map)
        .cloned()
        .unwrap_or_default()
}

/// Load every task of a configuration, in declaration order
///
/// The configuration is validated first. Section values are only resolved
/// when referenced, but their syntax is checked here so that errors surface
/// even for unused sections.
pub fn load_tasks(config: &Config, ctx: &mut Context) -> Result<Vec<Task>> {
    config::validate_config(config)?;

    let mut tasks = Vec::new();
    for id in config.ids() {
        let raw = config
            .entry(id)
            .ok_or_else(|| ConfigError::NotAMapping(id.to_string()))?;

        if is_task_entry(raw) {
            tasks.push(Task::from_entry(id, raw, config, ctx)?);
        } else {
            for (key, value) in raw.iter() {
                check_value_syntax(value, id, key)?;
            }
        }
    }

    Ok(tasks)
}
