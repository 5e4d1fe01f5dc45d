//! Execution plans
//!
//! A plan ties the engine together: load and resolve the tasks, order them by
//! dependency, and expand each one into its invocations.

use crate::config::Config;
use crate::error::{ExpansionError, Result};
use crate::runner::{expand, load_tasks, slice_bounds, Context, Expansion, Invocation, Task, TaskGraph};
use serde::Serialize;
use tracing::info;

/// An invocation together with where it comes from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedInvocation {
    /// Task id
    pub task: String,

    /// Position within the task's expansion
    pub index: usize,

    #[serde(flatten)]
    pub invocation: Invocation,
}

/// Ordered, expanded tasks ready to hand to an executor
#[derive(Debug, Clone)]
pub struct Plan {
    tasks: Vec<Task>,
    graph: TaskGraph,
    expansions: Vec<Expansion>,
    len: usize,
}

#[derive(Serialize)]
struct PlanDocument<'a> {
    order: Vec<&'a str>,
    invocations: Vec<PlannedInvocation>,
}

impl Plan {
    /// Build a plan for `targets` (every task when empty)
    pub fn build<S: AsRef<str>>(config: &Config, ctx: &mut Context, targets: &[S]) -> Result<Self> {
        let tasks = load_tasks(config, ctx)?;
        let graph = TaskGraph::build(&tasks)?;

        let order = if targets.is_empty() {
            graph.order()
        } else {
            graph.order_for(targets)?
        };

        let mut expansions = Vec::with_capacity(order.len());
        let mut len = 0usize;
        for id in order {
            if let Some(task) = tasks.iter().find(|t| t.id == id) {
                let expansion = expand(task, &ctx.launchers)?;
                len = len
                    .checked_add(expansion.len())
                    .ok_or_else(|| ExpansionError::TooManyInvocations {
                        task: task.id.clone(),
                    })?;
                expansions.push(expansion);
            }
        }

        let plan = Plan {
            tasks,
            graph,
            expansions,
            len,
        };
        info!(
            tasks = plan.expansions.len(),
            invocations = plan.len(),
            "built execution plan"
        );
        Ok(plan)
    }

    /// Every loaded task, in declaration order
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Ids of the planned tasks, in execution order
    pub fn order(&self) -> Vec<&str> {
        self.expansions.iter().map(Expansion::task).collect()
    }

    /// Expansions of the planned tasks, in execution order
    pub fn expansions(&self) -> &[Expansion] {
        &self.expansions
    }

    /// Total number of invocations
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All invocations in execution order
    pub fn iter(&self) -> impl Iterator<Item = PlannedInvocation> + '_ {
        self.expansions.iter().flat_map(|expansion| {
            expansion.iter().map(move |(index, invocation)| PlannedInvocation {
                task: expansion.task().to_string(),
                index,
                invocation,
            })
        })
    }

    /// The contiguous block of the plan assigned to `rank` out of `size`
    ///
    /// Invocations are sliced across task boundaries, so every worker gets a
    /// balanced share of the whole plan.
    pub fn slice(&self, rank: usize, size: usize) -> Result<Vec<PlannedInvocation>> {
        let bounds = slice_bounds(self.len(), rank, size)?;
        Ok(self
            .iter()
            .skip(bounds.start)
            .take(bounds.len())
            .collect())
    }

    /// JSON document with the task order and every invocation
    pub fn to_json(&self) -> Result<String> {
        let doc = PlanDocument {
            order: self.order(),
            invocations: self.iter().collect(),
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }
}
