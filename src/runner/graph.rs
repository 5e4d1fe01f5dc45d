//! Task dependency graph
//!
//! Nodes are task ids; an edge `P -> T` exists when `T` runs after `P`.
//! The execution order is a depth-first post-order that visits tasks in
//! declaration order and each task's prerequisites in the order they are
//! listed, so the result is stable across runs.

use crate::error::{GraphError, GraphResult};
use crate::runner::Task;
use std::collections::HashMap;
use tracing::debug;

/// Dependency graph over the tasks of a configuration
#[derive(Debug, Clone)]
pub struct TaskGraph {
    ids: Vec<String>,
    names: Vec<Option<String>>,
    index: HashMap<String, usize>,
    /// Incoming edges, in `after` order
    prerequisites: Vec<Vec<usize>>,
    /// Outgoing edges, in declaration order of the dependents
    dependents: Vec<Vec<usize>>,
    order: Vec<usize>,
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

impl TaskGraph {
    /// Build the graph and compute its execution order
    pub fn build(tasks: &[Task]) -> GraphResult<Self> {
        let ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
        let names = tasks.iter().map(|t| t.name.clone()).collect();
        let index: HashMap<String, usize> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        let mut prerequisites = vec![Vec::new(); tasks.len()];
        let mut dependents = vec![Vec::new(); tasks.len()];

        for (t, task) in tasks.iter().enumerate() {
            for prereq in &task.after {
                let p = *index
                    .get(prereq)
                    .ok_or_else(|| GraphError::UnknownPrerequisite {
                        task: task.id.clone(),
                        missing: prereq.clone(),
                    })?;
                if !prerequisites[t].contains(&p) {
                    prerequisites[t].push(p);
                    dependents[p].push(t);
                }
            }
        }

        let mut graph = TaskGraph {
            ids,
            names,
            index,
            prerequisites,
            dependents,
            order: Vec::new(),
        };
        graph.order = graph.topological_order()?;
        debug!(order = ?graph.order(), "computed execution order");

        Ok(graph)
    }

    fn topological_order(&self) -> GraphResult<Vec<usize>> {
        let mut marks = vec![Mark::Unvisited; self.ids.len()];
        let mut path = Vec::new();
        let mut order = Vec::with_capacity(self.ids.len());

        for node in 0..self.ids.len() {
            self.visit(node, &mut marks, &mut path, &mut order)?;
        }

        Ok(order)
    }

    fn visit(
        &self,
        node: usize,
        marks: &mut [Mark],
        path: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> GraphResult<()> {
        match marks[node] {
            Mark::Done => return Ok(()),
            Mark::OnPath => {
                let start = path.iter().position(|&n| n == node).unwrap_or(0);
                let mut members: Vec<String> =
                    path[start..].iter().map(|&n| self.ids[n].clone()).collect();
                members.push(self.ids[node].clone());
                return Err(GraphError::DependencyCycle(members));
            }
            Mark::Unvisited => {}
        }

        marks[node] = Mark::OnPath;
        path.push(node);
        for &prereq in &self.prerequisites[node] {
            self.visit(prereq, marks, path, order)?;
        }
        path.pop();
        marks[node] = Mark::Done;
        order.push(node);

        Ok(())
    }

    /// All task ids in execution order
    pub fn order(&self) -> Vec<&str> {
        self.order.iter().map(|&n| self.ids[n].as_str()).collect()
    }

    /// The given targets and their transitive prerequisites, in execution order
    pub fn order_for<S: AsRef<str>>(&self, targets: &[S]) -> GraphResult<Vec<&str>> {
        let mut required = vec![false; self.ids.len()];
        let mut stack = Vec::new();

        for target in targets {
            let target = target.as_ref();
            let node = *self
                .index
                .get(target)
                .ok_or_else(|| GraphError::TaskNotFound(target.to_string()))?;
            stack.push(node);
        }

        while let Some(node) = stack.pop() {
            if !required[node] {
                required[node] = true;
                stack.extend(&self.prerequisites[node]);
            }
        }

        Ok(self
            .order
            .iter()
            .filter(|&&n| required[n])
            .map(|&n| self.ids[n].as_str())
            .collect())
    }

    /// Tasks without prerequisites, in declaration order
    pub fn roots(&self) -> Vec<&str> {
        (0..self.ids.len())
            .filter(|&n| self.prerequisites[n].is_empty())
            .map(|n| self.ids[n].as_str())
            .collect()
    }

    /// Direct prerequisites of a task
    pub fn dependencies(&self, id: &str) -> Option<Vec<&str>> {
        self.index
            .get(id)
            .map(|&n| self.names_of(&self.prerequisites[n]))
    }

    /// Tasks that run directly after the given one
    pub fn dependents(&self, id: &str) -> Option<Vec<&str>> {
        self.index.get(id).map(|&n| self.names_of(&self.dependents[n]))
    }

    /// Every edge as `(prerequisite, dependent)`
    pub fn edges(&self) -> Vec<(&str, &str)> {
        let mut edges = Vec::new();
        for (t, prereqs) in self.prerequisites.iter().enumerate() {
            for &p in prereqs {
                edges.push((self.ids[p].as_str(), self.ids[t].as_str()));
            }
        }
        edges
    }

    /// Task ids in declaration order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Description of a task, if it has one
    pub fn name(&self, id: &str) -> Option<&str> {
        self.index
            .get(id)
            .and_then(|&n| self.names[n].as_deref())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn names_of(&self, nodes: &[usize]) -> Vec<&str> {
        nodes.iter().map(|&n| self.ids[n].as_str()).collect()
    }
}
