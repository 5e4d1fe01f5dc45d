//! Text renderers for the dependency graph
//!
//! The graph itself knows nothing about presentation; a renderer is picked
//! by name and handed the graph only when a visualization is requested.

use crate::error::Result;
use crate::runner::TaskGraph;
use serde_json::json;
use std::collections::HashSet;
use std::fmt::Write;

/// Turns a task graph into text
pub trait GraphRenderer {
    fn render(&self, graph: &TaskGraph) -> Result<String>;
}

/// Graphviz `digraph` text
pub struct DotRenderer;

/// Indented `+-` tree from each root
///
/// A task reachable along several paths is expanded once; later
/// occurrences are marked `(see above)`.
pub struct TreeRenderer;

/// Node-link JSON document
pub struct JsonRenderer;

/// Names accepted by [`renderer_for`]
pub const RENDERER_NAMES: &[&str] = &["dot", "tree", "json"];

/// Look up a renderer by format name
pub fn renderer_for(format: &str) -> Option<Box<dyn GraphRenderer>> {
    match format {
        "dot" => Some(Box::new(DotRenderer)),
        "tree" => Some(Box::new(TreeRenderer)),
        "json" => Some(Box::new(JsonRenderer)),
        _ => None,
    }
}

impl GraphRenderer for DotRenderer {
    fn render(&self, graph: &TaskGraph) -> Result<String> {
        let mut out = String::from("digraph tasks {\n");
        for id in graph.ids() {
            match graph.name(id) {
                Some(name) => {
                    let _ = writeln!(out, "    {} [tooltip={}];", quote(id), quote(name));
                }
                None => {
                    let _ = writeln!(out, "    {};", quote(id));
                }
            }
        }
        for (from, to) in graph.edges() {
            let _ = writeln!(out, "    {} -> {};", quote(from), quote(to));
        }
        out.push_str("}\n");
        Ok(out)
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

impl GraphRenderer for TreeRenderer {
    fn render(&self, graph: &TaskGraph) -> Result<String> {
        let mut out = String::new();
        let mut printed = HashSet::new();
        for root in graph.roots() {
            out.push_str(root);
            out.push('\n');
            printed.insert(root);
            write_children(graph, root, 0, &mut printed, &mut out);
        }
        Ok(out)
    }
}

fn write_children<'g>(
    graph: &'g TaskGraph,
    id: &str,
    depth: usize,
    printed: &mut HashSet<&'g str>,
    out: &mut String,
) {
    for child in graph.dependents(id).unwrap_or_default() {
        out.push_str(&"   ".repeat(depth));
        out.push_str("+- ");
        out.push_str(child);
        if printed.insert(child) {
            out.push('\n');
            write_children(graph, child, depth + 1, printed, out);
        } else {
            out.push_str(" (see above)\n");
        }
    }
}

impl GraphRenderer for JsonRenderer {
    fn render(&self, graph: &TaskGraph) -> Result<String> {
        let nodes: Vec<_> = graph
            .ids()
            .map(|id| json!({ "id": id, "name": graph.name(id) }))
            .collect();
        let links: Vec<_> = graph
            .edges()
            .into_iter()
            .map(|(source, target)| json!({ "source": source, "target": target }))
            .collect();

        let doc = json!({ "directed": true, "nodes": nodes, "links": links });
        Ok(serde_json::to_string_pretty(&doc)?)
    }
}
