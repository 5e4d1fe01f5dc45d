//! Task engine
//!
//! This module turns a parsed configuration into ordered, concrete
//! invocations: interpolation, the task model, dependency ordering,
//! parameter expansion, and finally execution.

pub mod command;
pub mod context;
pub mod expand;
pub mod graph;
pub mod interpolate;
pub mod plan;
pub mod render;
pub mod task;

// Re-export main types
pub use command::*;
pub use context::*;
pub use expand::*;
pub use graph::*;
pub use interpolate::*;
pub use plan::*;
pub use render::*;
pub use task::*;
