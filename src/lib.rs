//! psweep - A YAML-based parameter-sweep task launcher
//!
//! psweep reads tasks described as command templates with named parameters,
//! resolves `${...}` references between them, orders them by their declared
//! prerequisites and expands list-valued parameters into every concrete
//! invocation. Output fragments written by independent workers can be merged
//! back into one consistently numbered dataset.

// Public modules
pub mod cli;
pub mod config;
pub mod error;
pub mod merge;
pub mod runner;

// Re-export commonly used types
pub use error::{Result, SweepError};

/// Current version of psweep
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
