//! Configuration parsing and validation
//!
//! This module handles parsing of psweep configuration files (YAML or JSON),
//! validation of their structure, and the launcher settings.

pub mod parse;
pub mod schema;
pub mod settings;
pub mod types;

// Re-export main types
pub use parse::*;
pub use schema::*;
pub use settings::*;
pub use types::*;
