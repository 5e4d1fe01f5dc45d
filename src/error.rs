//! Error types for psweep

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for psweep operations
pub type Result<T> = std::result::Result<T, SweepError>;

/// Main error type for psweep
#[derive(Error, Debug)]
pub enum SweepError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Variable interpolation errors
    #[error("Interpolation error: {0}")]
    Interpolation(#[from] InterpolationError),

    /// Dependency graph errors
    #[error("Dependency error: {0}")]
    Graph(#[from] GraphError),

    /// Parameter expansion errors
    #[error("Expansion error: {0}")]
    Expansion(#[from] ExpansionError),

    /// Output merging errors
    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    /// Invocation execution errors
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing or serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration parsing and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to find config file (searched: {0})")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unsupported configuration format '{0}' (expected .yml, .yaml or .json)")]
    UnsupportedFormat(String),

    #[error("Entry '{0}' must be a mapping of fields")]
    NotAMapping(String),

    #[error("Invalid entry id '{0}': ids must not contain ':', '$', braces or whitespace")]
    InvalidId(String),

    #[error("Field '{field}' of '{entry}' {reason}")]
    InvalidField {
        entry: String,
        field: String,
        reason: String,
    },

    #[error("Failed to read settings file '{path}': {error}")]
    Settings { path: PathBuf, error: String },
}

/// Variable interpolation errors
///
/// Every variant names the section and option whose value was being resolved.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterpolationError {
    #[error("[{section}] {option}: invalid interpolation syntax: {reason}")]
    InvalidSyntax {
        section: String,
        option: String,
        reason: String,
    },

    #[error("[{section}] {option}: reference '${{{reference}}}' is not defined")]
    MissingReference {
        section: String,
        option: String,
        reference: String,
    },

    #[error("[{section}] {option}: cyclic reference {chain}")]
    CyclicReference {
        section: String,
        option: String,
        chain: String,
    },

    #[error("[{section}] {option}: interpolation depth exceeded {max} levels")]
    InterpolationDepthExceeded {
        section: String,
        option: String,
        max: usize,
    },
}

/// Dependency graph errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Circular dependency detected: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("Task '{task}' runs after '{missing}', which is not a defined task")]
    UnknownPrerequisite { task: String, missing: String },

    #[error("Task '{0}' is not defined")]
    TaskNotFound(String),
}

/// Parameter expansion errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpansionError {
    #[error("Task '{task}': '{program}' is not executable and no launcher handles extension '{extension}'")]
    UnsupportedExtension {
        task: String,
        program: String,
        extension: String,
    },

    #[error("Task '{0}' has an empty command")]
    EmptyCommand(String),

    #[error("Task '{task}': command must resolve to a single line, got {lines} lines")]
    MultiLineCommand { task: String, lines: usize },

    #[error("Invalid rank {rank} for a world of size {size}")]
    InvalidRank { rank: usize, size: usize },

    #[error("{variable}='{value}' is not a non-negative integer")]
    InvalidRankVariable { variable: String, value: String },

    #[error("Task '{task}' expands to more invocations than can be counted")]
    TooManyInvocations { task: String },
}

/// Output merging errors
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("{source_name}:{line}: malformed record: {reason}")]
    MalformedRecord {
        source_name: String,
        line: usize,
        reason: String,
    },

    #[error("{source_name}:{line}: column mismatch: {reason}")]
    ColumnCountMismatch {
        source_name: String,
        line: usize,
        reason: String,
    },

    #[error("No column titles containing '[run number]' were found in any fragment")]
    NoColumnTitles,

    #[error("Pattern '{pattern}' is invalid: {error}")]
    Pattern { pattern: String, error: String },

    #[error("Failed to read fragment '{path}': {error}")]
    Read { path: PathBuf, error: io::Error },
}

/// Invocation execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Task '{task}' invocation #{index} failed with exit code {code:?}")]
    CommandFailed {
        task: String,
        index: usize,
        code: Option<i32>,
    },

    #[error("Task '{task}' invocation #{index} could not be started: {error}")]
    Spawn {
        task: String,
        index: usize,
        error: String,
    },
}

/// Specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized result type for interpolation operations
pub type InterpolationResult<T> = std::result::Result<T, InterpolationError>;

/// Specialized result type for graph operations
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Specialized result type for expansion operations
pub type ExpansionResult<T> = std::result::Result<T, ExpansionError>;

/// Specialized result type for merge operations
pub type MergeResult<T> = std::result::Result<T, MergeError>;

/// Specialized result type for execution operations
pub type ExecutionResult<T> = std::result::Result<T, ExecutionError>;

/// Helper to determine if an error is a structural configuration problem
/// (as opposed to an I/O error or a runtime failure of an external process)
pub fn is_structural(err: &SweepError) -> bool {
    match err {
        SweepError::Merge(MergeError::Read { .. }) => false,
        SweepError::Config(_)
        | SweepError::Interpolation(_)
        | SweepError::Graph(_)
        | SweepError::Expansion(_)
        | SweepError::Merge(_) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreadable_fragment_is_not_structural() {
        let err = SweepError::from(MergeError::Read {
            path: PathBuf::from("rank0.csv"),
            error: io::Error::new(io::ErrorKind::NotFound, "missing"),
        });
        assert!(!is_structural(&err));

        let err = SweepError::from(MergeError::MalformedRecord {
            source_name: "rank0.csv".to_string(),
            line: 3,
            reason: "bad".to_string(),
        });
        assert!(is_structural(&err));
    }

    #[test]
    fn test_runtime_failures_are_not_structural() {
        let err = SweepError::from(ExecutionError::CommandFailed {
            task: "t".to_string(),
            index: 0,
            code: Some(1),
        });
        assert!(!is_structural(&err));
        assert!(!is_structural(&SweepError::from(io::Error::new(io::ErrorKind::Other, "disk"))));
        assert!(is_structural(&SweepError::from(GraphError::TaskNotFound("x".to_string()))));
    }
}
