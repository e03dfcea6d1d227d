//! Error types for the Singer transform.
//!
//! Errors are scoped to the smallest unit that can fail:
//!
//! - [`PathError`] - malformed dot/bracket paths
//! - [`EvalError`] - failure of a single expression node
//! - [`LineageError`] - lineage keys could not be attached to a nested value
//! - [`ConfigError`] - mapping configuration could not be loaded
//! - [`MessageError`] - Singer message decoding or sink output
//! - [`PipelineError`] - top-level run errors
//!
//! Only [`ConfigError`] and sink I/O failures are fatal. Everything raised while
//! transforming a record is logged and degraded at the point where it happened.

use thiserror::Error;

// =============================================================================
// Path Errors
// =============================================================================

/// Errors raised while parsing a dot/bracket path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The path string was empty.
    #[error("Path is empty")]
    Empty,

    /// Two dots in a row, or a leading/trailing dot.
    #[error("Empty segment in path '{path}'")]
    EmptySegment { path: String },

    /// Brackets that do not form `name[]` or `name[N]`.
    #[error("Malformed segment '{segment}'")]
    MalformedSegment { segment: String },

    /// Bracket content that is not a non-negative integer.
    #[error("Invalid index '{index}' in segment '{segment}'")]
    InvalidIndex { segment: String, index: String },

    /// `name[]` only makes sense when writing.
    #[error("Append segment '{segment}' cannot be read")]
    AppendNotReadable { segment: String },
}

// =============================================================================
// Expression Errors
// =============================================================================

/// Failure of one expression node. The evaluator turns these into `null`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// A `record`/`config` key is not a valid path.
    #[error("Invalid key: {0}")]
    Path(#[from] PathError),

    /// The node could not be parsed from the configuration.
    #[error("Malformed expression: {reason}")]
    Malformed { reason: String },

    /// An operand had the wrong JSON type.
    #[error("'{node}' expected {expected}, found {found}")]
    TypeMismatch {
        node: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    /// Ordering comparison between values of different kinds.
    #[error("Cannot compare {left} with {right} using '{operator}'")]
    Incomparable {
        operator: &'static str,
        left: &'static str,
        right: &'static str,
    },

    /// `divide` with a zero divisor.
    #[error("Division by zero")]
    DivisionByZero,

    /// Arithmetic produced NaN or infinity, which JSON cannot carry.
    #[error("'{node}' produced a non-finite number")]
    NonFinite { node: &'static str },
}

// =============================================================================
// Lineage Errors
// =============================================================================

/// Raised when `@parent`/`@root` cannot be attached to a nested value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineageError {
    /// Only objects can carry lineage keys.
    #[error("Cannot attach lineage to {found} at '{stream}'")]
    NotAnObject { stream: String, found: &'static str },
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while loading the mapping configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("Failed to read config '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Config is not valid JSON or has the wrong shape.
    #[error("Invalid config: {0}")]
    Json(#[from] serde_json::Error),

    /// A required top-level key is absent.
    #[error("Config is missing required key '{0}'")]
    MissingKey(&'static str),

    /// The config root is not a JSON object.
    #[error("Config must be a JSON object")]
    NotAnObject,
}

// =============================================================================
// Message Errors
// =============================================================================

/// Errors while decoding input lines or writing output messages.
#[derive(Debug, Error)]
pub enum MessageError {
    /// Underlying reader/writer failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line is not JSON, or a known message type has the wrong shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Line is JSON but not a message envelope.
    #[error("Invalid message: {0}")]
    InvalidEnvelope(String),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level run errors returned to `main`.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Output could not be written.
    #[error("Output error: {0}")]
    Message(#[from] MessageError),

    /// Input could not be read.
    #[error("Input error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for path operations.
pub type PathResult<T> = Result<T, PathError>;

/// Result type for expression nodes.
pub type EvalResult<T> = Result<T, EvalError>;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for message decoding and output.
pub type MessageResult<T> = Result<T, MessageError>;

/// Result type for a pipeline run.
pub type PipelineResult<T> = Result<T, PipelineError>;
