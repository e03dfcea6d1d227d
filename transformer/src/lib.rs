//! # singer-transform - reshape Singer records between a tap and a target
//!
//! Reads Singer messages, rewrites RECORD messages through a declarative mapping
//! configuration, and writes the resulting records. One input record can produce
//! records on several output streams, including one per element of nested arrays.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  tap stdout │────▶│   Message   │────▶│  Expander   │────▶│ target stdin│
//! │ (JSON lines)│     │  (decode)   │     │ (rules+DSL) │     │ (JSON lines)│
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types
//! - [`config`] - Mapping configuration
//! - [`message`] - Singer messages and sinks
//! - [`transform`] - Paths, expressions, expansion and the run loop

pub mod error;

pub mod config;

pub mod message;

pub mod transform;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{ConfigError, EvalError, LineageError, MessageError, PathError, PipelineError};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::{ConfigProblem, MappingConfig, StreamRule, DEFAULT_META_FILE};

// =============================================================================
// Re-exports - Messages
// =============================================================================

pub use message::{JsonLinesSink, MemorySink, Message, OutputRecord, Sink};

// =============================================================================
// Re-exports - Transform
// =============================================================================

pub use transform::dsl::{expressions_description, Condition, Evaluator, Expression, ExpressionKind};
pub use transform::expander::RecordExpander;
pub use transform::path;
pub use transform::pipeline::{run, Processor, RunSummary};
pub use transform::scope::Scope;
