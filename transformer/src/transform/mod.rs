//! Transformation module.
//!
//! - Path: dot/bracket get and set
//! - DSL: mapping expressions and their evaluator
//! - Scope: lineage keys for nested records
//! - Expander: rules and nested stream expansion
//! - Pipeline: message dispatch and the run loop

pub mod dsl;
pub mod expander;
pub mod path;
pub mod pipeline;
pub mod scope;
pub mod value;

pub use dsl::*;
pub use expander::RecordExpander;
pub use pipeline::*;
pub use scope::Scope;
