//! Mapping expression language.
//!
//! - `expression`: expression and condition definitions (what the config contains)
//! - `evaluator`: evaluate expressions against a record and config metadata
//!
//! ## Example
//!
//! ```rust
//! use serde_json::json;
//! use singer_transform::{Evaluator, Expression};
//!
//! let expr = Expression::from_value(json!({
//!     "type": "join",
//!     "pieces": [{"type": "record", "key": "first"}, {"type": "text", "val": "!"}]
//! }));
//! let meta = json!({});
//! let value = Evaluator::new(&meta).evaluate(Some(&expr), &json!({"first": "Ann"}));
//! assert_eq!(value, json!("Ann!"));
//! ```

pub mod evaluator;
pub mod expression;

pub use evaluator::Evaluator;
pub use expression::{expressions_description, Comparison, Condition, Expression, ExpressionKind};
