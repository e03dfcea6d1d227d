//! Expression and condition definitions.
//!
//! Expressions are JSON objects tagged by `type`:
//!
//! ```json
//! {"type": "join", "pieces": [
//!     {"type": "record", "key": "first_name"},
//!     {"type": "text", "val": " "},
//!     {"type": "record", "key": "last_name"}
//! ]}
//! ```
//!
//! Every nested node is parsed independently. A node that does not parse is kept as
//! [`Expression::Malformed`] so the rest of the tree, and the rest of the rule, still
//! works.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A parsed expression node, or the reason it could not be parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Node(Box<ExpressionKind>),
    Malformed { raw: Value, reason: String },
}

/// All supported expression types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExpressionKind {
    /// Nested value from the current record
    Record { key: String },

    /// Nested value from the config `meta` object
    Config { key: String },

    /// Literal value, returned as-is
    Text {
        #[serde(default)]
        val: Value,
    },

    /// Literal parsed as a number
    Float {
        #[serde(default)]
        val: Value,
    },

    /// Concatenate stringified pieces
    Join { pieces: Vec<Expression> },

    /// First object that is neither null nor ""
    Coalesce { objects: Vec<Expression> },

    /// Character slice of a string
    Substr {
        object: Expression,
        #[serde(default)]
        start: i64,
        #[serde(default)]
        length: Option<i64>,
    },

    /// MD5 hex digest of a string
    Hash { object: Expression },

    /// Numeric coercion
    ToFloat { object: Expression },

    Sum { objects: Vec<Expression> },

    Multiply { objects: Vec<Expression> },

    Divide { objects: Vec<Expression> },

    Difference { objects: Vec<Expression> },

    /// Ternary on a [`Condition`]
    If {
        condition: Condition,
        #[serde(default)]
        then: Option<Expression>,
        #[serde(default, rename = "else")]
        otherwise: Option<Expression>,
    },
}

impl ExpressionKind {
    /// The `type` tag, for log messages.
    pub fn name(&self) -> &'static str {
        match self {
            ExpressionKind::Record { .. } => "record",
            ExpressionKind::Config { .. } => "config",
            ExpressionKind::Text { .. } => "text",
            ExpressionKind::Float { .. } => "float",
            ExpressionKind::Join { .. } => "join",
            ExpressionKind::Coalesce { .. } => "coalesce",
            ExpressionKind::Substr { .. } => "substr",
            ExpressionKind::Hash { .. } => "hash",
            ExpressionKind::ToFloat { .. } => "tofloat",
            ExpressionKind::Sum { .. } => "sum",
            ExpressionKind::Multiply { .. } => "multiply",
            ExpressionKind::Divide { .. } => "divide",
            ExpressionKind::Difference { .. } => "difference",
            ExpressionKind::If { .. } => "if",
        }
    }
}

impl Expression {
    /// Parse one node. Never fails; unparsable input becomes [`Expression::Malformed`].
    pub fn from_value(raw: Value) -> Self {
        match serde_json::from_value::<ExpressionKind>(raw.clone()) {
            Ok(kind) => Expression::Node(Box::new(kind)),
            Err(e) => Expression::Malformed {
                raw,
                reason: e.to_string(),
            },
        }
    }

    pub fn record(key: impl Into<String>) -> Self {
        Expression::Node(Box::new(ExpressionKind::Record { key: key.into() }))
    }

    pub fn text(val: impl Into<Value>) -> Self {
        Expression::Node(Box::new(ExpressionKind::Text { val: val.into() }))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Expression::Node(kind) => kind.name(),
            Expression::Malformed { .. } => "malformed",
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Expression::Malformed { .. })
    }

    /// Parse errors of every malformed node in this tree, outermost first.
    pub fn malformed_reasons(&self) -> Vec<String> {
        let mut reasons = Vec::new();
        self.collect_malformed(&mut reasons);
        reasons
    }

    fn collect_malformed(&self, reasons: &mut Vec<String>) {
        match self {
            Expression::Malformed { reason, .. } => reasons.push(reason.clone()),
            Expression::Node(kind) => {
                for child in kind.children() {
                    child.collect_malformed(reasons);
                }
            }
        }
    }
}

impl ExpressionKind {
    /// Direct sub-expressions, including condition operands.
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            ExpressionKind::Record { .. }
            | ExpressionKind::Config { .. }
            | ExpressionKind::Text { .. }
            | ExpressionKind::Float { .. } => Vec::new(),
            ExpressionKind::Join { pieces } => pieces.iter().collect(),
            ExpressionKind::Coalesce { objects }
            | ExpressionKind::Sum { objects }
            | ExpressionKind::Multiply { objects }
            | ExpressionKind::Divide { objects }
            | ExpressionKind::Difference { objects } => objects.iter().collect(),
            ExpressionKind::Substr { object, .. }
            | ExpressionKind::Hash { object }
            | ExpressionKind::ToFloat { object } => vec![object],
            ExpressionKind::If { condition, then, otherwise } => {
                let mut children = condition.operands();
                children.extend(then.iter());
                children.extend(otherwise.iter());
                children
            }
        }
    }
}

impl Condition {
    /// Every comparison operand in this condition tree.
    pub fn operands(&self) -> Vec<&Expression> {
        match self {
            Condition::And { conditions } | Condition::Or { conditions } => {
                conditions.iter().flat_map(Condition::operands).collect()
            }
            Condition::Eq(cmp)
            | Condition::Lt(cmp)
            | Condition::Lte(cmp)
            | Condition::Gt(cmp)
            | Condition::Gte(cmp) => cmp.left.iter().chain(cmp.right.iter()).collect(),
            Condition::Unknown => Vec::new(),
        }
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Expression::from_value)
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Expression::Node(kind) => kind.serialize(serializer),
            Expression::Malformed { raw, .. } => raw.serialize(serializer),
        }
    }
}

/// Boolean conditions used by `if` expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operator", rename_all = "lowercase")]
pub enum Condition {
    And { conditions: Vec<Condition> },
    Or { conditions: Vec<Condition> },
    Eq(Comparison),
    Lt(Comparison),
    Lte(Comparison),
    Gt(Comparison),
    Gte(Comparison),
    /// Any other operator. Always false.
    #[serde(other)]
    Unknown,
}

/// Operands of a binary comparison. A missing side evaluates to null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    #[serde(default)]
    pub left: Option<Expression>,
    #[serde(default)]
    pub right: Option<Expression>,
}

/// Get a description of all available expression types
pub fn expressions_description() -> String {
    r#"Available expression types:

| Type       | Description                                   | Parameters                     |
|------------|-----------------------------------------------|--------------------------------|
| record     | Nested value from the record                  | key: dot/bracket path          |
| config     | Nested value from config meta                 | key: dot/bracket path          |
| text       | Literal value                                 | val                            |
| float      | Literal parsed as a number (null -> 0)        | val                            |
| join       | Concatenate pieces as text                    | pieces: [expression]           |
| coalesce   | First value that is not null or ""            | objects: [expression]          |
| substr     | Slice of a string                             | object, start (0), length      |
| hash       | MD5 hex digest of a string                    | object                         |
| tofloat    | Convert to a number (null/"" -> 0)            | object                         |
| sum        | Add numbers                                   | objects: [expression]          |
| multiply   | Multiply numbers, starting from 1             | objects: [expression]          |
| divide     | Divide the first number by the rest           | objects: [expression]          |
| difference | Subtract the rest from the first number       | objects: [expression]          |
| if         | Pick then/else from a condition               | condition, then, else          |

Condition operators: and/or (conditions: [condition]), eq, lt, lte, gt, gte (left, right).

Example:
{"type": "if",
 "condition": {"operator": "eq",
               "left": {"type": "record", "key": "first_name"},
               "right": {"type": "text", "val": "Chris"}},
 "then": {"type": "text", "val": "Christopher"},
 "else": {"type": "record", "key": "first_name"}}"#
        .to_string()
}
