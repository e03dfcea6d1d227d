//! Record expansion.
//!
//! Applies the rules of a stream path to a record, then walks into nested streams.
//!
//! ```text
//! mappings: "facilities", "facilities.children", "facilities.children.grandchildren"
//!
//! facilities record ──rules──▶ output records
//!   └─ children[i]  (+ @parent, @root, @index, @item) ──rules──▶ output records
//!        └─ grandchildren[j]  (+ lineage) ──rules──▶ output records
//! ```
//!
//! Only the next path segment is looked up at each level; deeper segments are
//! re-derived from the config once the walk gets there. Children borrow their
//! ancestors through a [`Scope`], so expansion is linear in the number of elements.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::{MappingConfig, StreamRule};
use crate::error::LineageError;
use crate::message::OutputRecord;
use crate::transform::dsl::Evaluator;
use crate::transform::path;
use crate::transform::scope::Scope;
use crate::transform::value::{is_truthy, strip_nul, type_name};

/// Expands records according to a [`MappingConfig`].
pub struct RecordExpander<'a> {
    config: &'a MappingConfig,
    evaluator: Evaluator<'a>,
}

impl<'a> RecordExpander<'a> {
    pub fn new(config: &'a MappingConfig) -> Self {
        Self {
            config,
            evaluator: Evaluator::new(&config.meta),
        }
    }

    /// Transform a top-level record of `stream` into output records, in emission order.
    pub fn transform(&self, stream: &str, record: &Value) -> Vec<OutputRecord> {
        let mut out = Vec::new();
        self.expand(stream, &Scope::new(record), &mut out);
        out
    }

    fn expand(&self, stream: &str, scope: &Scope<'_>, out: &mut Vec<OutputRecord>) {
        for rule in self.config.rules(stream) {
            if let Some(output) = self.apply_rule(rule, scope) {
                out.push(output);
            }
        }

        for segment in self.config.nested_segments(stream) {
            let next_stream = format!("{}.{}", stream, segment);

            let nested = match path::get(scope.record(), segment) {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(e) => {
                    warn!(stream = %next_stream, error = %e, "Invalid nested stream segment");
                    continue;
                }
            };

            match nested {
                Value::Array(items) => {
                    for (index, item) in items.iter().enumerate() {
                        self.expand(&next_stream, &Scope::element(scope, item, index), out);
                    }
                }
                value if is_truthy(value) => match nested_scope(scope, value, &next_stream) {
                    Ok(child) => self.expand(&next_stream, &child, out),
                    Err(e) => {
                        warn!(error = %e, "Continuing without lineage");
                        self.expand(&next_stream, &Scope::new(value), out);
                    }
                },
                _ => {}
            }
        }
    }

    /// Build the output record of one rule, or `None` if the rule excludes the record.
    pub fn apply_rule(&self, rule: &StreamRule, scope: &Scope<'_>) -> Option<OutputRecord> {
        if let Some(exclude) = &rule.exclude {
            if is_truthy(&self.evaluator.evaluate_in(Some(exclude), scope)) {
                debug!(stream = %rule.stream, "Record excluded");
                return None;
            }
        }

        let mut output = Value::Object(Map::new());

        for (target, expr) in &rule.properties {
            let value = strip_nul(self.evaluator.evaluate_in(expr.as_ref(), scope));
            if value.as_str() == Some("") {
                continue;
            }

            if let Err(e) = path::set_in(&mut output, target, value) {
                warn!(stream = %rule.stream, target = %target, error = %e, "Skipping property");
            }
        }

        Some(OutputRecord::new(rule.stream.clone(), output))
    }
}

/// Lineage for a nested value that is not an array. Only objects can carry it.
fn nested_scope<'s>(
    parent: &'s Scope<'s>,
    value: &'s Value,
    stream: &str,
) -> Result<Scope<'s>, LineageError> {
    if value.is_object() {
        Ok(Scope::nested(parent, value))
    } else {
        Err(LineageError::NotAnObject {
            stream: stream.to_string(),
            found: type_name(value),
        })
    }
}
