//! Expression evaluator.
//!
//! Evaluates [`Expression`] trees against a record and the config `meta` object.
//! Each node is its own failure boundary: if a node fails, the error is logged and
//! the node evaluates to `null`, while its siblings and parents keep going.

use std::borrow::Cow;
use std::cmp::Ordering;

use serde_json::Value;
use tracing::{debug, warn};

use super::expression::{Comparison, Condition, Expression, ExpressionKind};
use crate::error::{EvalError, EvalResult};
use crate::transform::path;
use crate::transform::scope::Scope;
use crate::transform::value::{is_blank, stringify, to_number, type_name};

/// Evaluates expressions with access to config metadata.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    meta: &'a Value,
}

impl<'a> Evaluator<'a> {
    pub fn new(meta: &'a Value) -> Self {
        Self { meta }
    }

    /// Evaluate an optional expression against a top-level record.
    /// Absent expressions and failed nodes give `null`.
    pub fn evaluate(&self, expr: Option<&Expression>, record: &Value) -> Value {
        self.evaluate_in(expr, &Scope::new(record))
    }

    /// [`Evaluator::evaluate`] for a record with lineage.
    pub fn evaluate_in(&self, expr: Option<&Expression>, scope: &Scope<'_>) -> Value {
        let Some(expr) = expr else {
            return Value::Null;
        };

        match self.try_evaluate(expr, scope) {
            Ok(value) => value,
            Err(e) => {
                warn!(expression = expr.name(), error = %e, "Expression failed, using null");
                debug!(record = %scope.record(), "Record for failed expression");
                Value::Null
            }
        }
    }

    /// Evaluate one node, returning its own failure. Failures of child nodes are
    /// already absorbed as `null`.
    pub fn try_evaluate(&self, expr: &Expression, scope: &Scope<'_>) -> EvalResult<Value> {
        match expr {
            Expression::Malformed { reason, .. } => Err(EvalError::Malformed {
                reason: reason.clone(),
            }),
            Expression::Node(kind) => self.evaluate_kind(kind, scope),
        }
    }

    fn evaluate_kind(&self, kind: &ExpressionKind, scope: &Scope<'_>) -> EvalResult<Value> {
        match kind {
            ExpressionKind::Record { key } => {
                Ok(scope.get(key)?.map(Cow::into_owned).unwrap_or(Value::Null))
            }

            ExpressionKind::Config { key } => {
                Ok(path::get(self.meta, key)?.cloned().unwrap_or(Value::Null))
            }

            ExpressionKind::Text { val } => Ok(val.clone()),

            ExpressionKind::Float { val } => match to_number(val) {
                Some(n) => number("float", n),
                None => Ok(Value::Null),
            },

            ExpressionKind::Join { pieces } => Ok(Value::String(
                pieces
                    .iter()
                    .map(|piece| stringify(&self.evaluate_in(Some(piece), scope)))
                    .collect(),
            )),

            ExpressionKind::Coalesce { objects } => Ok(objects
                .iter()
                .map(|object| self.evaluate_in(Some(object), scope))
                .find(|value| !is_blank(value))
                .unwrap_or(Value::Null)),

            ExpressionKind::Substr { object, start, length } => {
                let value = self.evaluate_in(Some(object), scope);
                let text = expect_str("substr", &value)?;
                // Negative bounds clamp to zero
                let start = usize::try_from(*start).unwrap_or(0);
                let length = length.map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(0));
                Ok(Value::String(text.chars().skip(start).take(length).collect()))
            }

            ExpressionKind::Hash { object } => {
                let value = self.evaluate_in(Some(object), scope);
                let text = expect_str("hash", &value)?;
                Ok(Value::String(format!("{:x}", md5::compute(text.as_bytes()))))
            }

            ExpressionKind::ToFloat { object } => {
                match to_number(&self.evaluate_in(Some(object), scope)) {
                    Some(n) => number("tofloat", n),
                    None => Ok(Value::Null),
                }
            }

            ExpressionKind::Sum { objects } => {
                let total: f64 = self.numbers(objects, scope).into_iter().flatten().sum();
                number("sum", total)
            }

            ExpressionKind::Multiply { objects } => {
                let product: f64 = self.numbers(objects, scope).into_iter().flatten().product();
                number("multiply", product)
            }

            ExpressionKind::Difference { objects } => {
                let mut terms = self.numbers(objects, scope).into_iter();
                let mut acc = terms.next().flatten().unwrap_or(0.0);
                for n in terms.flatten() {
                    acc -= n;
                }
                number("difference", acc)
            }

            ExpressionKind::Divide { objects } => {
                let mut terms = self.numbers(objects, scope).into_iter();
                let mut acc = terms.next().flatten().unwrap_or(0.0);
                for n in terms.flatten() {
                    if n == 0.0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    acc /= n;
                }
                number("divide", acc)
            }

            ExpressionKind::If { condition, then, otherwise } => {
                if self.check(condition, scope)? {
                    Ok(self.evaluate_in(then.as_ref(), scope))
                } else {
                    Ok(self.evaluate_in(otherwise.as_ref(), scope))
                }
            }
        }
    }

    /// Evaluate each object once and coerce it. Unparsable entries are `None`.
    fn numbers(&self, objects: &[Expression], scope: &Scope<'_>) -> Vec<Option<f64>> {
        objects
            .iter()
            .map(|object| to_number(&self.evaluate_in(Some(object), scope)))
            .collect()
    }

    /// Evaluate a condition.
    pub fn check(&self, condition: &Condition, scope: &Scope<'_>) -> EvalResult<bool> {
        match condition {
            Condition::And { conditions } => {
                for c in conditions {
                    if !self.check(c, scope)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Or { conditions } => {
                for c in conditions {
                    if self.check(c, scope)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::Eq(cmp) => {
                let (left, right) = self.operands(cmp, scope);
                Ok(loose_eq(&left, &right))
            }
            Condition::Lt(cmp) => self.ordered("lt", cmp, scope, |o| o == Ordering::Less),
            Condition::Lte(cmp) => self.ordered("lte", cmp, scope, |o| o != Ordering::Greater),
            Condition::Gt(cmp) => self.ordered("gt", cmp, scope, |o| o == Ordering::Greater),
            Condition::Gte(cmp) => self.ordered("gte", cmp, scope, |o| o != Ordering::Less),
            Condition::Unknown => {
                debug!("Unknown condition operator, treating as false");
                Ok(false)
            }
        }
    }

    fn operands(&self, cmp: &Comparison, scope: &Scope<'_>) -> (Value, Value) {
        (
            self.evaluate_in(cmp.left.as_ref(), scope),
            self.evaluate_in(cmp.right.as_ref(), scope),
        )
    }

    fn ordered(
        &self,
        operator: &'static str,
        cmp: &Comparison,
        scope: &Scope<'_>,
        accept: impl Fn(Ordering) -> bool,
    ) -> EvalResult<bool> {
        let (left, right) = self.operands(cmp, scope);
        if left.is_null() || right.is_null() {
            return Ok(false);
        }
        compare(operator, &left, &right).map(accept)
    }
}

/// Equality where numbers compare by value, so `1 == 1.0`.
fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn compare(operator: &'static str, left: &Value, right: &Value) -> EvalResult<Ordering> {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .zip(b.as_f64())
            .and_then(|(a, b)| a.partial_cmp(&b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    };

    ordering.ok_or(EvalError::Incomparable {
        operator,
        left: type_name(left),
        right: type_name(right),
    })
}

fn expect_str<'v>(node: &'static str, value: &'v Value) -> EvalResult<&'v str> {
    value.as_str().ok_or(EvalError::TypeMismatch {
        node,
        expected: "string",
        found: type_name(value),
    })
}

fn number(node: &'static str, n: f64) -> EvalResult<Value> {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .ok_or(EvalError::NonFinite { node })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(expr: Value, record: Value) -> Value {
        eval_with_meta(expr, record, json!({}))
    }

    fn eval_with_meta(expr: Value, record: Value, meta: Value) -> Value {
        let expr = Expression::from_value(expr);
        Evaluator::new(&meta).evaluate(Some(&expr), &record)
    }

    fn text(val: &str) -> Value {
        json!({"type": "text", "val": val})
    }

    #[test]
    fn test_absent_expression() {
        let meta = json!({});
        assert_eq!(Evaluator::new(&meta).evaluate(None, &json!({"a": 1})), Value::Null);
    }

    #[test]
    fn test_record() {
        assert_eq!(eval(json!({"type": "record", "key": "foo"}), json!({"foo": "bar"})), json!("bar"));
        assert_eq!(eval(json!({"type": "record", "key": "a.b"}), json!({"a": {"b": 2}})), json!(2));
        assert_eq!(eval(json!({"type": "record", "key": "missing"}), json!({})), Value::Null);
    }

    #[test]
    fn test_config() {
        let value = eval_with_meta(
            json!({"type": "config", "key": "foo"}),
            json!({}),
            json!({"foo": "bar"}),
        );
        assert_eq!(value, json!("bar"));
    }

    #[test]
    fn test_text() {
        assert_eq!(eval(text("foo"), json!({})), json!("foo"));
        assert_eq!(eval(json!({"type": "text", "val": 5}), json!({})), json!(5));
    }

    #[test]
    fn test_float() {
        assert_eq!(eval(json!({"type": "float", "val": "2.5"}), json!({})), json!(2.5));
        assert_eq!(eval(json!({"type": "float", "val": null}), json!({})), json!(0.0));
        assert_eq!(eval(json!({"type": "float", "val": "abc"}), json!({})), Value::Null);
    }

    #[test]
    fn test_join() {
        let expr = json!({"type": "join", "pieces": [text("foo"), text("bar")]});
        assert_eq!(eval(expr, json!({})), json!("foobar"));
    }

    #[test]
    fn test_join_null_and_numbers() {
        let expr = json!({"type": "join", "pieces": [
            {"type": "record", "key": "missing"},
            {"type": "record", "key": "n"},
            text("-"),
            {"type": "record", "key": "ok"}
        ]});
        assert_eq!(eval(expr, json!({"n": 7, "ok": true})), json!("7-true"));
    }

    #[test]
    fn test_coalesce() {
        let expr = json!({"type": "coalesce", "objects": [
            {"type": "record", "key": "foo"},
            {"type": "record", "key": "bar"}
        ]});
        assert_eq!(eval(expr, json!({"bar": "baz"})), json!("baz"));
    }

    #[test]
    fn test_coalesce_keeps_zero() {
        let expr = json!({"type": "coalesce", "objects": [
            {"type": "record", "key": "empty"},
            {"type": "record", "key": "zero"},
            {"type": "record", "key": "other"}
        ]});
        assert_eq!(eval(expr, json!({"empty": "", "zero": 0, "other": 5})), json!(0));
    }

    #[test]
    fn test_coalesce_all_blank() {
        let expr = json!({"type": "coalesce", "objects": [text(""), {"type": "record", "key": "x"}]});
        assert_eq!(eval(expr, json!({})), Value::Null);
    }

    #[test]
    fn test_substr() {
        let record = json!({"zip": "12345-6789"});
        let expr = json!({"type": "substr", "object": {"type": "record", "key": "zip"}, "length": 5});
        assert_eq!(eval(expr, record.clone()), json!("12345"));

        let expr = json!({"type": "substr", "object": {"type": "record", "key": "zip"}, "start": 6});
        assert_eq!(eval(expr, record.clone()), json!("6789"));

        let expr = json!({"type": "substr", "object": {"type": "record", "key": "zip"}, "start": 20, "length": 3});
        assert_eq!(eval(expr, record), json!(""));
    }

    #[test]
    fn test_substr_negative_bounds_clamp() {
        let record = json!({"zip": "12345-6789"});
        let expr = json!({"type": "substr", "object": {"type": "record", "key": "zip"}, "start": -2, "length": 3});
        assert_eq!(eval(expr, record.clone()), json!("123"));
        let expr = json!({"type": "substr", "object": {"type": "record", "key": "zip"}, "length": -1});
        assert_eq!(eval(expr, record), json!(""));
    }

    #[test]
    fn test_substr_unicode() {
        let expr = json!({"type": "substr", "object": text("héllo"), "start": 1, "length": 2});
        assert_eq!(eval(expr, json!({})), json!("él"));
    }

    #[test]
    fn test_substr_null_fails_to_null() {
        let expr = json!({"type": "substr", "object": {"type": "record", "key": "x"}, "length": 2});
        assert_eq!(eval(expr, json!({})), Value::Null);
    }

    #[test]
    fn test_hash() {
        let expr = json!({"type": "hash", "object": text("hello")});
        assert_eq!(eval(expr, json!({})), json!("5d41402abc4b2a76b9719d911017c592"));
    }

    #[test]
    fn test_hash_null_is_node_failure() {
        let meta = json!({});
        let expr = Expression::from_value(json!({"type": "hash", "object": {"type": "record", "key": "x"}}));
        let record = json!({});
        let err = Evaluator::new(&meta).try_evaluate(&expr, &Scope::new(&record)).unwrap_err();
        assert!(matches!(err, EvalError::TypeMismatch { node: "hash", found: "null", .. }));
    }

    #[test]
    fn test_tofloat() {
        let expr = |key: &str| json!({"type": "tofloat", "object": {"type": "record", "key": key}});
        let record = json!({"s": "3.5", "empty": "", "bad": "x", "n": 2});
        assert_eq!(eval(expr("s"), record.clone()), json!(3.5));
        assert_eq!(eval(expr("empty"), record.clone()), json!(0.0));
        assert_eq!(eval(expr("missing"), record.clone()), json!(0.0));
        assert_eq!(eval(expr("n"), record.clone()), json!(2.0));
        assert_eq!(eval(expr("bad"), record), Value::Null);
    }

    #[test]
    fn test_sum_skips_unparsable() {
        let expr = json!({"type": "sum", "objects": [text("1.5"), text("abc"), {"type": "record", "key": "n"}]});
        assert_eq!(eval(expr, json!({"n": 2})), json!(3.5));
    }

    #[test]
    fn test_multiply() {
        let expr = json!({"type": "multiply", "objects": [text("2"), text("3")]});
        assert_eq!(eval(expr, json!({})), json!(6.0));
    }

    #[test]
    fn test_multiply_seed_is_one() {
        assert_eq!(eval(json!({"type": "multiply", "objects": []}), json!({})), json!(1.0));
        let expr = json!({"type": "multiply", "objects": [text("x"), text("y")]});
        assert_eq!(eval(expr, json!({})), json!(1.0));
    }

    #[test]
    fn test_difference() {
        let expr = json!({"type": "difference", "objects": [text("10"), text("3"), text("2")]});
        assert_eq!(eval(expr, json!({})), json!(5.0));
        assert_eq!(eval(json!({"type": "difference", "objects": []}), json!({})), json!(0.0));
    }

    #[test]
    fn test_divide() {
        let expr = json!({"type": "divide", "objects": [text("10"), text("4")]});
        assert_eq!(eval(expr, json!({})), json!(2.5));
    }

    #[test]
    fn test_divide_by_zero_is_null() {
        let expr = json!({"type": "divide", "objects": [text("10"), text("0")]});
        assert_eq!(eval(expr, json!({})), Value::Null);
    }

    fn if_expr(condition: Value) -> Value {
        json!({"type": "if", "condition": condition, "then": text("yes"), "else": text("no")})
    }

    #[test]
    fn test_if_eq() {
        let expr = json!({
            "type": "if",
            "condition": {
                "operator": "eq",
                "left": {"type": "record", "key": "first_name"},
                "right": text("Chris")
            },
            "then": text("Christopher"),
            "else": {"type": "record", "key": "first_name"}
        });
        assert_eq!(eval(expr.clone(), json!({"first_name": "Chris"})), json!("Christopher"));
        assert_eq!(eval(expr, json!({"first_name": "Pat"})), json!("Pat"));
    }

    #[test]
    fn test_if_missing_else_is_null() {
        let expr = json!({"type": "if", "condition": {"operator": "eq", "left": text("a"), "right": text("b")}, "then": text("x")});
        assert_eq!(eval(expr, json!({})), Value::Null);
    }

    #[test]
    fn test_eq_with_null_and_numbers() {
        let cond = json!({"operator": "eq", "left": {"type": "record", "key": "x"}, "right": {"type": "record", "key": "y"}});
        assert_eq!(eval(if_expr(cond.clone()), json!({})), json!("yes"));
        assert_eq!(eval(if_expr(cond.clone()), json!({"x": 1, "y": 1.0})), json!("yes"));
        assert_eq!(eval(if_expr(cond), json!({"x": 1})), json!("no"));
    }

    #[test]
    fn test_ordering_with_null_is_false() {
        for op in ["lt", "lte", "gt", "gte"] {
            let cond = json!({"operator": op, "left": {"type": "record", "key": "missing"}, "right": {"type": "float", "val": 1}});
            assert_eq!(eval(if_expr(cond), json!({})), json!("no"), "operator {}", op);
        }
    }

    #[test]
    fn test_ordering() {
        let cond = |op: &str| json!({"operator": op, "left": {"type": "record", "key": "n"}, "right": {"type": "float", "val": "5"}});
        let record = json!({"n": 5});
        assert_eq!(eval(if_expr(cond("lt")), record.clone()), json!("no"));
        assert_eq!(eval(if_expr(cond("lte")), record.clone()), json!("yes"));
        assert_eq!(eval(if_expr(cond("gt")), record.clone()), json!("no"));
        assert_eq!(eval(if_expr(cond("gte")), record), json!("yes"));

        let strings = json!({"operator": "lt", "left": text("apple"), "right": text("banana")});
        assert_eq!(eval(if_expr(strings), json!({})), json!("yes"));
    }

    #[test]
    fn test_mixed_ordering_fails_node() {
        let cond = json!({"operator": "lt", "left": text("a"), "right": {"type": "float", "val": 1}});
        assert_eq!(eval(if_expr(cond), json!({})), Value::Null);
    }

    #[test]
    fn test_and_or() {
        let t = json!({"operator": "eq", "left": text("a"), "right": text("a")});
        let f = json!({"operator": "eq", "left": text("a"), "right": text("b")});

        let and = json!({"operator": "and", "conditions": [t.clone(), f.clone()]});
        assert_eq!(eval(if_expr(and), json!({})), json!("no"));

        let or = json!({"operator": "or", "conditions": [f.clone(), t.clone()]});
        assert_eq!(eval(if_expr(or), json!({})), json!("yes"));

        let empty_and = json!({"operator": "and", "conditions": []});
        assert_eq!(eval(if_expr(empty_and), json!({})), json!("yes"));
    }

    #[test]
    fn test_unknown_operator_is_false() {
        let cond = json!({"operator": "ne", "left": text("a"), "right": text("b")});
        assert_eq!(eval(if_expr(cond), json!({})), json!("no"));
    }

    #[test]
    fn test_malformed_node_degrades_locally() {
        let expr = json!({"type": "join", "pieces": [text("a"), {"type": "bogus"}, text("b")]});
        assert_eq!(eval(expr, json!({})), json!("ab"));
    }

    #[test]
    fn test_bad_key_path_is_null() {
        let expr = json!({"type": "record", "key": "a[x]"});
        assert_eq!(eval(expr, json!({"a": [1]})), Value::Null);
    }
}
