//! Evaluator: walks an expression tree against entity data
//!
//! Missing attributes read as `null`. Ordering comparisons involving `null`
//! are false rather than errors; ordering across other mismatched types is a
//! type error.

use std::cmp::Ordering;

use serde_json::Value;

use super::parser::{CompareOp, Expr};
use super::{ExpressionError, ExpressionResult};
use crate::execution::context::Entity;

pub struct Evaluator<'a> {
    entity: &'a Entity,
}

impl<'a> Evaluator<'a> {
    pub fn new(entity: &'a Entity) -> Self {
        Self { entity }
    }

    /// Evaluates to a JSON value.
    pub fn evaluate(&self, expr: &Expr) -> ExpressionResult<Value> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Path(path) => Ok(self.resolve(path).cloned().unwrap_or(Value::Null)),
            Expr::List(items) => items
                .iter()
                .map(|item| self.evaluate(item))
                .collect::<ExpressionResult<Vec<_>>>()
                .map(Value::Array),
            Expr::Not(inner) => Ok(Value::Bool(!self.test(inner)?)),
            Expr::And(l, r) => Ok(Value::Bool(self.test(l)? && self.test(r)?)),
            Expr::Or(l, r) => Ok(Value::Bool(self.test(l)? || self.test(r)?)),
            Expr::Compare { op, left, right } => {
                let l = self.evaluate(left)?;
                let r = self.evaluate(right)?;
                compare(*op, &l, &r).map(Value::Bool)
            }
        }
    }

    /// Evaluates and applies truthiness.
    pub fn test(&self, expr: &Expr) -> ExpressionResult<bool> {
        self.evaluate(expr).map(|v| truthy(&v))
    }

    /// Describes the leaf checks responsible for `expr` being false.
    pub fn explain_failure(&self, expr: &Expr) -> ExpressionResult<Vec<String>> {
        let mut reasons = Vec::new();
        self.collect_failures(expr, &mut reasons)?;
        Ok(reasons)
    }

    fn collect_failures(&self, expr: &Expr, out: &mut Vec<String>) -> ExpressionResult<()> {
        match expr {
            Expr::And(l, r) => {
                for side in [l, r] {
                    if !self.test(side)? {
                        self.collect_failures(side, out)?;
                    }
                }
            }
            Expr::Or(l, r) => {
                self.collect_failures(l, out)?;
                self.collect_failures(r, out)?;
            }
            Expr::Compare { left, right, .. } => {
                let mut actuals = Vec::new();
                for side in [left, right] {
                    if let Expr::Path(path) = &**side {
                        actuals.push(format!("{} = {}", path, self.describe_path(path)));
                    }
                }
                if actuals.is_empty() {
                    out.push(expr.to_string());
                } else {
                    out.push(format!("{} (actual: {})", expr, actuals.join(", ")));
                }
            }
            Expr::Path(path) => {
                out.push(format!("{} is not set (actual: {})", path, self.describe_path(path)));
            }
            other => out.push(other.to_string()),
        }
        Ok(())
    }

    fn describe_path(&self, path: &str) -> String {
        match self.resolve(path) {
            Some(Value::String(s)) => format!("'{}'", s),
            Some(v) => v.to_string(),
            None => "null".to_string(),
        }
    }

    fn resolve(&self, path: &str) -> Option<&'a Value> {
        let mut segments = path.split('.');
        let mut current = self.entity.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

/// Truthiness of a bare operand.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn mismatch(op: CompareOp, left: &Value, right: &Value) -> ExpressionError {
    ExpressionError::TypeMismatch {
        op: op.to_string(),
        left: type_name(left).to_string(),
        right: type_name(right).to_string(),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn ordering(op: CompareOp, left: &Value, right: &Value) -> ExpressionResult<Option<Ordering>> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(None),
        (Value::Number(a), Value::Number(b)) => Ok(a
            .as_f64()
            .zip(b.as_f64())
            .and_then(|(a, b)| a.partial_cmp(&b))),
        (Value::String(a), Value::String(b)) => Ok(Some(a.cmp(b))),
        _ => Err(mismatch(op, left, right)),
    }
}

fn membership(op: CompareOp, needle: &Value, haystack: &Value) -> ExpressionResult<bool> {
    match (needle, haystack) {
        (_, Value::Null) => Ok(false),
        (_, Value::Array(items)) => Ok(items.iter().any(|item| values_equal(item, needle))),
        (Value::String(n), Value::String(h)) => Ok(h.contains(n.as_str())),
        (_, Value::Object(map)) => match needle {
            Value::String(key) => Ok(map.contains_key(key)),
            _ => Err(mismatch(op, needle, haystack)),
        },
        _ => Err(mismatch(op, needle, haystack)),
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> ExpressionResult<bool> {
    match op {
        CompareOp::Eq => Ok(values_equal(left, right)),
        CompareOp::NotEq => Ok(!values_equal(left, right)),
        CompareOp::Lt => Ok(ordering(op, left, right)? == Some(Ordering::Less)),
        CompareOp::Le => Ok(matches!(
            ordering(op, left, right)?,
            Some(Ordering::Less | Ordering::Equal)
        )),
        CompareOp::Gt => Ok(ordering(op, left, right)? == Some(Ordering::Greater)),
        CompareOp::Ge => Ok(matches!(
            ordering(op, left, right)?,
            Some(Ordering::Greater | Ordering::Equal)
        )),
        CompareOp::Contains => membership(op, right, left),
        CompareOp::In => membership(op, left, right),
        CompareOp::NotIn => membership(op, left, right).map(|found| !found),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::parser::Parser;
    use serde_json::json;

    fn entity(value: Value) -> Entity {
        match value {
            Value::Object(map) => map,
            _ => Entity::new(),
        }
    }

    fn check(expr: &str, data: Value) -> ExpressionResult<bool> {
        let data = entity(data);
        let parsed = Parser::parse(expr)?;
        Evaluator::new(&data).test(&parsed)
    }

    #[test]
    fn test_numeric_comparisons() {
        let data = json!({"size": 10, "ratio": 0.5});
        assert!(check("size >= 10", data.clone()).unwrap());
        assert!(check("size > 9.5", data.clone()).unwrap());
        assert!(!check("ratio < 0.5", data.clone()).unwrap());
        assert!(check("size == 10.0", data).unwrap());
    }

    #[test]
    fn test_missing_attribute_is_null() {
        assert!(check("owner == null", json!({})).unwrap());
        assert!(!check("owner != null", json!({})).unwrap());
        assert!(!check("score > 3", json!({})).unwrap());
        assert!(!check("owner", json!({})).unwrap());
    }

    #[test]
    fn test_nested_paths() {
        let data = json!({"owner": {"email": "a@x.com"}, "tags": [{"key": "pii"}]});
        assert!(check("owner.email == 'a@x.com'", data.clone()).unwrap());
        assert!(check("tags.0.key == 'pii'", data).unwrap());
    }

    #[test]
    fn test_membership_operators() {
        let data = json!({"status": "active", "labels": ["gold", "eu"], "title": "Sales EU"});
        assert!(check("status IN ['active', 'draft']", data.clone()).unwrap());
        assert!(check("status NOT IN ['retired']", data.clone()).unwrap());
        assert!(check("labels CONTAINS 'eu'", data.clone()).unwrap());
        assert!(check("title CONTAINS 'EU'", data.clone()).unwrap());
        assert!(!check("labels CONTAINS 'us'", data).unwrap());
    }

    #[test]
    fn test_boolean_logic() {
        let data = json!({"a": true, "b": false, "n": 0});
        assert!(check("a AND NOT b", data.clone()).unwrap());
        assert!(check("b OR a", data.clone()).unwrap());
        assert!(!check("n", data.clone()).unwrap());
        assert!(check("NOT (a AND b)", data).unwrap());
    }

    #[test]
    fn test_ordering_type_mismatch() {
        let err = check("name > 3", json!({"name": "x"})).unwrap_err();
        assert!(matches!(err, ExpressionError::TypeMismatch { .. }));
        assert!(err.to_string().contains("string"));
    }

    #[test]
    fn test_explain_failure_lists_actuals() {
        let data = entity(json!({"size": 2, "owner": null}));
        let parsed = Parser::parse("size > 5 AND owner != null AND size < 100").unwrap();
        let reasons = Evaluator::new(&data).explain_failure(&parsed).unwrap();

        assert_eq!(reasons.len(), 2);
        assert_eq!(reasons[0], "size > 5 (actual: size = 2)");
        assert_eq!(reasons[1], "owner != null (actual: owner = null)");
    }
}
