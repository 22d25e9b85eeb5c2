//! Condition expression evaluation
//!
//! Expressions follow a deliberately small grammar:
//!
//! - a property path such as `.status`, `orderType` or `.order.kind`
//! - an equality test `<path> == "literal"` (single or double quotes)
//!
//! Either form may be wrapped in a `${ ... }` template marker.

use crate::error::{ExpressionError, ExpressionResult};
use crate::runner::State;
use serde_json::Value;

/// A parsed expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Property lookup
    Path(PropertyPath),

    /// Structural equality between a property and a string literal
    Equals { path: PropertyPath, literal: String },
}

/// A dotted property path
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyPath {
    segments: Vec<String>,
}

impl PropertyPath {
    /// Parse a path such as `.order.kind` or `status`
    pub fn parse(source: &str) -> ExpressionResult<Self> {
        let trimmed = source.trim();
        let body = trimmed.strip_prefix('.').unwrap_or(trimmed);
        if body.is_empty() {
            return Err(ExpressionError::syntax(source, "empty property path"));
        }

        let segments = body
            .split('.')
            .map(|segment| {
                if is_identifier(segment) {
                    Ok(segment.to_string())
                } else {
                    Err(ExpressionError::syntax(
                        source,
                        format!("invalid path segment '{}'", segment),
                    ))
                }
            })
            .collect::<ExpressionResult<Vec<String>>>()?;

        Ok(PropertyPath { segments })
    }

    /// Path segments in order
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Resolve the path against a state
    pub fn resolve<'s>(&self, state: &'s State) -> ExpressionResult<&'s Value> {
        state
            .lookup_path(&self.segments)
            .ok_or_else(|| ExpressionError::PropertyNotFound(self.to_string()))
    }
}

impl std::fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, ".{}", self.segments.join("."))
    }
}

impl Expression {
    /// Parse an expression, stripping an optional `${ ... }` wrapper
    pub fn parse(source: &str) -> ExpressionResult<Self> {
        let inner = strip_template(source)?;
        if inner.is_empty() {
            return Err(ExpressionError::syntax(source, "empty expression"));
        }

        match inner.split_once("==") {
            Some((left, right)) => Ok(Expression::Equals {
                path: PropertyPath::parse(left)?,
                literal: parse_literal(source, right)?,
            }),
            None => Ok(Expression::Path(PropertyPath::parse(inner)?)),
        }
    }

    /// Evaluate against a state
    pub fn evaluate(&self, state: &State) -> ExpressionResult<Value> {
        match self {
            Expression::Path(path) => path.resolve(state).cloned(),
            Expression::Equals { path, literal } => {
                let left = path.resolve(state)?;
                Ok(Value::Bool(left.as_str() == Some(literal.as_str())))
            }
        }
    }
}

/// Parse and evaluate an expression in one step
pub fn evaluate(source: &str, state: &State) -> ExpressionResult<Value> {
    Expression::parse(source)?.evaluate(state)
}

/// Evaluate an expression and classify the result
pub fn evaluate_condition(source: &str, state: &State) -> ExpressionResult<bool> {
    evaluate(source, state).map(|value| is_truthy(&value))
}

/// Boolean classification of a value
///
/// Null, false, empty strings, numeric zero and empty collections are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Strip a `${ ... }` wrapper and surrounding whitespace
pub fn strip_template(source: &str) -> ExpressionResult<&str> {
    let trimmed = source.trim();
    match trimmed.strip_prefix("${") {
        Some(rest) => rest
            .strip_suffix('}')
            .map(str::trim)
            .ok_or_else(|| ExpressionError::syntax(source, "unterminated '${'")),
        None => Ok(trimmed),
    }
}

/// Parse the quoted right-hand side of an equality test
fn parse_literal(source: &str, text: &str) -> ExpressionResult<String> {
    let text = text.trim();
    let quote = match text.chars().next() {
        Some(q @ ('"' | '\'')) => q,
        Some(_) => {
            return Err(ExpressionError::syntax(
                source,
                "right-hand side must be a quoted string",
            ))
        }
        None => return Err(ExpressionError::syntax(source, "missing right-hand side")),
    };

    let body = &text[1..];
    match body.find(quote) {
        Some(end) if end + 1 == body.len() => Ok(body[..end].to_string()),
        Some(_) => Err(ExpressionError::syntax(
            source,
            "unexpected text after string literal",
        )),
        None => Err(ExpressionError::syntax(source, "unterminated string literal")),
    }
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(value: Value) -> State {
        State::from_value(value).unwrap()
    }

    #[test]
    fn test_equality_true() {
        let s = state(json!({"orderType": "electronic"}));
        let result = evaluate("${.orderType == \"electronic\"}", &s).unwrap();
        assert_eq!(result, json!(true));
    }

    #[test]
    fn test_equality_false() {
        let s = state(json!({"orderType": "physical"}));
        let result = evaluate("${.orderType == \"electronic\"}", &s).unwrap();
        assert_eq!(result, json!(false));
    }

    #[test]
    fn test_equality_single_quotes_and_spacing() {
        let s = state(json!({"orderType": "electronic"}));
        assert_eq!(
            evaluate("${ .orderType=='electronic' }", &s).unwrap(),
            json!(true)
        );
    }

    #[test]
    fn test_equality_against_non_string_is_false() {
        let s = state(json!({"count": 3}));
        assert_eq!(evaluate(".count == \"3\"", &s).unwrap(), json!(false));
    }

    #[test]
    fn test_equality_missing_left_side_fails() {
        let s = state(json!({"orderType": "electronic"}));
        let result = evaluate("${.kind == \"electronic\"}", &s);
        assert_eq!(
            result,
            Err(ExpressionError::PropertyNotFound(".kind".to_string()))
        );
    }

    #[test]
    fn test_property_access() {
        let s = state(json!({"orderType": "electronic"}));
        assert_eq!(evaluate(".orderType", &s).unwrap(), json!("electronic"));
        assert_eq!(evaluate("orderType", &s).unwrap(), json!("electronic"));
    }

    #[test]
    fn test_property_access_empty_string() {
        let s = state(json!({"status": ""}));
        let value = evaluate(".status", &s).unwrap();
        assert_eq!(value, json!(""));
        assert!(!is_truthy(&value));
    }

    #[test]
    fn test_property_not_found() {
        let s = state(json!({"orderType": "electronic"}));
        assert!(matches!(
            evaluate(".nonexistent", &s),
            Err(ExpressionError::PropertyNotFound(_))
        ));
    }

    #[test]
    fn test_nested_property_access() {
        let s = state(json!({"order": {"kind": "gift"}}));
        assert_eq!(evaluate("${ .order.kind }", &s).unwrap(), json!("gift"));
        assert_eq!(
            evaluate(".order.kind == \"gift\"", &s).unwrap(),
            json!(true)
        );
    }

    #[test]
    fn test_evaluate_condition() {
        let s = state(json!({"status": "active", "empty": ""}));
        assert!(evaluate_condition("${.status}", &s).unwrap());
        assert!(!evaluate_condition("${.empty}", &s).unwrap());
    }

    #[test]
    fn test_syntax_errors() {
        let s = State::new();
        for source in [
            "",
            "${}",
            "${ .status",
            ".status ==",
            ".status == electronic",
            ".status == \"open",
            ".status == \"a\" extra",
            ". == \"a\"",
            ".9lives",
            ".a..b",
        ] {
            assert!(
                matches!(evaluate(source, &s), Err(ExpressionError::Syntax { .. })),
                "expected syntax error for {:?}",
                source
            );
        }
    }

    #[test]
    fn test_is_truthy() {
        assert!(!is_truthy(&json!(null)));
        assert!(is_truthy(&json!(true)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!("hello")));
        assert!(!is_truthy(&json!(0)));
        assert!(is_truthy(&json!(42)));
        assert!(is_truthy(&json!(-1)));
        assert!(!is_truthy(&json!(0.0)));
        assert!(!is_truthy(&json!(-0.0)));
        assert!(is_truthy(&json!(3.14)));
        assert!(!is_truthy(&json!([])));
        assert!(is_truthy(&json!([1, 2, 3])));
        assert!(!is_truthy(&json!({})));
        assert!(is_truthy(&json!({"k": "v"})));
    }

    #[test]
    fn test_parse_display_roundtrip_path() {
        let expr = Expression::parse("order.kind").unwrap();
        match expr {
            Expression::Path(path) => assert_eq!(path.to_string(), ".order.kind"),
            other => panic!("unexpected expression {:?}", other),
        }
    }
}
