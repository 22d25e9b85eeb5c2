//! Expression interpolation for task payloads
//!
//! Call payloads may embed expressions using the `${ ... }` syntax. A string
//! that is exactly one expression resolves to the evaluated value with its
//! type preserved; expressions embedded in longer text are rendered into it.

use crate::error::ExpressionResult;
use crate::runner::{evaluate, State};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// `${ ... }` where quoted literals inside the braces may contain `}`
fn template_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"\$\{((?:[^}"']|"[^"]*"|'[^']*')*)\}"#).expect("template pattern is valid")
    })
}

/// Resolve every embedded expression in a value
pub fn resolve_value(value: &Value, state: &State) -> ExpressionResult<Value> {
    match value {
        Value::String(s) => resolve_str(s, state),
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, state))
            .collect::<ExpressionResult<Vec<Value>>>()
            .map(Value::Array),
        Value::Object(map) => resolve_map(map, state).map(Value::Object),
        other => Ok(other.clone()),
    }
}

/// Resolve every value of a map
pub fn resolve_map(map: &Map<String, Value>, state: &State) -> ExpressionResult<Map<String, Value>> {
    let mut result = Map::new();

    for (key, value) in map {
        result.insert(key.clone(), resolve_value(value, state)?);
    }

    Ok(result)
}

/// Resolve a string: a whole-string expression keeps its type, anything
/// else is interpolated into text
pub fn resolve_str(s: &str, state: &State) -> ExpressionResult<Value> {
    let trimmed = s.trim();
    let is_whole = trimmed.starts_with("${")
        && template_pattern()
            .find(trimmed)
            .is_some_and(|m| m.start() == 0 && m.end() == trimmed.len());

    if is_whole {
        return evaluate(trimmed, state);
    }

    interpolate(s, state).map(Value::String)
}

/// Interpolate embedded expressions into a string
pub fn interpolate(s: &str, state: &State) -> ExpressionResult<String> {
    let pattern = template_pattern();
    let mut result = String::with_capacity(s.len());
    let mut last = 0;

    for caps in pattern.captures_iter(s) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        result.push_str(&s[last..whole.start()]);
        let value = evaluate(inner.as_str(), state)?;
        result.push_str(&render(&value));
        last = whole.end();
    }

    result.push_str(&s[last..]);
    Ok(result)
}

/// Render a value as display text
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // For objects/arrays, return compact JSON
        _ => value.to_string(),
    }
}
