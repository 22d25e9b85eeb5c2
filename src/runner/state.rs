//! Execution state for task running
//!
//! The state is the name-to-value mapping that tasks read and write. One
//! instance exists per execution scope; sequential scopes share it by
//! reference and fork branches each receive their own snapshot.

use serde_json::{Map, Value};

/// Mutable execution state of one scope
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    vars: Map<String, Value>,
}

impl State {
    /// Create an empty state
    pub fn new() -> Self {
        State { vars: Map::new() }
    }

    /// Create a state from a JSON value; only objects are accepted
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(vars) => Some(State { vars }),
            Value::Null => Some(State::new()),
            _ => None,
        }
    }

    /// Get a variable value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Set a variable, overwriting any previous value
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.vars.insert(key.into(), value);
    }

    /// Remove a variable
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.vars.remove(key)
    }

    /// Check whether a variable is set
    pub fn contains_key(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// Look up a dotted path: the first segment names a variable, the rest
    /// descend into nested objects
    pub fn lookup_path<S: AsRef<str>>(&self, segments: &[S]) -> Option<&Value> {
        let (first, rest) = segments.split_first()?;
        let mut current = self.vars.get(first.as_ref())?;
        for segment in rest {
            current = current.as_object()?.get(segment.as_ref())?;
        }
        Some(current)
    }

    /// Record a task result under its key and its positional alias
    pub fn record_result(&mut self, index: usize, key: &str, result: Value) {
        self.vars.insert(result_alias(index), result.clone());
        self.vars.insert(key.to_string(), result);
    }

    /// Take an independent copy of this state
    pub fn snapshot(&self) -> State {
        self.clone()
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether the state holds no variables
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Convert into a JSON object
    pub fn into_value(self) -> Value {
        Value::Object(self.vars)
    }
}

impl From<Map<String, Value>> for State {
    fn from(vars: Map<String, Value>) -> Self {
        State { vars }
    }
}

/// Positional alias a task result is also stored under
pub fn result_alias(index: usize) -> String {
    format!("task_{}_result", index)
}
