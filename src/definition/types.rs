//! Core definition types
//!
//! This module defines the data structures that represent a workflow document:
//! a `document` header plus a `do` list of named tasks, in the shape of the
//! Serverless Workflow DSL.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Top-level workflow definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Definition {
    /// Document header
    pub document: Document,

    /// Initial state seed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Map<String, Value>>,

    /// Root task list
    #[serde(rename = "do", default)]
    pub tasks: TaskList,
}

/// Workflow document header
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Document {
    /// DSL version the document targets (e.g. "1.0.0")
    pub dsl: String,

    /// Namespace the workflow belongs to
    pub namespace: String,

    /// Workflow name
    pub name: String,

    /// Workflow version
    pub version: String,

    /// Human readable title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Short summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// An ordered list of `- <key>: <task>` entries
pub type TaskList = Vec<TaskEntry>;

/// One entry of a task list
///
/// Written as a single-key map; the key names the task.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct TaskEntry(pub BTreeMap<String, TaskDefinition>);

impl TaskEntry {
    /// Create an entry with a single named task
    pub fn new(key: impl Into<String>, task: TaskDefinition) -> Self {
        let mut map = BTreeMap::new();
        map.insert(key.into(), task);
        TaskEntry(map)
    }

    /// The single `(key, task)` pair, if the entry is well formed
    pub fn single(&self) -> Option<(&String, &TaskDefinition)> {
        if self.0.len() == 1 {
            self.0.iter().next()
        } else {
            None
        }
    }
}

/// A task definition
///
/// Exactly one kind field is expected to be set. `for` tasks also carry a
/// `do` body and an optional `while` condition.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TaskDefinition {
    /// Condition guarding the task; the task is skipped when it is falsy
    #[serde(rename = "if", default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Variable assignments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<Map<String, Value>>,

    /// Conditional branching cases
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch: Option<Vec<SwitchEntry>>,

    /// Iteration header
    #[serde(rename = "for", default, skip_serializing_if = "Option::is_none")]
    pub for_each: Option<ForDefinition>,

    /// Loop continuation condition (only meaningful with `for`)
    #[serde(rename = "while", default, skip_serializing_if = "Option::is_none")]
    pub while_condition: Option<String>,

    /// Parallel branches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fork: Option<ForkDefinition>,

    /// Nested task list (the body of a `for` task, or a `do` task)
    #[serde(rename = "do", default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<TaskList>,

    /// Call protocol (only "http" is understood)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call: Option<String>,

    /// Call arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with: Option<CallArguments>,

    /// Any other fields (other task kinds, metadata, ...)
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

/// One switch case, written as a single-key map `- <label>: {when, then}`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SwitchEntry(pub BTreeMap<String, SwitchCase>);

impl SwitchEntry {
    /// Create an entry with a single labelled case
    pub fn new(label: impl Into<String>, case: SwitchCase) -> Self {
        let mut map = BTreeMap::new();
        map.insert(label.into(), case);
        SwitchEntry(map)
    }
}

/// A switch case body
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SwitchCase {
    /// Condition; a case without one always matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,

    /// Flow directive ("continue", "exit", "end" or a task name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub then: Option<String>,
}

/// Iteration header of a `for` task
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForDefinition {
    /// Name the current element is bound to
    pub each: String,

    /// Expression producing the array to iterate
    #[serde(rename = "in")]
    pub in_expr: String,

    /// Name the current index is bound to (defaults to "index")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<String>,
}

/// Fork header
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ForkDefinition {
    /// Branches, one task per entry
    #[serde(default)]
    pub branches: TaskList,

    /// Whether the first finishing branch wins
    #[serde(default)]
    pub compete: bool,
}

/// Arguments of an http call
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CallArguments {
    /// HTTP method, may be an expression
    pub method: Value,

    /// Call target
    pub endpoint: Endpoint,

    /// Request body, may embed expressions
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub body: Value,

    /// Request headers, values may embed expressions
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub headers: Map<String, Value>,
}

/// Call endpoint, either a bare URI or `{uri: ...}`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Endpoint {
    /// Plain URI string
    Uri(String),

    /// Endpoint object
    Detailed { uri: String },
}

impl Endpoint {
    /// The URI template of this endpoint
    pub fn uri(&self) -> &str {
        match self {
            Endpoint::Uri(uri) => uri,
            Endpoint::Detailed { uri } => uri,
        }
    }
}
