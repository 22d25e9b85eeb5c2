//! Task model
//!
//! This module contains the runtime representation of tasks: a closed set of
//! task kinds arranged in ordered, named task lists. It is built from the
//! definition types once the definition has been validated.

use crate::definition::{self, task_kinds};
use crate::error::{DefinitionError, DefinitionResult};
use serde_json::{Map, Value};

/// Loop index variable used when a `for` task does not name one
pub const DEFAULT_INDEX_NAME: &str = "index";

/// Ordered list of tasks executed in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskList {
    items: Vec<TaskItem>,
}

impl TaskList {
    /// Create a task list from items
    pub fn new(items: Vec<TaskItem>) -> Self {
        TaskList { items }
    }

    /// Build a task list from its definition
    pub fn from_definition(tasks: &[definition::TaskEntry]) -> DefinitionResult<Self> {
        let mut items = Vec::with_capacity(tasks.len());

        for (index, entry) in tasks.iter().enumerate() {
            let (key, task) = entry.single().ok_or(DefinitionError::MalformedEntry {
                index,
                found: entry.0.len(),
            })?;
            items.push(TaskItem::from_definition(key, task)?);
        }

        Ok(TaskList { items })
    }

    /// Iterate over the items in order
    pub fn iter(&self) -> std::slice::Iter<'_, TaskItem> {
        self.items.iter()
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<TaskItem> for TaskList {
    fn from_iter<I: IntoIterator<Item = TaskItem>>(iter: I) -> Self {
        TaskList::new(iter.into_iter().collect())
    }
}

/// One named task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskItem {
    /// Key, unique within the enclosing list
    pub key: String,

    /// Guard expression; the task is skipped when it is falsy
    pub condition: Option<String>,

    /// What the task does
    pub kind: TaskKind,
}

impl TaskItem {
    /// Create an unguarded task
    pub fn new(key: impl Into<String>, kind: TaskKind) -> Self {
        TaskItem {
            key: key.into(),
            condition: None,
            kind,
        }
    }

    /// Guard the task with a condition
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Create a task from its definition
    pub fn from_definition(key: &str, task: &definition::TaskDefinition) -> DefinitionResult<Self> {
        let kinds = task_kinds(task);
        let kind = match kinds.as_slice() {
            [kind] => *kind,
            _ => {
                return Err(DefinitionError::AmbiguousKind {
                    key: key.to_string(),
                    found: kinds.len(),
                })
            }
        };

        let unsupported = |kind: &str| DefinitionError::UnsupportedTaskKind {
            key: key.to_string(),
            kind: kind.to_string(),
        };

        let kind = match kind {
            "set" => TaskKind::Set(task.set.clone().unwrap_or_default()),
            "switch" => TaskKind::Switch(SwitchCase::from_definition(
                task.switch.as_deref().unwrap_or_default(),
            )?),
            "for" => {
                let header = task.for_each.as_ref().ok_or_else(|| unsupported(kind))?;
                TaskKind::For(ForTask {
                    each: header.each.clone(),
                    at: header
                        .at
                        .clone()
                        .unwrap_or_else(|| DEFAULT_INDEX_NAME.to_string()),
                    in_expr: header.in_expr.clone(),
                    while_condition: task.while_condition.clone(),
                    body: TaskList::from_definition(task.tasks.as_deref().unwrap_or_default())?,
                })
            }
            "fork" => {
                let fork = task.fork.as_ref().ok_or_else(|| unsupported(kind))?;
                // Each branch entry runs as its own one-task list
                let branches = fork
                    .branches
                    .iter()
                    .map(|entry| TaskList::from_definition(std::slice::from_ref(entry)))
                    .collect::<DefinitionResult<Vec<TaskList>>>()?;
                TaskKind::Fork(branches)
            }
            "do" => TaskKind::Do(TaskList::from_definition(
                task.tasks.as_deref().unwrap_or_default(),
            )?),
            "call" => TaskKind::Call(CallTask::from_definition(key, task)?),
            other => return Err(unsupported(other)),
        };

        Ok(TaskItem {
            key: key.to_string(),
            condition: task.condition.clone(),
            kind,
        })
    }
}

/// The closed set of task kinds
#[derive(Debug, Clone, PartialEq)]
pub enum TaskKind {
    /// Overwrite variables in the current scope
    Set(Map<String, Value>),

    /// Select the first matching case
    Switch(Vec<SwitchCase>),

    /// Iterate over an array
    For(ForTask),

    /// Run branches concurrently on isolated state copies
    Fork(Vec<TaskList>),

    /// Run a nested list in the current scope
    Do(TaskList),

    /// Hand a request to the call collaborator
    Call(CallTask),
}

impl TaskKind {
    /// Kind name as written in definitions
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::Set(_) => "set",
            TaskKind::Switch(_) => "switch",
            TaskKind::For(_) => "for",
            TaskKind::Fork(_) => "fork",
            TaskKind::Do(_) => "do",
            TaskKind::Call(_) => "call",
        }
    }
}

/// One case of a switch task
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub label: String,
    pub when: Option<String>,
    pub then: FlowTarget,
}

impl SwitchCase {
    fn from_definition(entries: &[definition::SwitchEntry]) -> DefinitionResult<Vec<Self>> {
        entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let mut cases = entry.0.iter();
                match (cases.next(), cases.next()) {
                    (Some((label, case)), None) => Ok(SwitchCase {
                        label: label.clone(),
                        when: case.when.clone(),
                        then: case
                            .then
                            .as_deref()
                            .map(FlowTarget::parse)
                            .unwrap_or(FlowTarget::Continue),
                    }),
                    _ => Err(DefinitionError::Invalid(format!(
                        "switch case {} must have exactly one label",
                        index
                    ))),
                }
            })
            .collect()
    }
}

/// Where execution goes after a switch case is selected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowTarget {
    /// Proceed with the next sibling
    Continue,

    /// Stop the enclosing list
    Exit,

    /// Stop the enclosing list ("end" is treated like "exit")
    End,

    /// Any other target; recorded but not routed
    Label(String),
}

impl FlowTarget {
    /// Parse a `then` directive
    pub fn parse(target: &str) -> Self {
        match target {
            "continue" => FlowTarget::Continue,
            "exit" => FlowTarget::Exit,
            "end" => FlowTarget::End,
            other => FlowTarget::Label(other.to_string()),
        }
    }

    /// Directive as written in definitions
    pub fn as_str(&self) -> &str {
        match self {
            FlowTarget::Continue => "continue",
            FlowTarget::Exit => "exit",
            FlowTarget::End => "end",
            FlowTarget::Label(label) => label,
        }
    }

    /// Whether selecting this target stops the enclosing list
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowTarget::Exit | FlowTarget::End)
    }
}

/// Iteration task
#[derive(Debug, Clone, PartialEq)]
pub struct ForTask {
    /// Name the element is bound to
    pub each: String,

    /// Name the index is bound to
    pub at: String,

    /// Expression producing the array
    pub in_expr: String,

    /// Condition checked before each iteration
    pub while_condition: Option<String>,

    /// Loop body
    pub body: TaskList,
}

/// External call task; every field may embed expressions
#[derive(Debug, Clone, PartialEq)]
pub struct CallTask {
    pub method: Value,
    pub target: Value,
    pub body: Value,
    pub headers: Map<String, Value>,
}

impl CallTask {
    fn from_definition(key: &str, task: &definition::TaskDefinition) -> DefinitionResult<Self> {
        let protocol = task.call.as_deref().unwrap_or_default();
        if protocol != "http" {
            return Err(DefinitionError::UnsupportedTaskKind {
                key: key.to_string(),
                kind: format!("call:{}", protocol),
            });
        }

        let with = task.with.as_ref().ok_or_else(|| {
            DefinitionError::Invalid(format!("call task '{}' has no 'with' arguments", key))
        })?;

        Ok(CallTask {
            method: with.method.clone(),
            target: Value::String(with.endpoint.uri().to_string()),
            body: with.body.clone(),
            headers: with.headers.clone(),
        })
    }
}
