//! Definition validation
//!
//! This module provides structural validation for workflow documents. It does
//! not evaluate expressions; malformed expressions surface when they run.

use crate::definition::types::{Definition, TaskDefinition, TaskList};
use crate::error::{DefinitionError, DefinitionResult};
use std::collections::HashSet;

/// Task keys that annotate a task rather than name its kind
pub const TASK_METADATA_KEYS: &[&str] = &["metadata", "input", "output", "export", "timeout", "then"];

/// Validate a complete definition
pub fn validate_definition(definition: &Definition) -> DefinitionResult<()> {
    validate_dsl_version(&definition.document.dsl)?;

    if definition.document.namespace.trim().is_empty() {
        return Err(DefinitionError::Invalid(
            "document namespace must not be empty".to_string(),
        ));
    }
    if definition.document.name.trim().is_empty() {
        return Err(DefinitionError::Invalid(
            "document name must not be empty".to_string(),
        ));
    }

    validate_task_list(&definition.tasks)
}

/// Validate the DSL version (major version 1)
fn validate_dsl_version(dsl: &str) -> DefinitionResult<()> {
    match dsl.split('.').next() {
        Some("1") => Ok(()),
        _ => Err(DefinitionError::UnsupportedVersion(dsl.to_string())),
    }
}

/// Validate a task list and everything nested in it
pub fn validate_task_list(tasks: &TaskList) -> DefinitionResult<()> {
    let mut seen = HashSet::new();

    for (index, entry) in tasks.iter().enumerate() {
        let (key, task) = entry.single().ok_or(DefinitionError::MalformedEntry {
            index,
            found: entry.0.len(),
        })?;

        if !seen.insert(key.as_str()) {
            return Err(DefinitionError::DuplicateKey(key.clone()));
        }

        validate_task(key, task)?;
    }

    Ok(())
}

/// Validate a single task
pub fn validate_task(key: &str, task: &TaskDefinition) -> DefinitionResult<()> {
    let kinds = task_kinds(task);
    if kinds.len() != 1 {
        return Err(DefinitionError::AmbiguousKind {
            key: key.to_string(),
            found: kinds.len(),
        });
    }

    if task.for_each.is_some() && task.tasks.is_none() {
        return Err(DefinitionError::Invalid(format!(
            "for task '{}' has no 'do' body",
            key
        )));
    }

    if task.while_condition.is_some() && task.for_each.is_none() {
        return Err(DefinitionError::Invalid(format!(
            "task '{}' uses 'while' outside of a for loop",
            key
        )));
    }

    match (&task.call, &task.with) {
        (Some(_), None) => {
            return Err(DefinitionError::Invalid(format!(
                "call task '{}' has no 'with' arguments",
                key
            )))
        }
        (None, Some(_)) => {
            return Err(DefinitionError::Invalid(format!(
                "task '{}' has 'with' arguments but no 'call'",
                key
            )))
        }
        _ => {}
    }

    if let Some(cases) = &task.switch {
        for (index, case) in cases.iter().enumerate() {
            if case.0.len() != 1 {
                return Err(DefinitionError::Invalid(format!(
                    "switch task '{}' case {} must have exactly one label",
                    key, index
                )));
            }
        }
    }

    if let Some(fork) = &task.fork {
        if fork.compete {
            return Err(DefinitionError::Invalid(format!(
                "fork task '{}' uses compete mode, which is not supported",
                key
            )));
        }
        validate_task_list(&fork.branches)?;
    }

    if let Some(body) = &task.tasks {
        validate_task_list(body)?;
    }

    Ok(())
}

/// List the task kinds a definition declares
///
/// A `for` task owns its `do` body, so it counts as a single kind. Any key
/// that is neither a known kind nor task metadata is reported as a kind of
/// its own, so conversion rejects it as unsupported.
pub fn task_kinds(task: &TaskDefinition) -> Vec<&str> {
    let mut kinds = Vec::new();

    if task.for_each.is_some() {
        kinds.push("for");
    } else if task.tasks.is_some() {
        kinds.push("do");
    }
    if task.set.is_some() {
        kinds.push("set");
    }
    if task.switch.is_some() {
        kinds.push("switch");
    }
    if task.fork.is_some() {
        kinds.push("fork");
    }
    if task.call.is_some() {
        kinds.push("call");
    }

    kinds.extend(
        task.other
            .keys()
            .map(String::as_str)
            .filter(|name| !TASK_METADATA_KEYS.contains(name)),
    );

    kinds
}
