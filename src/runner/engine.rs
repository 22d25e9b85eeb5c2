//! Workflow engine
//!
//! The engine owns the call collaborator and configuration, and runs a
//! converted task tree against an initial state.

use crate::definition::{validate_definition, Definition, Document};
use crate::error::{DefinitionResult, ExecutionError, ExecutionResult};
use crate::runner::dispatch::run_list;
use crate::runner::{Caller, State, TaskList};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Default bound on concurrently running fork branches
pub const DEFAULT_MAX_CONCURRENT_BRANCHES: usize = 16;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of fork branches polled at once; 0 means unbounded
    pub max_concurrent_branches: usize,

    /// Turn responses with status >= 400 into call failures
    pub reject_error_status: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_concurrent_branches: DEFAULT_MAX_CONCURRENT_BRANCHES,
            reject_error_status: true,
        }
    }
}

impl EngineConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the branch concurrency bound
    pub fn with_max_concurrent_branches(mut self, limit: usize) -> Self {
        self.max_concurrent_branches = limit;
        self
    }

    /// Set the error status policy
    pub fn with_reject_error_status(mut self, reject: bool) -> Self {
        self.reject_error_status = reject;
        self
    }

    /// Number of branches to poll at once for a fork of the given width
    pub fn branch_limit(&self, branches: usize) -> usize {
        let width = branches.max(1);
        match self.max_concurrent_branches {
            0 => width,
            limit => limit.min(width),
        }
    }
}

/// A runnable workflow
#[derive(Debug, Clone)]
pub struct Workflow {
    /// Document header, if the workflow was loaded from a definition
    pub document: Option<Document>,

    /// Initial state seed
    pub input: Map<String, Value>,

    /// Root task list
    pub tasks: TaskList,
}

impl Workflow {
    /// Create a workflow from a task list
    pub fn new(tasks: TaskList) -> Self {
        Workflow {
            document: None,
            input: Map::new(),
            tasks,
        }
    }

    /// Validate a definition and convert it into a workflow
    pub fn from_definition(definition: &Definition) -> DefinitionResult<Self> {
        validate_definition(definition)?;

        Ok(Workflow {
            document: Some(definition.document.clone()),
            input: definition.input.clone().unwrap_or_default(),
            tasks: TaskList::from_definition(&definition.tasks)?,
        })
    }

    /// Workflow name for display
    pub fn name(&self) -> &str {
        self.document
            .as_ref()
            .map(|document| document.name.as_str())
            .unwrap_or("workflow")
    }

    /// State seeded from the workflow input, overlaid with `overrides`
    pub fn initial_state(&self, overrides: Option<Map<String, Value>>) -> State {
        let mut state = State::from(self.input.clone());
        for (key, value) in overrides.unwrap_or_default() {
            state.set(key, value);
        }
        state
    }
}

/// Outcome of a successful execution
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowOutput {
    /// Value of the root task list
    pub result: Value,

    /// Final state
    pub state: State,
}

impl WorkflowOutput {
    /// The final state object with the root result under `"result"`
    pub fn into_value(self) -> Value {
        let mut state = self.state;
        state.set("result", self.result);
        state.into_value()
    }
}

/// A failed execution together with the state as it was when it failed
#[derive(Error, Debug)]
#[error("{error}")]
pub struct ExecutionFailure {
    #[source]
    pub error: ExecutionError,

    /// Mutations applied before the failing task are kept
    pub state: State,
}

/// Runs task trees against a state
#[derive(Clone)]
pub struct Engine {
    caller: Arc<dyn Caller>,
    config: EngineConfig,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine with the default configuration
    pub fn new(caller: Arc<dyn Caller>) -> Self {
        Engine {
            caller,
            config: EngineConfig::default(),
        }
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Current configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn caller(&self) -> &dyn Caller {
        self.caller.as_ref()
    }

    /// Execute a workflow
    pub async fn execute(
        &self,
        workflow: &Workflow,
        mut state: State,
    ) -> Result<WorkflowOutput, ExecutionFailure> {
        info!(
            workflow = workflow.name(),
            tasks = workflow.tasks.len(),
            "Starting workflow"
        );

        match self.execute_tasks(&workflow.tasks, &mut state).await {
            Ok(result) => {
                info!(workflow = workflow.name(), "Workflow completed");
                Ok(WorkflowOutput { result, state })
            }
            Err(err) => {
                error!(workflow = workflow.name(), error = %err, "Workflow failed");
                Err(ExecutionFailure { error: err, state })
            }
        }
    }

    /// Execute a task list in the scope of `state`
    pub async fn execute_tasks(&self, tasks: &TaskList, state: &mut State) -> ExecutionResult<Value> {
        run_list(self, tasks, state).await
    }
}
