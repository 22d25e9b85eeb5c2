//! Fork branch coordination
//!
//! Each branch runs against its own snapshot of the parent state. Branches
//! are polled concurrently up to the configured bound, results come back in
//! declaration order, and branch state is never merged into the parent.

use crate::error::{ExecutionError, ExecutionResult};
use crate::runner::dispatch::run_list;
use crate::runner::{Engine, State, TaskList};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument};

/// Outcome of one branch
#[derive(Debug, Clone, PartialEq)]
pub struct BranchResult {
    /// Value of the branch's task list
    pub value: Value,

    /// Branch state after it finished
    pub state: State,
}

/// Run every branch to completion and collect results in declaration order
///
/// If any branch fails, the error of the lowest-index failing branch is
/// reported once all branches have finished.
pub async fn run_fork(
    engine: &Engine,
    key: &str,
    branches: &[TaskList],
    state: &State,
) -> ExecutionResult<Vec<BranchResult>> {
    if branches.is_empty() {
        return Err(ExecutionError::EmptyFork(key.to_string()));
    }

    let limit = engine.config().branch_limit(branches.len());
    debug!(key, branches = branches.len(), limit, "Forking");

    // Collected first: a borrowing closure inside the stream breaks the
    // `Send` bound on the recursive boxed future.
    let pending: Vec<_> = branches
        .iter()
        .enumerate()
        .map(|(index, branch)| run_branch(engine, index, branch, state.snapshot()))
        .collect();

    let outcomes: Vec<ExecutionResult<BranchResult>> =
        stream::iter(pending).buffered(limit).collect().await;

    let mut results = Vec::with_capacity(outcomes.len());
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(result) => results.push(result),
            Err(err) => {
                warn!(key, index, error = %err, "Branch failed");
                return Err(ExecutionError::BranchFailure {
                    key: key.to_string(),
                    index,
                    source: Box::new(err),
                });
            }
        }
    }

    info!(key, branches = results.len(), "Fork joined");
    Ok(results)
}

async fn run_branch(
    engine: &Engine,
    index: usize,
    branch: &TaskList,
    mut state: State,
) -> ExecutionResult<BranchResult> {
    async move {
        let value = run_list(engine, branch, &mut state).await?;
        Ok(BranchResult { value, state })
    }
    .instrument(info_span!("branch", index))
    .await
}
