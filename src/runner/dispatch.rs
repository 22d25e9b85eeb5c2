//! Task dispatch
//!
//! Runs a task list sequentially against one scope, one algorithm per task
//! kind. Nested lists recurse through [`run_list`], which boxes its future.

use crate::error::{CallError, ExecutionError, ExecutionResult};
use crate::runner::fork::run_fork;
use crate::runner::{
    evaluate, evaluate_condition, CallTask, Engine, ForTask, State, SwitchCase, TaskItem,
    TaskKind, TaskList,
};
use futures::future::{BoxFuture, FutureExt};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

/// What the enclosing list does after a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Exit,
}

/// Run a task list in the scope of `state`, returning the last result
pub(crate) fn run_list<'a>(
    engine: &'a Engine,
    tasks: &'a TaskList,
    state: &'a mut State,
) -> BoxFuture<'a, ExecutionResult<Value>> {
    async move {
        let mut last = Value::Null;

        for (index, item) in tasks.iter().enumerate() {
            if let Some(condition) = &item.condition {
                if !evaluate_condition(condition, state)? {
                    debug!(index, key = %item.key, "Skipping task, condition is false");
                    continue;
                }
            }

            info!(index, key = %item.key, kind = item.kind.name(), "Running task");
            let (value, flow) = run_item(engine, item, state).await?;
            state.record_result(index, &item.key, value.clone());
            last = value;

            if flow == Flow::Exit {
                debug!(index, key = %item.key, "Leaving task list");
                break;
            }
        }

        Ok(last)
    }
    .boxed()
}

async fn run_item(
    engine: &Engine,
    item: &TaskItem,
    state: &mut State,
) -> ExecutionResult<(Value, Flow)> {
    let key = item.key.as_str();

    match &item.kind {
        TaskKind::Set(assignments) => Ok((run_set(assignments, state), Flow::Continue)),
        TaskKind::Switch(cases) => run_switch(key, cases, state),
        TaskKind::For(task) => Ok((run_for(engine, key, task, state).await?, Flow::Continue)),
        TaskKind::Fork(branches) => {
            let results = run_fork(engine, key, branches, state).await?;
            let values = results.into_iter().map(|branch| branch.value).collect();
            Ok((Value::Array(values), Flow::Continue))
        }
        TaskKind::Do(body) => Ok((run_list(engine, body, state).await?, Flow::Continue)),
        TaskKind::Call(task) => Ok((run_call(engine, key, task, state).await?, Flow::Continue)),
    }
}

fn run_set(assignments: &Map<String, Value>, state: &mut State) -> Value {
    for (name, value) in assignments {
        state.set(name.clone(), value.clone());
    }
    Value::Object(assignments.clone())
}

fn run_switch(key: &str, cases: &[SwitchCase], state: &State) -> ExecutionResult<(Value, Flow)> {
    for case in cases {
        let selected = match &case.when {
            Some(condition) => evaluate_condition(condition, state)?,
            None => true,
        };

        if selected {
            debug!(key, case = %case.label, then = case.then.as_str(), "Switch case selected");
            let flow = if case.then.is_terminal() {
                Flow::Exit
            } else {
                Flow::Continue
            };
            return Ok((json!({"case": case.label, "then": case.then.as_str()}), flow));
        }
    }

    debug!(key, "No switch case matched");
    Ok((Value::Null, Flow::Continue))
}

async fn run_for(
    engine: &Engine,
    key: &str,
    task: &ForTask,
    state: &State,
) -> ExecutionResult<Value> {
    let items = match evaluate(&task.in_expr, state)? {
        Value::Array(items) => items,
        _ => {
            return Err(ExecutionError::NotIterable {
                key: key.to_string(),
                expression: task.in_expr.clone(),
            })
        }
    };

    // Loop scope lives for the whole loop and is dropped afterwards
    let mut scope = state.snapshot();
    let mut results = Vec::with_capacity(items.len());

    for (index, item) in items.into_iter().enumerate() {
        scope.set(task.each.as_str(), item);
        scope.set(task.at.as_str(), Value::from(index));

        if let Some(condition) = &task.while_condition {
            if !evaluate_condition(condition, &scope)? {
                debug!(key, index, "Loop condition is false");
                break;
            }
        }

        results.push(run_list(engine, &task.body, &mut scope).await?);
    }

    debug!(key, iterations = results.len(), "Loop finished");
    Ok(Value::Array(results))
}

async fn run_call(
    engine: &Engine,
    key: &str,
    task: &CallTask,
    state: &State,
) -> ExecutionResult<Value> {
    let request = task.resolve(key, state)?;
    debug!(key, method = %request.method, target = %request.target, "Dispatching call");

    let response = engine
        .caller()
        .call(request)
        .await
        .map_err(|source| ExecutionError::CallFailure {
            key: key.to_string(),
            source,
        })?;
    info!(key, status = response.status, "Call completed");

    if engine.config().reject_error_status && response.is_error_status() {
        return Err(ExecutionError::CallFailure {
            key: key.to_string(),
            source: CallError::ErrorStatus(response.status),
        });
    }

    Ok(response.into_value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::parse_definition;
    use crate::error::ExpressionError;
    use crate::runner::{CallResponse, EngineConfig, FixtureCaller};
    use std::sync::Arc;

    fn tasks(yaml_do: &str) -> TaskList {
        let yaml = format!(
            "document:\n  dsl: 1.0.0\n  namespace: test\n  name: dispatch\n  version: 1.0.0\n{}",
            yaml_do
        );
        let definition = parse_definition(&yaml).unwrap();
        TaskList::from_definition(&definition.tasks).unwrap()
    }

    fn engine() -> Engine {
        Engine::new(Arc::new(FixtureCaller::new()))
    }

    fn state(value: Value) -> State {
        State::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_set_overwrites_and_returns_assignments() {
        let list = tasks(
            r#"
do:
  - assign:
      set:
        status: done
        count: 2
"#,
        );
        let mut s = state(json!({"status": "pending", "other": 1}));

        let result = engine().execute_tasks(&list, &mut s).await.unwrap();

        assert_eq!(result, json!({"status": "done", "count": 2}));
        assert_eq!(s.get("status"), Some(&json!("done")));
        assert_eq!(s.get("other"), Some(&json!(1)));
        assert_eq!(s.get("assign"), Some(&result));
        assert_eq!(s.get("task_0_result"), Some(&result));
    }

    #[tokio::test]
    async fn test_set_is_idempotent() {
        let list = tasks(
            r#"
do:
  - assign:
      set:
        status: done
"#,
        );
        let engine = engine();
        let mut s = State::new();

        engine.execute_tasks(&list, &mut s).await.unwrap();
        let once = s.clone();
        engine.execute_tasks(&list, &mut s).await.unwrap();

        assert_eq!(s, once);
    }

    #[tokio::test]
    async fn test_sequential_mutations_are_visible() {
        let list = tasks(
            r#"
do:
  - first:
      set:
        orderType: electronic
  - route:
      switch:
        - digital:
            when: ${ .orderType == "electronic" }
"#,
        );
        let mut s = State::new();

        let result = engine().execute_tasks(&list, &mut s).await.unwrap();
        assert_eq!(result, json!({"case": "digital", "then": "continue"}));
        assert_eq!(s.get("task_1_result"), Some(&result));
    }

    #[tokio::test]
    async fn test_switch_selects_first_match() {
        let list = tasks(
            r#"
do:
  - route:
      switch:
        - never:
            when: ${ .disabled }
        - first:
            when: ${ .enabled }
            then: shipOrder
        - second:
            then: continue
"#,
        );
        let mut s = state(json!({"enabled": true, "disabled": false}));

        let result = engine().execute_tasks(&list, &mut s).await.unwrap();
        assert_eq!(result, json!({"case": "first", "then": "shipOrder"}));
    }

    #[tokio::test]
    async fn test_switch_without_match_is_null() {
        let list = tasks(
            r#"
do:
  - route:
      switch:
        - electronic:
            when: ${ .orderType == "electronic" }
  - after:
      set:
        reached: true
"#,
        );
        let mut s = state(json!({"orderType": "physical"}));

        engine().execute_tasks(&list, &mut s).await.unwrap();
        assert_eq!(s.get("route"), Some(&Value::Null));
        assert_eq!(s.get("reached"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_switch_exit_ends_enclosing_list_only() {
        let list = tasks(
            r#"
do:
  - inner:
      do:
        - stop:
            switch:
              - always:
                  then: exit
        - skipped:
            set:
              skipped: true
  - after:
      set:
        after: true
"#,
        );
        let mut s = State::new();

        engine().execute_tasks(&list, &mut s).await.unwrap();
        assert_eq!(s.get("stop"), Some(&json!({"case": "always", "then": "exit"})));
        assert!(!s.contains_key("skipped"));
        assert_eq!(s.get("after"), Some(&json!(true)));
        assert_eq!(s.get("inner"), s.get("stop"));
    }

    #[tokio::test]
    async fn test_if_guard_skips_without_recording() {
        let list = tasks(
            r#"
do:
  - maybe:
      if: ${ .enabled }
      set:
        ran: true
"#,
        );
        let mut s = state(json!({"enabled": false}));

        let result = engine().execute_tasks(&list, &mut s).await.unwrap();
        assert_eq!(result, Value::Null);
        assert!(!s.contains_key("ran"));
        assert!(!s.contains_key("maybe"));
        assert!(!s.contains_key("task_0_result"));
    }

    #[tokio::test]
    async fn test_for_over_empty_array() {
        let list = tasks(
            r#"
do:
  - each:
      for:
        each: item
        in: ${ .items }
      do:
        - touch:
            set:
              touched: true
"#,
        );
        let mut s = state(json!({"items": []}));

        let result = engine().execute_tasks(&list, &mut s).await.unwrap();
        assert_eq!(result, json!([]));
        assert!(!s.contains_key("touched"));
    }

    #[tokio::test]
    async fn test_for_collects_results_without_leaking() {
        let list = tasks(
            r#"
do:
  - each:
      for:
        each: color
        in: ${ .colors }
        at: position
      do:
        - pick:
            switch:
              - red:
                  when: ${ .color == "red" }
              - other: {}
"#,
        );
        let mut s = state(json!({"colors": ["red", "blue"]}));

        let result = engine().execute_tasks(&list, &mut s).await.unwrap();
        assert_eq!(
            result,
            json!([
                {"case": "red", "then": "continue"},
                {"case": "other", "then": "continue"}
            ])
        );
        assert!(!s.contains_key("color"));
        assert!(!s.contains_key("position"));
        assert!(!s.contains_key("pick"));
        assert_eq!(s.get("each"), Some(&result));
    }

    #[tokio::test]
    async fn test_for_body_mutations_carry_across_iterations() {
        let list = tasks(
            r#"
do:
  - each:
      for:
        each: item
        in: ${ .items }
      while: ${ .keepGoing }
      do:
        - check:
            switch:
              - last:
                  when: ${ .item == "b" }
                  then: exit
        - stop:
            set:
              keepGoing: false
"#,
        );
        let mut s = state(json!({"items": ["a", "b", "c"], "keepGoing": true}));

        let result = engine().execute_tasks(&list, &mut s).await.unwrap();
        // The second iteration observes keepGoing = false from the first
        assert_eq!(result, json!([{"keepGoing": false}]));
        assert_eq!(s.get("keepGoing"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_for_requires_array() {
        let list = tasks(
            r#"
do:
  - each:
      for:
        each: item
        in: ${ .items }
      do:
        - noop:
            set:
              x: 1
"#,
        );
        let mut s = state(json!({"items": "not a list"}));

        let result = engine().execute_tasks(&list, &mut s).await;
        assert!(matches!(
            result,
            Err(ExecutionError::NotIterable { key, .. }) if key == "each"
        ));
    }

    #[tokio::test]
    async fn test_for_missing_collection_leaves_state() {
        let list = tasks(
            r#"
do:
  - mark:
      set:
        seen: true
  - each:
      for:
        each: item
        in: ${ .items }
      do:
        - noop:
            set:
              x: 1
"#,
        );
        let mut s = state(json!({"other": 1}));

        let result = engine().execute_tasks(&list, &mut s).await;
        assert!(matches!(
            result,
            Err(ExecutionError::Expression(ExpressionError::PropertyNotFound(path))) if path == ".items"
        ));
        assert_eq!(
            s,
            state(json!({
                "other": 1,
                "seen": true,
                "mark": {"seen": true},
                "task_0_result": {"seen": true}
            }))
        );
    }

    #[tokio::test]
    async fn test_do_shares_scope() {
        let list = tasks(
            r#"
do:
  - outer:
      do:
        - inner:
            set:
              shared: yes
"#,
        );
        let mut s = State::new();

        let result = engine().execute_tasks(&list, &mut s).await.unwrap();
        assert_eq!(result, json!({"shared": "yes"}));
        assert_eq!(s.get("shared"), Some(&json!("yes")));
        assert!(s.contains_key("inner"));
        assert_eq!(s.get("outer"), Some(&result));
    }

    #[tokio::test]
    async fn test_expression_error_fails_fast() {
        let list = tasks(
            r#"
do:
  - first:
      set:
        applied: true
  - route:
      switch:
        - bad:
            when: ${ .missing }
  - never:
      set:
        never: true
"#,
        );
        let mut s = State::new();

        let result = engine().execute_tasks(&list, &mut s).await;
        assert!(matches!(
            result,
            Err(ExecutionError::Expression(ExpressionError::PropertyNotFound(_)))
        ));
        assert_eq!(s.get("applied"), Some(&json!(true)));
        assert!(!s.contains_key("never"));
    }

    fn call_list() -> TaskList {
        tasks(
            r#"
do:
  - getPet:
      call: http
      with:
        method: get
        endpoint:
          uri: https://petstore.example/pets/${ .petId }
"#,
        )
    }

    #[tokio::test]
    async fn test_call_result_shape() {
        let caller = Arc::new(FixtureCaller::new().with_response(
            "GET",
            "https://petstore.example/pets/7",
            CallResponse::new(200, json!({"name": "rex"})).with_header("Content-Type", "application/json"),
        ));
        let engine = Engine::new(caller.clone());
        let mut s = state(json!({"petId": 7}));

        let result = engine.execute_tasks(&call_list(), &mut s).await.unwrap();
        assert_eq!(
            result,
            json!({
                "status": 200,
                "body": {"name": "rex"},
                "headers": {"Content-Type": "application/json"}
            })
        );
        assert_eq!(caller.requests().len(), 1);
        assert_eq!(caller.requests()[0].method, "GET");
    }

    #[tokio::test]
    async fn test_call_error_status_rejected() {
        let caller = FixtureCaller::new().with_response(
            "GET",
            "https://petstore.example/pets/7",
            CallResponse::new(404, Value::Null),
        );
        let engine = Engine::new(Arc::new(caller));
        let mut s = state(json!({"petId": 7}));

        let result = engine.execute_tasks(&call_list(), &mut s).await;
        assert!(matches!(
            result,
            Err(ExecutionError::CallFailure { source: CallError::ErrorStatus(404), .. })
        ));
        assert!(!s.contains_key("getPet"));
    }

    #[tokio::test]
    async fn test_call_error_status_allowed() {
        let caller = FixtureCaller::new().with_response(
            "GET",
            "https://petstore.example/pets/7",
            CallResponse::new(404, Value::Null),
        );
        let engine = Engine::new(Arc::new(caller))
            .with_config(EngineConfig::new().with_reject_error_status(false));
        let mut s = state(json!({"petId": 7}));

        let result = engine.execute_tasks(&call_list(), &mut s).await.unwrap();
        assert_eq!(result["status"], json!(404));
    }

    #[tokio::test]
    async fn test_call_not_recorded() {
        let mut s = state(json!({"petId": 7}));

        let result = engine().execute_tasks(&call_list(), &mut s).await;
        assert!(matches!(
            result,
            Err(ExecutionError::CallFailure { source: CallError::NotRecorded { .. }, .. })
        ));
    }
}
