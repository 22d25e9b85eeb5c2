//! External calls
//!
//! Call tasks never perform I/O themselves. They resolve their payload
//! against the current state and hand the request to a [`Caller`], which owns
//! transport, timeouts and retries.

use crate::error::{CallError, ExecutionError, ExecutionResult};
use crate::runner::{render, resolve_map, resolve_value, CallTask, State};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

/// Fully resolved request handed to a call collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    pub method: String,
    pub target: String,
    #[serde(default)]
    pub body: Value,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Response returned by a call collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResponse {
    pub status: u16,
    #[serde(default)]
    pub body: Value,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl CallResponse {
    /// Create a response with a status and body
    pub fn new(status: u16, body: Value) -> Self {
        CallResponse {
            status,
            body,
            headers: BTreeMap::new(),
        }
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Whether the status signals an error (4xx or 5xx)
    pub fn is_error_status(&self) -> bool {
        self.status >= 400
    }

    /// Convert into the task result shape
    pub fn into_value(self) -> Value {
        json!({
            "status": self.status,
            "body": self.body,
            "headers": self.headers,
        })
    }
}

/// Capability that performs external calls on the engine's behalf
#[async_trait]
pub trait Caller: Send + Sync {
    /// Perform a call
    async fn call(&self, request: CallRequest) -> Result<CallResponse, CallError>;
}

impl CallTask {
    /// Resolve embedded expressions into a request
    pub fn resolve(&self, key: &str, state: &State) -> ExecutionResult<CallRequest> {
        let method = match resolve_value(&self.method, state)? {
            Value::String(method) if !method.trim().is_empty() => method.trim().to_uppercase(),
            other => {
                return Err(ExecutionError::InvalidCall {
                    key: key.to_string(),
                    field: "method",
                    reason: format!("expected a non-empty string, got {}", other),
                })
            }
        };

        let target = match resolve_value(&self.target, state)? {
            Value::String(target) if !target.trim().is_empty() => target,
            other => {
                return Err(ExecutionError::InvalidCall {
                    key: key.to_string(),
                    field: "target",
                    reason: format!("expected a non-empty string, got {}", other),
                })
            }
        };

        let headers = resolve_map(&self.headers, state)?
            .iter()
            .map(|(name, value)| (name.clone(), render(value)))
            .collect();

        Ok(CallRequest {
            method,
            target,
            body: resolve_value(&self.body, state)?,
            headers,
        })
    }
}

/// Key a recorded response is stored under
pub fn call_key(method: &str, target: &str) -> String {
    format!("{} {}", method.to_uppercase(), target)
}

/// A recorded response with an optional simulated latency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(flatten)]
    pub response: CallResponse,

    #[serde(default)]
    pub delay_ms: u64,
}

/// Deterministic caller answering from recorded responses
///
/// Every request it receives is logged and kept until drained with
/// [`FixtureCaller::take_requests`], so the log grows with the number of
/// calls over the caller's lifetime.
#[derive(Debug, Default)]
pub struct FixtureCaller {
    fixtures: HashMap<String, Fixture>,
    requests: Mutex<Vec<CallRequest>>,
}

impl FixtureCaller {
    /// Create a caller without recordings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a caller from recordings keyed by `"<METHOD> <target>"`
    pub fn from_fixtures(fixtures: HashMap<String, Fixture>) -> Self {
        let fixtures = fixtures
            .into_iter()
            .map(|(key, fixture)| (normalize_key(&key), fixture))
            .collect();
        FixtureCaller {
            fixtures,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Parse recordings from YAML or JSON text
    pub fn parse(source: &str) -> Result<Self, serde_yaml::Error> {
        let fixtures: HashMap<String, Fixture> = serde_yaml::from_str(source)?;
        Ok(Self::from_fixtures(fixtures))
    }

    /// Record a response
    pub fn with_response(self, method: &str, target: &str, response: CallResponse) -> Self {
        self.with_delayed_response(method, target, response, 0)
    }

    /// Record a response delivered after a delay
    pub fn with_delayed_response(
        mut self,
        method: &str,
        target: &str,
        response: CallResponse,
        delay_ms: u64,
    ) -> Self {
        self.fixtures
            .insert(call_key(method, target), Fixture { response, delay_ms });
        self
    }

    /// Number of recordings
    pub fn len(&self) -> usize {
        self.fixtures.len()
    }

    /// Whether there are no recordings
    pub fn is_empty(&self) -> bool {
        self.fixtures.is_empty()
    }

    /// Requests received so far, in arrival order
    pub fn requests(&self) -> Vec<CallRequest> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Drain the request log, returning requests in arrival order
    pub fn take_requests(&self) -> Vec<CallRequest> {
        match self.requests.lock() {
            Ok(mut requests) => std::mem::take(&mut *requests),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

#[async_trait]
impl Caller for FixtureCaller {
    async fn call(&self, request: CallRequest) -> Result<CallResponse, CallError> {
        let key = call_key(&request.method, &request.target);
        match self.requests.lock() {
            Ok(mut requests) => requests.push(request.clone()),
            Err(poisoned) => poisoned.into_inner().push(request.clone()),
        }

        let fixture = self
            .fixtures
            .get(&key)
            .ok_or_else(|| CallError::NotRecorded {
                method: request.method.clone(),
                target: request.target.clone(),
            })?;

        if fixture.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(fixture.delay_ms)).await;
        }

        Ok(fixture.response.clone())
    }
}

/// Normalize a `"<method> <target>"` key so the method is upper case
fn normalize_key(key: &str) -> String {
    match key.trim().split_once(' ') {
        Some((method, target)) => call_key(method, target.trim()),
        None => key.trim().to_string(),
    }
}
