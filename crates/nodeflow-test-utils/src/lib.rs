//! Test doubles for the outbound collaborators of nodeflow executors.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use futures::future::BoxFuture;
use serde_json::Value;

use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::traits::{HttpTransport, RecordLookup};
use nodeflow_core::types::{HttpRequest, HttpResponse};

/// Build a JSON response with the given status.
pub fn json_response(status: u16, body: Value) -> HttpResponse {
    let mut response = HttpResponse {
        status,
        reason: reason_for(status).into(),
        headers: Default::default(),
        body,
    };
    response
        .headers
        .insert("content-type".into(), "application/json".into());
    response
}

fn reason_for(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "",
    }
}

/// Transport that records every request and replays queued responses.
///
/// When the queue is empty it answers `200 OK` with a `null` body.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<Result<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: HttpResponse) -> &Self {
        self.responses.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn push_json(&self, status: u16, body: Value) -> &Self {
        self.push_response(json_response(status, body))
    }

    pub fn push_error(&self, error: NodeflowError) -> &Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// All requests sent so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl HttpTransport for MockTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>> {
        self.requests.lock().unwrap().push(request);
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(json_response(200, Value::Null)));
        Box::pin(async move { next })
    }
}

/// One scripted answer of a `ScriptedLookup`.
#[derive(Debug, Clone)]
pub enum LookupStep {
    Missing,
    Found(Value),
    Fail(String),
}

/// Record lookup that answers from a script, one step per call.
///
/// Calls past the end of the script repeat the last step.
pub struct ScriptedLookup {
    steps: Vec<LookupStep>,
    calls: AtomicU32,
    queries: Mutex<Vec<(String, String, Value)>>,
}

impl ScriptedLookup {
    pub fn new(steps: Vec<LookupStep>) -> Self {
        Self {
            steps,
            calls: AtomicU32::new(0),
            queries: Mutex::new(vec![]),
        }
    }

    /// Never finds anything.
    pub fn never() -> Self {
        Self::new(vec![LookupStep::Missing])
    }

    /// Missing for the first `attempt - 1` calls, then found.
    pub fn found_on(attempt: u32, entity: Value) -> Self {
        let mut steps = vec![LookupStep::Missing; attempt.saturating_sub(1) as usize];
        steps.push(LookupStep::Found(entity));
        Self::new(steps)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(resource_type, field, value)` of every call, in order.
    pub fn queries(&self) -> Vec<(String, String, Value)> {
        self.queries.lock().unwrap().clone()
    }
}

impl RecordLookup for ScriptedLookup {
    fn find<'a>(
        &'a self,
        resource_type: &'a str,
        field: &'a str,
        value: &'a Value,
    ) -> BoxFuture<'a, Result<Option<Value>>> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        self.queries
            .lock()
            .unwrap()
            .push((resource_type.to_string(), field.to_string(), value.clone()));
        let step = self
            .steps
            .get(index)
            .or_else(|| self.steps.last())
            .cloned()
            .unwrap_or(LookupStep::Missing);
        Box::pin(async move {
            match step {
                LookupStep::Missing => Ok(None),
                LookupStep::Found(entity) => Ok(Some(entity)),
                LookupStep::Fail(message) => Err(NodeflowError::Network(message)),
            }
        })
    }
}
