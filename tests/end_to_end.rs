use std::io::Write;
use std::sync::Arc;

use serde_json::{json, Value};

use nodeflow_core::event::EventBus;
use nodeflow_core::types::{ExecutionStatus, RequestBody, RuntimeEvent};
use nodeflow_nodes::{BuiltinDeps, NodeRegistry};
use nodeflow_runtime::{Dispatcher, Workflow, WorkflowRunner};
use nodeflow_test_utils::{MockTransport, ScriptedLookup};

fn dispatcher(transport: Arc<MockTransport>, lookup: Arc<ScriptedLookup>) -> Dispatcher {
    let mut deps = BuiltinDeps::new(transport, lookup);
    deps.verification.retry_delay_ms = 0;
    let registry = NodeRegistry::with_builtins(&deps).expect("builtins register");
    Dispatcher::new(Arc::new(registry))
}

fn formatter_config() -> Value {
    json!({
        "conditionField": "success",
        "successValue": "true",
        "successMessage": "Created {{data.agent.id}}",
        "errorMessage": "Failed"
    })
}

#[tokio::test]
async fn test_message_format_through_dispatcher() {
    let d = dispatcher(Arc::new(MockTransport::new()), Arc::new(ScriptedLookup::never()));

    let env = d
        .execute(
            "message_format",
            formatter_config(),
            json!({"success": true, "data": {"agent": {"id": 42}}}),
        )
        .await;
    assert_eq!(env.output("message"), Some(&json!("Created 42")));

    let env = d
        .execute("message_format", formatter_config(), json!({"success": false}))
        .await;
    assert_eq!(env.output("message"), Some(&json!("Failed")));
}

#[tokio::test]
async fn test_unknown_type_names_the_type() {
    let d = dispatcher(Arc::new(MockTransport::new()), Arc::new(ScriptedLookup::never()));
    let env = d.execute("no-such-type", json!({}), json!({})).await;
    assert_eq!(env.status(), ExecutionStatus::Error);
    assert!(env.error().unwrap().contains("no-such-type"));
}

#[tokio::test]
async fn test_post_sends_input_body_as_json() {
    let transport = Arc::new(MockTransport::new());
    transport.push_json(200, json!({"ok": true}));
    let d = dispatcher(transport.clone(), Arc::new(ScriptedLookup::never()));

    let env = d
        .execute(
            "http_request",
            json!({
                "url": "http://api.test/things",
                "method": "POST",
                "headers": {"Content-Type": "application/json"}
            }),
            json!({"body": {"x": 1}}),
        )
        .await;
    assert!(env.is_success());
    let sent = &transport.requests()[0];
    assert_eq!(sent.body, Some(RequestBody::Json(json!({"x": 1}))));
    assert_eq!(sent.header("content-type"), Some("application/json"));
}

#[tokio::test]
async fn test_verified_request_then_format() {
    let transport = Arc::new(MockTransport::new());
    transport.push_json(201, json!({"agent": {"id": 42}}));
    let lookup = Arc::new(ScriptedLookup::found_on(3, json!({"id": 42})));
    let bus = Arc::new(EventBus::new(64));
    let mut rx = bus.subscribe();
    let d = dispatcher(transport, lookup.clone()).with_events(bus.clone());

    let workflow = Workflow::from_json(
        &json!({
            "entry": "create",
            "nodes": [
                {"id": "create", "type": "verified_request", "config": {
                    "url": "http://api.test/agents",
                    "method": "POST",
                    "resourceType": "agents",
                    "idField": "agent.id",
                    "lookupField": "id"
                }},
                {"id": "notify", "type": "message_format", "config": formatter_config()}
            ],
            "edges": [{"from": "create", "to": "notify", "condition": "on_success"}]
        })
        .to_string(),
    )
    .expect("valid workflow");

    let report = WorkflowRunner::new(d)
        .with_events(bus)
        .run(&workflow, json!({"body": {"name": "scout"}}))
        .await
        .expect("workflow runs");

    assert!(report.succeeded);
    assert_eq!(report.steps.len(), 2);
    let created = &report.steps[0].envelope;
    assert_eq!(created.output("verified"), Some(&json!(true)));
    assert_eq!(created.data["verification"]["attempts"], 3);
    assert_eq!(lookup.calls(), 3);
    assert_eq!(
        report.last().unwrap().output("message"),
        Some(&json!("Created 42"))
    );

    let mut steps = vec![];
    while let Ok(event) = rx.try_recv() {
        if let RuntimeEvent::WorkflowStepCompleted { node_id, .. } = event {
            steps.push(node_id);
        }
    }
    assert_eq!(steps, vec!["create", "notify"]);
}

#[tokio::test]
async fn test_unverified_creation_still_reports_success_flag() {
    let transport = Arc::new(MockTransport::new());
    transport.push_json(201, json!({"id": "ghost"}));
    let lookup = Arc::new(ScriptedLookup::never());
    let d = dispatcher(transport, lookup.clone());

    let env = d
        .execute(
            "verified_request",
            json!({"url": "http://api.test/agents", "method": "POST", "resourceType": "agents"}),
            json!({}),
        )
        .await;
    assert!(env.is_success());
    assert_eq!(env.output("success"), Some(&json!(true)));
    assert_eq!(env.output("verified"), Some(&json!(false)));
    assert_eq!(env.output("error"), Some(&json!("Resource verification failed")));
    assert_eq!(lookup.calls(), 3);
}

#[tokio::test]
async fn test_workflow_loaded_from_file() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(
        br#"{
            "entry": "raw",
            "nodes": [
                {"id": "raw", "type": "text_input", "config": {"value": "{\"user\": {\"name\": \"Ada\"}}"}},
                {"id": "parse", "type": "json_parse", "config": {"field": "value"}},
                {"id": "greet", "type": "message_format", "config": {
                    "conditionField": "data.user.name",
                    "successValue": "Ada",
                    "successMessage": "Hello {{data.user.name}}",
                    "errorMessage": "Who are you?"
                }}
            ],
            "edges": [
                {"from": "raw", "to": "parse"},
                {"from": "parse", "to": "greet", "condition": "on_success"}
            ]
        }"#,
    )
    .expect("write workflow");

    let workflow = Workflow::load(tmp.path()).expect("load workflow");
    let d = dispatcher(Arc::new(MockTransport::new()), Arc::new(ScriptedLookup::never()));
    let report = WorkflowRunner::new(d)
        .run(&workflow, json!({}))
        .await
        .expect("workflow runs");

    assert!(report.succeeded);
    assert_eq!(
        report.last().unwrap().output("message"),
        Some(&json!("Hello Ada"))
    );
}
