use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use nodeflow_core::error::NodeflowError;
use nodeflow_core::event::EventBus;
use nodeflow_core::types::{Envelope, ExecutionId, RuntimeEvent};
use nodeflow_nodes::NodeRegistry;

/// Single entry point for running a node.
///
/// `execute` never fails and never panics: unknown types, executor errors,
/// executor panics, and undeclared outputs all come back as error envelopes.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<NodeRegistry>,
    events: Option<Arc<EventBus>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub async fn execute(&self, node_type: &str, config: Value, inputs: Value) -> Envelope {
        let execution_id = ExecutionId::new();
        let started = Instant::now();
        let start = Utc::now();
        info!(execution_id = %execution_id, node_type, "Dispatching node");
        self.publish(RuntimeEvent::DispatchStarted {
            execution_id: execution_id.clone(),
            node_type: node_type.to_string(),
        });

        let mut envelope = self.run(node_type, config, inputs).await;
        if envelope.meta.start_time.is_none() {
            envelope = envelope.with_timing(start, Utc::now());
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match envelope.error() {
            None => info!(execution_id = %execution_id, node_type, elapsed_ms, "Node succeeded"),
            Some(err) => warn!(
                execution_id = %execution_id,
                node_type,
                elapsed_ms,
                error = %err,
                "Node failed"
            ),
        }
        self.publish(RuntimeEvent::DispatchFinished {
            execution_id,
            node_type: node_type.to_string(),
            status: envelope.status(),
            elapsed_ms,
        });
        envelope
    }

    async fn run(&self, node_type: &str, config: Value, inputs: Value) -> Envelope {
        let entry = match self.registry.lookup(node_type) {
            Some(entry) => entry,
            None => {
                return Envelope::from_error(&NodeflowError::UnknownNodeType(
                    node_type.to_string(),
                ))
            }
        };

        let config = merge_config(&entry.definition.default_config, config);
        debug!(node_type, config = %config, "Resolved node config");

        // Panics may surface while building the future or while polling it.
        let future = match std::panic::catch_unwind(AssertUnwindSafe(|| {
            entry.executor.execute(config, inputs)
        })) {
            Ok(future) => future,
            Err(payload) => return panicked(node_type, payload),
        };
        let result = match AssertUnwindSafe(future).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => return panicked(node_type, payload),
        };

        let envelope = match result {
            Ok(envelope) => envelope,
            Err(e) => return Envelope::from_error(&e),
        };

        if envelope.is_success() {
            let undeclared = entry.definition.undeclared_outputs(&envelope.data);
            if !undeclared.is_empty() {
                return Envelope::from_error(&NodeflowError::UndeclaredOutput {
                    node_type: node_type.to_string(),
                    ports: undeclared.join(", "),
                })
                .with_data(envelope.data);
            }
        }
        envelope
    }

    fn publish(&self, event: RuntimeEvent) {
        if let Some(ref events) = self.events {
            events.publish(event);
        }
    }
}

/// Layer the caller's config over the definition defaults. Caller keys win;
/// a caller config that is not an object is ignored.
pub fn merge_config(defaults: &Map<String, Value>, config: Value) -> Value {
    let mut merged = defaults.clone();
    if let Value::Object(overrides) = config {
        for (k, v) in overrides {
            merged.insert(k, v);
        }
    }
    Value::Object(merged)
}

fn panicked(node_type: &str, payload: Box<dyn Any + Send>) -> Envelope {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    error!(node_type, panic = %message, "Node executor panicked");
    Envelope::from_error(&NodeflowError::ExecutorPanicked(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use nodeflow_core::error::Result;
    use nodeflow_core::traits::{FnExecutor, NodeExecutor};
    use nodeflow_core::types::{
        ConfigOption, ExecutionStatus, NodeDefinition, NodePresentation, PortSpec, ValueKind,
    };
    use serde_json::json;

    struct PanicsEagerly;

    impl NodeExecutor for PanicsEagerly {
        fn execute(&self, _config: Value, _input: Value) -> BoxFuture<'_, Result<Envelope>> {
            panic!("eager failure")
        }
    }

    fn def(node_type: &str) -> NodeDefinition {
        NodeDefinition::new(node_type, node_type, "test")
            .with_output("echo", PortSpec::required(ValueKind::Any, "echo"))
            .with_option(ConfigOption::new("greeting", ValueKind::String, json!("hi"), "g"))
            .with_option(ConfigOption::new("count", ValueKind::Number, json!(1), "c"))
    }

    fn dispatcher() -> Dispatcher {
        let mut registry = NodeRegistry::new();
        registry
            .register(
                "echo",
                def("echo"),
                FnExecutor(|config: Value, input: Value| async move {
                    Ok::<_, NodeflowError>(Envelope::success(json!({"echo": {"config": config, "input": input}})))
                }),
                NodePresentation::default(),
            )
            .unwrap();
        registry
            .register(
                "fails",
                def("fails"),
                FnExecutor(|_: Value, _: Value| async move {
                    Err::<Envelope, _>(NodeflowError::Network("connection refused".into()))
                }),
                NodePresentation::default(),
            )
            .unwrap();
        registry
            .register(
                "panics",
                def("panics"),
                FnExecutor(|_: Value, _: Value| async move {
                    if true {
                        panic!("inside the future");
                    }
                    Ok::<_, NodeflowError>(Envelope::success(Value::Null))
                }),
                NodePresentation::default(),
            )
            .unwrap();
        registry
            .register("panics_eagerly", def("panics_eagerly"), PanicsEagerly, NodePresentation::default())
            .unwrap();
        registry
            .register(
                "leaky",
                def("leaky"),
                FnExecutor(|_: Value, _: Value| async move {
                    Ok::<_, NodeflowError>(Envelope::success(json!({"echo": 1, "secret": 2})))
                }),
                NodePresentation::default(),
            )
            .unwrap();
        Dispatcher::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_unknown_type() {
        let env = dispatcher().execute("no-such-type", json!({}), json!({})).await;
        assert_eq!(env.status(), ExecutionStatus::Error);
        assert_eq!(env.error(), Some("Unknown node type: no-such-type"));
    }

    #[tokio::test]
    async fn test_defaults_merged_under_caller_config() {
        let env = dispatcher()
            .execute("echo", json!({"greeting": "hello"}), json!({"x": 1}))
            .await;
        assert!(env.is_success());
        let echoed = env.output("echo").unwrap();
        assert_eq!(echoed["config"], json!({"greeting": "hello", "count": 1}));
        assert_eq!(echoed["input"], json!({"x": 1}));
        assert!(env.meta.start_time.is_some());
    }

    #[tokio::test]
    async fn test_non_object_config_replaced_by_defaults() {
        let env = dispatcher().execute("echo", json!("junk"), Value::Null).await;
        assert_eq!(
            env.output("echo").unwrap()["config"],
            json!({"greeting": "hi", "count": 1})
        );
    }

    #[tokio::test]
    async fn test_executor_error_becomes_envelope() {
        let env = dispatcher().execute("fails", json!({}), json!({})).await;
        assert!(!env.is_success());
        assert_eq!(env.error(), Some("Network request failed: connection refused"));
    }

    #[tokio::test]
    async fn test_panics_are_contained() {
        let d = dispatcher();
        let env = d.execute("panics", json!({}), json!({})).await;
        assert_eq!(env.error(), Some("Node executor panicked: inside the future"));

        let env = d.execute("panics_eagerly", json!({}), json!({})).await;
        assert_eq!(env.error(), Some("Node executor panicked: eager failure"));
    }

    #[tokio::test]
    async fn test_undeclared_output_rejected() {
        let env = dispatcher().execute("leaky", json!({}), json!({})).await;
        assert!(!env.is_success());
        assert_eq!(env.error(), Some("Undeclared output port(s) for leaky: secret"));
    }

    #[tokio::test]
    async fn test_events_bracket_execution() {
        let bus = Arc::new(EventBus::new(8));
        let mut rx = bus.subscribe();
        let d = dispatcher().with_events(bus);
        d.execute("fails", json!({}), json!({})).await;

        let started = rx.try_recv().unwrap();
        let finished = rx.try_recv().unwrap();
        let started_id = match started {
            RuntimeEvent::DispatchStarted { execution_id, node_type } => {
                assert_eq!(node_type, "fails");
                execution_id
            }
            other => panic!("unexpected event: {:?}", other),
        };
        match finished {
            RuntimeEvent::DispatchFinished { execution_id, status, .. } => {
                assert_eq!(execution_id, started_id);
                assert_eq!(status, ExecutionStatus::Error);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
