use futures::future::BoxFuture;
use serde_json::{json, Value};

use nodeflow_core::config::HttpConfig;
use nodeflow_core::error::Result;
use nodeflow_core::traits::NodeExecutor;
use nodeflow_core::types::{
    ConfigOption, Envelope, NodeDefinition, NodePresentation, NodeShape, PortSpec, ValueKind,
};

use crate::http_call::{HttpCallSpec, HttpCaller};

pub const NODE_TYPE: &str = "http_request";

/// Options shared by every node that performs a networked call.
pub(crate) fn with_call_options(def: NodeDefinition, http: &HttpConfig) -> NodeDefinition {
    def.with_input("body", PortSpec::optional(ValueKind::Any, "Request body, overrides the configured body"))
        .with_input("headers", PortSpec::optional(ValueKind::Object, "Extra request headers"))
        .with_option(ConfigOption::new("url", ValueKind::String, Value::Null, "Request URL"))
        .with_option(ConfigOption::new("method", ValueKind::String, json!("GET"), "HTTP method"))
        .with_option(ConfigOption::new("headers", ValueKind::Object, json!({}), "Request headers"))
        .with_option(ConfigOption::new("body", ValueKind::Any, Value::Null, "Request body"))
        .with_option(ConfigOption::new(
            "timeoutMs",
            ValueKind::Number,
            json!(http.timeout_ms),
            "Request timeout in milliseconds",
        ))
        .with_option(ConfigOption::new(
            "failOnErrorStatus",
            ValueKind::Boolean,
            json!(http.fail_on_error_status),
            "Treat non-2xx responses as failures",
        ))
}

pub fn definition(http: &HttpConfig) -> NodeDefinition {
    let def = NodeDefinition::new(NODE_TYPE, "HTTP Request", "network")
        .with_description("Sends a single HTTP request and returns the response")
        .with_icon("globe")
        .with_output("status", PortSpec::required(ValueKind::Number, "Response status code"))
        .with_output("headers", PortSpec::required(ValueKind::Object, "Response headers"))
        .with_output("body", PortSpec::required(ValueKind::Any, "Response body, parsed when JSON"));
    with_call_options(def, http)
}

pub fn presentation() -> NodePresentation {
    NodePresentation::new("#f97316").with_shape(NodeShape::Rectangle)
}

pub struct HttpRequestExecutor {
    caller: HttpCaller,
}

impl HttpRequestExecutor {
    pub fn new(caller: HttpCaller) -> Self {
        Self { caller }
    }
}

impl NodeExecutor for HttpRequestExecutor {
    fn execute(&self, config: Value, input: Value) -> BoxFuture<'_, Result<Envelope>> {
        Box::pin(async move {
            let spec = HttpCallSpec::from_config(&config)?;
            Ok(self.caller.call(&spec, &input).await)
        })
    }
}
