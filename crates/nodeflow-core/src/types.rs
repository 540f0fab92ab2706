use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::NodeflowError;

/// Unique identifier for a single node execution.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExecutionId(pub String);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value kind of a port or config option.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    String,
    Number,
    Boolean,
    Object,
    Array,
    #[default]
    Any,
}

/// A named input or output port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSpec {
    #[serde(rename = "type")]
    pub kind: ValueKind,
    pub description: String,
    #[serde(default)]
    pub optional: bool,
}

impl PortSpec {
    pub fn required(kind: ValueKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            optional: false,
        }
    }

    pub fn optional(kind: ValueKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            optional: true,
        }
    }
}

/// A user-configurable option of a node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigOption {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: ValueKind,
    #[serde(default)]
    pub default: Value,
    pub description: String,
}

impl ConfigOption {
    pub fn new(
        key: impl Into<String>,
        kind: ValueKind,
        default: Value,
        description: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            kind,
            default,
            description: description.into(),
        }
    }
}

/// Immutable descriptor of a node type.
///
/// Built once with the `with_*` methods and handed to the registry; the
/// registry never hands out a mutable reference to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDefinition {
    #[serde(rename = "type")]
    pub node_type: String,
    pub label: String,
    pub description: String,
    pub category: String,
    pub icon: String,
    pub inputs: IndexMap<String, PortSpec>,
    pub outputs: IndexMap<String, PortSpec>,
    pub options: Vec<ConfigOption>,
    pub default_config: Map<String, Value>,
}

impl NodeDefinition {
    pub fn new(
        node_type: impl Into<String>,
        label: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            node_type: node_type.into(),
            label: label.into(),
            description: String::new(),
            category: category.into(),
            icon: String::new(),
            inputs: IndexMap::new(),
            outputs: IndexMap::new(),
            options: vec![],
            default_config: Map::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, port: PortSpec) -> Self {
        self.inputs.insert(name.into(), port);
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, port: PortSpec) -> Self {
        self.outputs.insert(name.into(), port);
        self
    }

    /// Add a config option. Its default becomes part of the default config
    /// snapshot unless it is `null`.
    pub fn with_option(mut self, option: ConfigOption) -> Self {
        if !option.default.is_null() {
            self.default_config
                .insert(option.key.clone(), option.default.clone());
        }
        self.options.push(option);
        self
    }

    /// Output keys of `data` that this definition does not declare.
    pub fn undeclared_outputs(&self, data: &Value) -> Vec<String> {
        match data.as_object() {
            Some(obj) => obj
                .keys()
                .filter(|k| !self.outputs.contains_key(k.as_str()))
                .cloned()
                .collect(),
            None => vec![],
        }
    }
}

/// Shape of a node on the canvas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeShape {
    #[default]
    Rounded,
    Rectangle,
    Pill,
}

/// How the editor draws a node type. Opaque to the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePresentation {
    pub color: String,
    #[serde(default)]
    pub shape: NodeShape,
    #[serde(default = "default_show_ports")]
    pub show_ports: bool,
}

fn default_show_ports() -> bool {
    true
}

impl NodePresentation {
    pub fn new(color: impl Into<String>) -> Self {
        Self {
            color: color.into(),
            shape: NodeShape::default(),
            show_ports: true,
        }
    }

    pub fn with_shape(mut self, shape: NodeShape) -> Self {
        self.shape = shape;
        self
    }
}

impl Default for NodePresentation {
    fn default() -> Self {
        Self::new("#64748b")
    }
}

/// Outcome discriminator of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Error,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Diagnostic metadata attached to an envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_body: Option<Value>,
}

/// Result of a node execution.
///
/// The status is `Error` exactly when an error message is present; both are
/// private and only set through the constructors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    status: ExecutionStatus,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    pub meta: EnvelopeMeta,
}

impl Envelope {
    pub fn success(data: Value) -> Self {
        Self {
            status: ExecutionStatus::Success,
            data,
            error: None,
            meta: EnvelopeMeta::default(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Error,
            data: Value::Null,
            error: Some(error.into()),
            meta: EnvelopeMeta::default(),
        }
    }

    pub fn from_error(err: &NodeflowError) -> Self {
        Self::failure(err.to_string())
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.meta.message = Some(message.into());
        self
    }

    pub fn with_timing(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.meta.start_time = Some(start);
        self.meta.end_time = Some(end);
        self
    }

    pub fn with_upstream(mut self, status: Option<u16>, body: Option<Value>) -> Self {
        self.meta.upstream_status = status;
        self.meta.upstream_body = body;
        self
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Value of a single output port.
    pub fn output(&self, port: &str) -> Option<&Value> {
        self.data.get(port)
    }
}

/// Outcome of an existence check against the system of record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRecord {
    pub verified: bool,
    pub attempts: u32,
    pub resource_type: String,
    pub lookup_field: String,
    pub lookup_value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found_entity: Option<Value>,
}

/// Data payload of verification-aware executors.
///
/// `success` reports the triggering call; `verified` reports the follow-up
/// check. A verification mismatch sets `error` but leaves `success` alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedOutcome {
    pub success: bool,
    pub verified: bool,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of an outbound request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Text(String),
}

/// A single outbound request handed to an `HttpTransport`.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: IndexMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: "GET".into(),
            url: url.into(),
            headers: IndexMap::new(),
            query: vec![],
            body: None,
            timeout,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Response returned by an `HttpTransport`.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub headers: IndexMap<String, String>,
    /// Parsed JSON when the payload is valid JSON, otherwise a JSON string.
    pub body: Value,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Runtime event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A node execution was dispatched.
    DispatchStarted {
        execution_id: ExecutionId,
        node_type: String,
    },
    /// A node execution produced its envelope.
    DispatchFinished {
        execution_id: ExecutionId,
        node_type: String,
        status: ExecutionStatus,
        elapsed_ms: u64,
    },
    /// One lookup of the verification loop completed.
    VerificationAttempt {
        resource_type: String,
        attempt: u32,
        max_attempts: u32,
        found: bool,
    },
    /// A workflow node finished.
    WorkflowStepCompleted {
        node_id: String,
        node_type: String,
        status: ExecutionStatus,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_status_tracks_error() {
        let ok = Envelope::success(json!({"value": 1}));
        assert!(ok.is_success());
        assert!(ok.error().is_none());

        let err = Envelope::failure("boom").with_data(json!({"partial": true}));
        assert_eq!(err.status(), ExecutionStatus::Error);
        assert_eq!(err.error(), Some("boom"));
        assert_eq!(err.output("partial"), Some(&json!(true)));
    }

    #[test]
    fn test_envelope_serializes_camel_case_meta() {
        let start = Utc::now();
        let env = Envelope::failure("HTTP 500")
            .with_timing(start, start)
            .with_upstream(Some(500), Some(json!("oops")));
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["status"], "error");
        assert_eq!(v["error"], "HTTP 500");
        assert_eq!(v["meta"]["upstreamStatus"], 500);
        assert!(v["meta"]["startTime"].is_string());
        assert!(v["meta"].get("message").is_none());
    }

    #[test]
    fn test_definition_collects_default_config() {
        let def = NodeDefinition::new("demo", "Demo", "test")
            .with_option(ConfigOption::new("a", ValueKind::Number, json!(1), "a"))
            .with_option(ConfigOption::new("b", ValueKind::String, Value::Null, "b"))
            .with_output("out", PortSpec::required(ValueKind::Any, "out"));
        assert_eq!(def.default_config.get("a"), Some(&json!(1)));
        assert!(!def.default_config.contains_key("b"));
        assert_eq!(def.options.len(), 2);
        assert_eq!(def.undeclared_outputs(&json!({"out": 1, "extra": 2})), vec!["extra"]);
        assert!(def.undeclared_outputs(&json!("scalar")).is_empty());
    }

    #[test]
    fn test_definition_serializes_type_key() {
        let def = NodeDefinition::new("demo", "Demo", "test");
        let v = serde_json::to_value(&def).unwrap();
        assert_eq!(v["type"], "demo");
        assert!(v.get("defaultConfig").is_some());
    }

    #[test]
    fn test_request_header_lookup_is_case_insensitive() {
        let mut req = HttpRequest::get("http://x", Duration::from_secs(1));
        req.headers.insert("Content-Type".into(), "application/json".into());
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert!(req.header("accept").is_none());
    }
}
