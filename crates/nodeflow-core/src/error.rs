use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeflowError {
    // Registry errors
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Node type already registered: {0}")]
    DuplicateNodeType(String),

    #[error("Node type key {key} does not match definition type {definition}")]
    NodeTypeMismatch { key: String, definition: String },

    // Executor errors
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    #[error("Invalid node config: {0}")]
    InvalidConfig(String),

    #[error("Node executor panicked: {0}")]
    ExecutorPanicked(String),

    #[error("Undeclared output port(s) for {node_type}: {ports}")]
    UndeclaredOutput { node_type: String, ports: String },

    // Network errors
    #[error("Network request failed: {0}")]
    Network(String),

    #[error("Request timed out after {timeout_ms}ms: {url}")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("HTTP {status}{}", reason_suffix(.reason))]
    HttpStatus { status: u16, reason: String },

    // Verification errors
    #[error("Resource verification failed: {resource_type} {field}={value} after {attempts} attempt(s)")]
    VerificationMismatch {
        resource_type: String,
        field: String,
        value: String,
        attempts: u32,
    },

    // Workflow errors
    #[error("Workflow error: {0}")]
    Workflow(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NodeflowError>;

fn reason_suffix(reason: &str) -> String {
    if reason.is_empty() {
        String::new()
    } else {
        format!(": {}", reason)
    }
}
