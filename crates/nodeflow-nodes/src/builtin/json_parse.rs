use chrono::Utc;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::template::resolve_path;
use nodeflow_core::traits::NodeExecutor;
use nodeflow_core::types::{
    ConfigOption, Envelope, NodeDefinition, NodePresentation, PortSpec, ValueKind,
};

use super::parse_config;

pub const NODE_TYPE: &str = "json_parse";

pub fn definition() -> NodeDefinition {
    NodeDefinition::new(NODE_TYPE, "JSON Parse", "transform")
        .with_description("Parses a JSON string from the input into structured data")
        .with_icon("braces")
        .with_input("text", PortSpec::required(ValueKind::String, "JSON text to parse"))
        .with_output("data", PortSpec::required(ValueKind::Any, "Parsed value"))
        .with_option(ConfigOption::new(
            "field",
            ValueKind::String,
            json!("text"),
            "Input path holding the JSON text",
        ))
}

pub fn presentation() -> NodePresentation {
    NodePresentation::new("#a855f7")
}

#[derive(Deserialize)]
struct JsonParseConfig {
    #[serde(default = "default_field")]
    field: String,
}

fn default_field() -> String {
    "text".into()
}

pub struct JsonParseExecutor;

impl NodeExecutor for JsonParseExecutor {
    fn execute(&self, config: Value, input: Value) -> BoxFuture<'_, Result<Envelope>> {
        Box::pin(async move {
            let start = Utc::now();
            let cfg: JsonParseConfig = parse_config(config)?;
            let raw = resolve_path(&input, &cfg.field)
                .filter(|v| !v.is_null())
                .ok_or_else(|| NodeflowError::MissingRequiredField(cfg.field.clone()))?;

            let parsed = match raw {
                Value::String(text) => match serde_json::from_str::<Value>(text) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!(field = %cfg.field, error = %e, "Input is not valid JSON");
                        return Ok(Envelope::failure(format!("Invalid JSON in {}: {}", cfg.field, e))
                            .with_timing(start, Utc::now()));
                    }
                },
                // Already structured
                other => other.clone(),
            };

            Ok(Envelope::success(json!({ "data": parsed }))
                .with_message(format!("Parsed {}", cfg.field))
                .with_timing(start, Utc::now()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_parses_default_field() {
        let env = JsonParseExecutor
            .execute(json!({}), json!({"text": "{\"a\": [1, 2]}"}))
            .await
            .unwrap();
        assert!(env.is_success());
        assert_eq!(env.output("data"), Some(&json!({"a": [1, 2]})));
        assert!(env.meta.start_time.is_some());
    }

    #[tokio::test]
    async fn test_nested_field_and_passthrough() {
        let env = JsonParseExecutor
            .execute(json!({"field": "body.payload"}), json!({"body": {"payload": {"k": true}}}))
            .await
            .unwrap();
        assert_eq!(env.output("data"), Some(&json!({"k": true})));
    }

    #[tokio::test]
    async fn test_invalid_json_is_error_envelope() {
        let env = JsonParseExecutor
            .execute(json!({}), json!({"text": "{oops"}))
            .await
            .unwrap();
        assert!(!env.is_success());
        assert!(env.error().unwrap().starts_with("Invalid JSON in text"));
    }

    #[tokio::test]
    async fn test_missing_field_is_err() {
        let err = JsonParseExecutor
            .execute(json!({}), json!({"other": "1"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing required field: text");
    }
}
