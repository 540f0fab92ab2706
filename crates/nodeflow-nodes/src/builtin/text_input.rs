use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};

use nodeflow_core::error::Result;
use nodeflow_core::traits::NodeExecutor;
use nodeflow_core::types::{
    ConfigOption, Envelope, NodeDefinition, NodePresentation, NodeShape, PortSpec, ValueKind,
};

use super::parse_config;

pub const NODE_TYPE: &str = "text_input";

pub fn definition() -> NodeDefinition {
    NodeDefinition::new(NODE_TYPE, "Text Input", "input")
        .with_description("Provides a text value typed by the user or supplied upstream")
        .with_icon("type")
        .with_input("value", PortSpec::optional(ValueKind::String, "Value supplied at run time"))
        .with_output("value", PortSpec::required(ValueKind::String, "The entered text"))
        .with_option(ConfigOption::new(
            "value",
            ValueKind::String,
            json!(""),
            "Text used when no value is supplied",
        ))
        .with_option(ConfigOption::new(
            "placeholder",
            ValueKind::String,
            json!("Enter text..."),
            "Hint shown in the editor",
        ))
}

pub fn presentation() -> NodePresentation {
    NodePresentation::new("#0ea5e9").with_shape(NodeShape::Pill)
}

#[derive(Deserialize)]
struct TextInputConfig {
    #[serde(default)]
    value: Value,
}

pub struct TextInputExecutor;

impl NodeExecutor for TextInputExecutor {
    fn execute(&self, config: Value, input: Value) -> BoxFuture<'_, Result<Envelope>> {
        Box::pin(async move {
            let cfg: TextInputConfig = parse_config(config)?;
            let value = input
                .get("value")
                .filter(|v| !v.is_null())
                .cloned()
                .unwrap_or(cfg.value);
            Ok(Envelope::success(json!({ "value": value })))
        })
    }
}
