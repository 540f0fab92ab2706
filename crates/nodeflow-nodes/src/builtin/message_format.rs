use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};

use nodeflow_core::error::Result;
use nodeflow_core::template::{interpolate, resolve_path, stringify};
use nodeflow_core::traits::NodeExecutor;
use nodeflow_core::types::{
    ConfigOption, Envelope, NodeDefinition, NodePresentation, PortSpec, ValueKind,
};

use super::parse_config;

pub const NODE_TYPE: &str = "message_format";

pub fn definition() -> NodeDefinition {
    NodeDefinition::new(NODE_TYPE, "Message Format", "output")
        .with_description("Renders a success or error message template from upstream data")
        .with_icon("message-square")
        .with_input("data", PortSpec::optional(ValueKind::Object, "Upstream result"))
        .with_output("message", PortSpec::required(ValueKind::String, "Rendered message"))
        .with_output("matched", PortSpec::required(ValueKind::Boolean, "Whether the success branch was taken"))
        .with_option(ConfigOption::new(
            "conditionField",
            ValueKind::String,
            json!("success"),
            "Input path compared against successValue",
        ))
        .with_option(ConfigOption::new(
            "successValue",
            ValueKind::String,
            json!("true"),
            "Value of conditionField that selects the success message",
        ))
        .with_option(ConfigOption::new(
            "successMessage",
            ValueKind::String,
            json!("Success"),
            "Template rendered on success",
        ))
        .with_option(ConfigOption::new(
            "errorMessage",
            ValueKind::String,
            json!("Error"),
            "Template rendered otherwise",
        ))
}

pub fn presentation() -> NodePresentation {
    NodePresentation::new("#eab308")
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageFormatConfig {
    #[serde(default = "default_condition_field")]
    condition_field: String,
    #[serde(default = "default_success_value")]
    success_value: Value,
    #[serde(default)]
    success_message: Value,
    #[serde(default)]
    error_message: Value,
}

fn default_condition_field() -> String {
    "success".into()
}

fn default_success_value() -> Value {
    json!("true")
}

pub struct MessageFormatExecutor;

impl NodeExecutor for MessageFormatExecutor {
    fn execute(&self, config: Value, input: Value) -> BoxFuture<'_, Result<Envelope>> {
        Box::pin(async move {
            let cfg: MessageFormatConfig = parse_config(config)?;
            // `true` and "true" select the same branch.
            let matched = resolve_path(&input, &cfg.condition_field)
                .map(|v| stringify(v) == stringify(&cfg.success_value))
                .unwrap_or(false);
            let template = if matched {
                &cfg.success_message
            } else {
                &cfg.error_message
            };
            let message = interpolate(template, &input);
            Ok(Envelope::success(json!({ "message": message, "matched": matched })))
        })
    }
}
