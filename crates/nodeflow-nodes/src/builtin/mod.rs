//! Built-in node types.
//!
//! Each module exposes `NODE_TYPE`, a `definition()`, a `presentation()`, and
//! its executor; `NodeRegistry::with_builtins` wires them together.

pub mod http_request;
pub mod json_parse;
pub mod message_format;
pub mod text_input;
pub mod verified_request;

use nodeflow_core::error::{NodeflowError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Deserialize a node config, reporting failures as `InvalidConfig`.
pub(crate) fn parse_config<T: DeserializeOwned>(config: Value) -> Result<T> {
    let config = if config.is_null() {
        Value::Object(Default::default())
    } else {
        config
    };
    serde_json::from_value(config).map_err(|e| NodeflowError::InvalidConfig(e.to_string()))
}
