//! Networked call whose claimed result is confirmed against the system of
//! record before the node reports it.

use chrono::Utc;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use nodeflow_core::config::{HttpConfig, VerificationConfig};
use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::template::stringify;
use nodeflow_core::traits::NodeExecutor;
use nodeflow_core::types::{
    ConfigOption, Envelope, NodeDefinition, NodePresentation, NodeShape, PortSpec, ValueKind,
    VerificationRecord, VerifiedOutcome,
};

use super::http_request::with_call_options;
use super::parse_config;
use crate::http_call::{HttpCallSpec, HttpCaller};
use crate::verify::{RetryPolicy, VerificationTarget, Verifier, VERIFICATION_FAILED};

pub const NODE_TYPE: &str = "verified_request";

pub fn definition(http: &HttpConfig, verification: &VerificationConfig) -> NodeDefinition {
    let def = NodeDefinition::new(NODE_TYPE, "Verified Request", "network")
        .with_description(
            "Sends an HTTP request, then confirms the created resource exists before reporting success",
        )
        .with_icon("shield-check")
        .with_output("success", PortSpec::required(ValueKind::Boolean, "Whether the HTTP call succeeded"))
        .with_output("verified", PortSpec::required(ValueKind::Boolean, "Whether the resource was observed"))
        .with_output("data", PortSpec::required(ValueKind::Any, "Response body of the call"))
        .with_output(
            "verification",
            PortSpec::optional(ValueKind::Object, "Details of the verification lookups"),
        )
        .with_output("error", PortSpec::optional(ValueKind::String, "Verification failure message"));
    with_call_options(def, http)
        .with_option(ConfigOption::new(
            "resourceType",
            ValueKind::String,
            Value::Null,
            "Collection to look the resource up in",
        ))
        .with_option(ConfigOption::new(
            "idField",
            ValueKind::String,
            json!("id"),
            "Path of the identifier in the response body",
        ))
        .with_option(ConfigOption::new(
            "lookupField",
            ValueKind::String,
            Value::Null,
            "Record field to match the identifier against (defaults to idField)",
        ))
        .with_option(ConfigOption::new(
            "maxRetries",
            ValueKind::Number,
            json!(verification.max_retries),
            "Maximum number of lookups",
        ))
        .with_option(ConfigOption::new(
            "retryDelayMs",
            ValueKind::Number,
            json!(verification.retry_delay_ms),
            "Fixed delay between lookups",
        ))
}

pub fn presentation() -> NodePresentation {
    NodePresentation::new("#22c55e").with_shape(NodeShape::Rectangle)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyConfig {
    #[serde(default)]
    resource_type: Option<String>,
    #[serde(default = "default_id_field")]
    id_field: String,
    #[serde(default)]
    lookup_field: Option<String>,
    #[serde(default)]
    max_retries: Option<u32>,
    #[serde(default)]
    retry_delay_ms: Option<u64>,
}

fn default_id_field() -> String {
    "id".into()
}

impl VerifyConfig {
    fn target(&self) -> Result<VerificationTarget> {
        let resource_type = self
            .resource_type
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| NodeflowError::MissingRequiredField("resourceType".into()))?;
        let mut target = VerificationTarget::new(resource_type, self.id_field.clone());
        if let Some(ref field) = self.lookup_field {
            if !field.trim().is_empty() {
                target = target.with_lookup_field(field.trim());
            }
        }
        Ok(target)
    }

    fn policy(&self, base: RetryPolicy) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(base.max_retries),
            retry_delay: self
                .retry_delay_ms
                .map(std::time::Duration::from_millis)
                .unwrap_or(base.retry_delay),
        }
    }
}

pub struct VerifiedRequestExecutor {
    caller: HttpCaller,
    verifier: Verifier,
}

impl VerifiedRequestExecutor {
    pub fn new(caller: HttpCaller, verifier: Verifier) -> Self {
        Self { caller, verifier }
    }
}

impl NodeExecutor for VerifiedRequestExecutor {
    fn execute(&self, config: Value, input: Value) -> BoxFuture<'_, Result<Envelope>> {
        Box::pin(async move {
            let start = Utc::now();
            let spec = HttpCallSpec::from_config(&config)?;
            let vcfg: VerifyConfig = parse_config(config)?;
            // Validate before the call so a misconfigured node has no side effects.
            let target = vcfg.target()?;
            let policy = vcfg.policy(self.verifier.policy());

            let call = self.caller.call(&spec, &input).await;
            if !call.is_success() {
                return Ok(call);
            }
            let body = call.output("body").cloned().unwrap_or(Value::Null);

            let record = match self.verifier.verify_with(&body, &target, policy).await {
                Ok(record) => record,
                Err(e) => {
                    warn!(resource_type = %target.resource_type, error = %e, "Cannot verify response");
                    let outcome = VerifiedOutcome {
                        success: true,
                        verified: false,
                        data: body,
                        verification: Some(VerificationRecord {
                            verified: false,
                            attempts: 0,
                            resource_type: target.resource_type.clone(),
                            lookup_field: target.lookup_field.clone(),
                            lookup_value: Value::Null,
                            found_entity: None,
                        }),
                        error: Some(e.to_string()),
                    };
                    return Ok(Envelope::from_error(&e)
                        .with_data(serde_json::to_value(&outcome)?)
                        .with_timing(start, Utc::now()));
                }
            };

            let message = if record.verified {
                info!(
                    resource_type = %record.resource_type,
                    attempts = record.attempts,
                    "Request verified"
                );
                format!(
                    "Verified {} {}={} after {} attempt(s)",
                    record.resource_type,
                    record.lookup_field,
                    stringify(&record.lookup_value),
                    record.attempts
                )
            } else {
                format!(
                    "{}: {} {}={} not found after {} attempt(s)",
                    VERIFICATION_FAILED,
                    record.resource_type,
                    record.lookup_field,
                    stringify(&record.lookup_value),
                    record.attempts
                )
            };

            let outcome = VerifiedOutcome {
                success: true,
                verified: record.verified,
                data: body,
                error: (!record.verified).then(|| VERIFICATION_FAILED.to_string()),
                verification: Some(record),
            };
            Ok(Envelope::success(serde_json::to_value(&outcome)?)
                .with_message(message)
                .with_timing(start, Utc::now()))
        })
    }
}
