use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use nodeflow_core::config::RecordsConfig;
use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::template::{resolve_path, stringify};
use nodeflow_core::traits::{HttpTransport, RecordLookup};
use nodeflow_core::types::HttpRequest;

/// Record lookup over a REST collection endpoint.
///
/// `find("agents", "id", 42)` issues `GET {base_url}/agents?id=42` and picks
/// the first returned record whose `id` equals `42`. Collections may come back
/// as a bare array, as `{"data": [...]}` / `{"items": [...]}` /
/// `{"results": [...]}`, or as a single object, bare or under one of those keys.
pub struct RestRecordLookup {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    timeout: Duration,
    bearer_token: Option<String>,
}

impl RestRecordLookup {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &RecordsConfig) -> Self {
        Self {
            transport,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_millis(config.timeout_ms),
            bearer_token: config.bearer_token.clone(),
        }
    }

    fn collection_url(&self, resource_type: &str) -> String {
        format!("{}/{}", self.base_url, resource_type.trim_matches('/'))
    }
}

impl RecordLookup for RestRecordLookup {
    fn find<'a>(
        &'a self,
        resource_type: &'a str,
        field: &'a str,
        value: &'a Value,
    ) -> BoxFuture<'a, Result<Option<Value>>> {
        Box::pin(async move {
            let mut request = HttpRequest::get(self.collection_url(resource_type), self.timeout);
            request
                .query
                .push((field.to_string(), stringify(value).into_owned()));
            request
                .headers
                .insert("Accept".into(), "application/json".into());
            if let Some(ref token) = self.bearer_token {
                request
                    .headers
                    .insert("Authorization".into(), format!("Bearer {}", token));
            }

            let resp = self.transport.send(request).await?;
            if resp.status == 404 {
                return Ok(None);
            }
            if !resp.is_success() {
                return Err(NodeflowError::HttpStatus {
                    status: resp.status,
                    reason: resp.reason,
                });
            }

            let found = records_in(&resp.body)
                .into_iter()
                .find(|record| {
                    resolve_path(record, field)
                        .map(|v| values_match(v, value))
                        .unwrap_or(false)
                })
                .cloned();
            debug!(resource_type, field, found = found.is_some(), "Record lookup");
            Ok(found)
        })
    }
}

fn records_in(body: &Value) -> Vec<&Value> {
    match body {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => {
            for key in ["data", "items", "results"] {
                match map.get(key) {
                    Some(Value::Array(items)) => return items.iter().collect(),
                    Some(inner @ Value::Object(_)) => return vec![inner],
                    _ => {}
                }
            }
            vec![body]
        }
        _ => vec![],
    }
}

/// Loose equality: `42` matches `"42"`, the way ids round-trip through URLs.
fn values_match(a: &Value, b: &Value) -> bool {
    a == b || stringify(a) == stringify(b)
}
