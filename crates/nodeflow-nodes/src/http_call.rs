use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use nodeflow_core::config::HttpConfig;
use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::template::stringify;
use nodeflow_core::traits::HttpTransport;
use nodeflow_core::types::{Envelope, HttpRequest, RequestBody};

/// Request description taken from a node's configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpCallSpec {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: IndexMap<String, Value>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub fail_on_error_status: Option<bool>,
}

impl HttpCallSpec {
    pub fn from_config(config: &Value) -> Result<Self> {
        serde_json::from_value(config.clone())
            .map_err(|e| NodeflowError::InvalidConfig(e.to_string()))
    }

    pub fn method(&self) -> String {
        self.method
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or("GET")
            .to_uppercase()
    }
}

/// Performs exactly one outbound request per call and folds every outcome
/// into an `Envelope`.
#[derive(Clone)]
pub struct HttpCaller {
    transport: Arc<dyn HttpTransport>,
    defaults: HttpConfig,
}

impl HttpCaller {
    pub fn new(transport: Arc<dyn HttpTransport>, defaults: HttpConfig) -> Self {
        Self {
            transport,
            defaults,
        }
    }

    /// Build the outbound request from the node config and upstream input.
    ///
    /// Input headers are applied first and spec headers override them. A body
    /// is attached only to methods other than GET/HEAD, preferring the input's
    /// `body` over the spec's.
    pub fn build_request(&self, spec: &HttpCallSpec, input: &Value) -> Result<HttpRequest> {
        let url = spec
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| NodeflowError::MissingRequiredField("url".into()))?;

        let method = spec.method();
        let mut headers = IndexMap::new();
        if let Some(Value::Object(upstream)) = input.get("headers") {
            for (k, v) in upstream {
                set_header(&mut headers, k, v);
            }
        }
        for (k, v) in &spec.headers {
            set_header(&mut headers, k, v);
        }

        let body = if method == "GET" || method == "HEAD" {
            None
        } else {
            input
                .get("body")
                .filter(|b| !b.is_null())
                .or(spec.body.as_ref().filter(|b| !b.is_null()))
                .map(|b| encode_body(b, declares_json(&headers)))
        };

        Ok(HttpRequest {
            method,
            url: url.to_string(),
            headers,
            query: vec![],
            body,
            timeout: spec
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| self.defaults.timeout()),
        })
    }

    pub async fn call(&self, spec: &HttpCallSpec, input: &Value) -> Envelope {
        let start = Utc::now();
        let request = match self.build_request(spec, input) {
            Ok(r) => r,
            Err(e) => return Envelope::from_error(&e),
        };
        let fail_on_status = spec
            .fail_on_error_status
            .unwrap_or(self.defaults.fail_on_error_status);

        debug!(method = %request.method, url = %request.url, "Sending request");
        let url = request.url.clone();
        match self.transport.send(request).await {
            Ok(resp) => {
                let end = Utc::now();
                if fail_on_status && !resp.is_success() {
                    let err = NodeflowError::HttpStatus {
                        status: resp.status,
                        reason: resp.reason.clone(),
                    };
                    warn!(url = %url, status = resp.status, "Request returned error status");
                    return Envelope::from_error(&err)
                        .with_upstream(Some(resp.status), Some(resp.body))
                        .with_timing(start, end);
                }
                let data = json!({
                    "status": resp.status,
                    "headers": resp.headers,
                    "body": resp.body,
                });
                Envelope::success(data)
                    .with_message(format!("HTTP {} {}", resp.status, resp.reason).trim_end().to_string())
                    .with_timing(start, end)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Request failed");
                Envelope::from_error(&e).with_timing(start, Utc::now())
            }
        }
    }
}

/// Insert a header, replacing any existing one with the same name
/// regardless of case.
fn set_header(headers: &mut IndexMap<String, String>, name: &str, value: &Value) {
    headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
    headers.insert(name.to_string(), stringify(value).into_owned());
}

fn declares_json(headers: &IndexMap<String, String>) -> bool {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
        .map(|(_, v)| {
            let v = v.to_ascii_lowercase();
            v.contains("application/json") || v.contains("+json")
        })
        .unwrap_or(false)
}

/// Text bodies under a JSON content type are parsed when possible and sent
/// raw otherwise; structured bodies are always JSON.
fn encode_body(body: &Value, json_content: bool) -> RequestBody {
    match body {
        Value::String(text) if json_content => serde_json::from_str(text)
            .map(RequestBody::Json)
            .unwrap_or_else(|_| RequestBody::Text(text.clone())),
        Value::String(text) => RequestBody::Text(text.clone()),
        other => RequestBody::Json(other.clone()),
    }
}
