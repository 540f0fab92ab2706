use futures::future::BoxFuture;
use indexmap::IndexMap;

use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::traits::HttpTransport;
use nodeflow_core::types::{HttpRequest, HttpResponse, RequestBody};

/// `HttpTransport` backed by a shared `reqwest::Client`.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| NodeflowError::Network(e.to_string()))?;
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>> {
        Box::pin(async move {
            let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|e| {
                NodeflowError::InvalidConfig(format!("Invalid method {}: {}", request.method, e))
            })?;

            let mut req = self
                .client
                .request(method, &request.url)
                .timeout(request.timeout);
            for (k, v) in &request.headers {
                req = req.header(k.as_str(), v.as_str());
            }
            if !request.query.is_empty() {
                req = req.query(&request.query);
            }
            match request.body {
                Some(RequestBody::Json(value)) => req = req.json(&value),
                Some(RequestBody::Text(text)) => req = req.body(text),
                None => {}
            }

            let resp = req.send().await.map_err(|e| {
                if e.is_timeout() {
                    NodeflowError::Timeout {
                        url: request.url.clone(),
                        timeout_ms: request.timeout.as_millis() as u64,
                    }
                } else {
                    NodeflowError::Network(e.to_string())
                }
            })?;

            let status = resp.status();
            let headers: IndexMap<String, String> = resp
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("?").to_string()))
                .collect();
            let text = resp
                .text()
                .await
                .map_err(|e| NodeflowError::Network(e.to_string()))?;

            Ok(HttpResponse {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
                headers,
                body: parse_body(text),
            })
        })
    }
}

/// JSON payloads become structured values; anything else stays a string.
pub(crate) fn parse_body(text: String) -> serde_json::Value {
    if text.trim().is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
}
