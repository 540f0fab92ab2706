use std::future::Future;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::Result;
use crate::types::{Envelope, HttpRequest, HttpResponse};

/// Runtime behavior bound to a node type.
pub trait NodeExecutor: Send + Sync + 'static {
    /// Run the node with its (default-merged) config and upstream input.
    fn execute(&self, config: Value, input: Value) -> BoxFuture<'_, Result<Envelope>>;
}

/// Adapter that turns an async closure into a `NodeExecutor`.
pub struct FnExecutor<F>(pub F);

impl<F, Fut> NodeExecutor for FnExecutor<F>
where
    F: Fn(Value, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Envelope>> + Send + 'static,
{
    fn execute(&self, config: Value, input: Value) -> BoxFuture<'_, Result<Envelope>> {
        Box::pin((self.0)(config, input))
    }
}

/// Outbound HTTP. One request per call, no retries.
pub trait HttpTransport: Send + Sync + 'static {
    /// Send a request. Non-2xx statuses are returned as `Ok`; only transport
    /// failures and timeouts are `Err`.
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>>;
}

/// Read access to the system of record used by verification.
pub trait RecordLookup: Send + Sync + 'static {
    /// Find one record of `resource_type` whose `field` equals `value`.
    fn find<'a>(
        &'a self,
        resource_type: &'a str,
        field: &'a str,
        value: &'a Value,
    ) -> BoxFuture<'a, Result<Option<Value>>>;
}
