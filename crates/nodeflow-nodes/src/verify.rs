//! Post-hoc confirmation that a reported side effect actually happened.
//!
//! A 2xx from the triggering call is not proof that the entity exists. The
//! verifier re-reads the system of record a bounded number of times, waiting
//! a fixed interval between lookups, and reports what it observed. It never
//! repairs anything.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use nodeflow_core::config::VerificationConfig;
use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::event::EventBus;
use nodeflow_core::template::{resolve_path, stringify};
use nodeflow_core::traits::RecordLookup;
use nodeflow_core::types::{RuntimeEvent, VerificationRecord};

/// Message placed in `error` when the entity was never observed.
pub const VERIFICATION_FAILED: &str = "Resource verification failed";

/// Attempt budget and fixed delay between lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay_ms: u64) -> Self {
        Self {
            max_retries,
            retry_delay: Duration::from_millis(retry_delay_ms),
        }
    }

    pub fn from_config(config: &VerificationConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&VerificationConfig::default())
    }
}

/// What to look for: the id at `id_field` of the response payload must show
/// up as `lookup_field` of some `resource_type` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationTarget {
    pub resource_type: String,
    pub id_field: String,
    pub lookup_field: String,
}

impl VerificationTarget {
    /// The lookup field defaults to the last segment of `id_field`, so an id
    /// read from `data.id` is matched against the record's `id`.
    pub fn new(resource_type: impl Into<String>, id_field: impl Into<String>) -> Self {
        let id_field = id_field.into();
        let lookup_field = id_field.rsplit('.').next().unwrap_or(&id_field).to_string();
        Self {
            resource_type: resource_type.into(),
            lookup_field,
            id_field,
        }
    }

    pub fn with_lookup_field(mut self, lookup_field: impl Into<String>) -> Self {
        self.lookup_field = lookup_field.into();
        self
    }
}

pub struct Verifier {
    lookup: Arc<dyn RecordLookup>,
    policy: RetryPolicy,
    events: Option<Arc<EventBus>>,
}

impl Verifier {
    pub fn new(lookup: Arc<dyn RecordLookup>, policy: RetryPolicy) -> Self {
        Self {
            lookup,
            policy,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Verify with the default policy.
    pub async fn verify_creation(
        &self,
        payload: &Value,
        target: &VerificationTarget,
    ) -> Result<VerificationRecord> {
        self.verify_with(payload, target, self.policy).await
    }

    /// Look the claimed entity up at most `policy.max_retries` times.
    ///
    /// Fails with `MissingRequiredField` before any lookup when the payload
    /// has no identifier. A lookup error counts as "not found" for that
    /// attempt.
    pub async fn verify_with(
        &self,
        payload: &Value,
        target: &VerificationTarget,
        policy: RetryPolicy,
    ) -> Result<VerificationRecord> {
        let id = resolve_path(payload, &target.id_field)
            .filter(|v| !v.is_null() && v.as_str() != Some(""))
            .cloned()
            .ok_or_else(|| {
                NodeflowError::MissingRequiredField(format!(
                    "{} in {} response",
                    target.id_field, target.resource_type
                ))
            })?;

        for attempt in 1..=policy.max_retries {
            let found = match self
                .lookup
                .find(&target.resource_type, &target.lookup_field, &id)
                .await
            {
                Ok(found) => found,
                Err(e) => {
                    warn!(
                        resource_type = %target.resource_type,
                        attempt,
                        error = %e,
                        "Verification lookup failed"
                    );
                    None
                }
            };

            if let Some(ref events) = self.events {
                events.publish(RuntimeEvent::VerificationAttempt {
                    resource_type: target.resource_type.clone(),
                    attempt,
                    max_attempts: policy.max_retries,
                    found: found.is_some(),
                });
            }

            if let Some(entity) = found {
                info!(
                    resource_type = %target.resource_type,
                    id = %stringify(&id),
                    attempt,
                    "Resource verified"
                );
                return Ok(VerificationRecord {
                    verified: true,
                    attempts: attempt,
                    resource_type: target.resource_type.clone(),
                    lookup_field: target.lookup_field.clone(),
                    lookup_value: id,
                    found_entity: Some(entity),
                });
            }

            if attempt < policy.max_retries {
                debug!(
                    attempt,
                    delay_ms = policy.retry_delay.as_millis() as u64,
                    "Resource not visible yet, retrying"
                );
                tokio::time::sleep(policy.retry_delay).await;
            }
        }

        let record = VerificationRecord {
            verified: false,
            attempts: policy.max_retries,
            resource_type: target.resource_type.clone(),
            lookup_field: target.lookup_field.clone(),
            lookup_value: id,
            found_entity: None,
        };
        if let Some(mismatch) = mismatch_error(&record) {
            warn!(error = %mismatch, "Verification exhausted");
        }
        Ok(record)
    }
}

/// The mismatch a failed record describes, if any.
pub fn mismatch_error(record: &VerificationRecord) -> Option<NodeflowError> {
    if record.verified {
        return None;
    }
    Some(NodeflowError::VerificationMismatch {
        resource_type: record.resource_type.clone(),
        field: record.lookup_field.clone(),
        value: stringify(&record.lookup_value).into_owned(),
        attempts: record.attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeflow_test_utils::{LookupStep, ScriptedLookup};
    use serde_json::json;

    fn verifier(lookup: Arc<ScriptedLookup>, max_retries: u32, delay_ms: u64) -> Verifier {
        Verifier::new(lookup, RetryPolicy::new(max_retries, delay_ms))
    }

    #[tokio::test]
    async fn test_found_on_third_attempt() {
        let lookup = Arc::new(ScriptedLookup::found_on(3, json!({"id": "a1"})));
        let v = verifier(lookup.clone(), 3, 0);
        let record = v
            .verify_creation(&json!({"id": "a1"}), &VerificationTarget::new("agents", "id"))
            .await
            .unwrap();
        assert!(record.verified);
        assert_eq!(record.attempts, 3);
        assert_eq!(record.found_entity, Some(json!({"id": "a1"})));
        assert_eq!(lookup.calls(), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_stops_at_budget() {
        let lookup = Arc::new(ScriptedLookup::never());
        let v = verifier(lookup.clone(), 3, 0);
        let record = v
            .verify_creation(&json!({"id": 7}), &VerificationTarget::new("agents", "id"))
            .await
            .unwrap();
        assert!(!record.verified);
        assert_eq!(record.attempts, 3);
        assert!(record.found_entity.is_none());
        assert_eq!(lookup.calls(), 3);

        let err = mismatch_error(&record).unwrap();
        assert!(err.to_string().starts_with(VERIFICATION_FAILED));
    }

    #[tokio::test]
    async fn test_missing_identifier_makes_no_attempts() {
        let lookup = Arc::new(ScriptedLookup::never());
        let v = verifier(lookup.clone(), 3, 0);
        for payload in [json!({"name": "x"}), json!({"id": null}), json!({"id": ""}), Value::Null] {
            let err = v
                .verify_creation(&payload, &VerificationTarget::new("agents", "id"))
                .await
                .unwrap_err();
            assert!(matches!(err, NodeflowError::MissingRequiredField(_)));
        }
        assert_eq!(lookup.calls(), 0);
    }

    #[tokio::test]
    async fn test_nested_id_and_lookup_field() {
        let lookup = Arc::new(ScriptedLookup::found_on(1, json!({"uuid": "u-1"})));
        let v = verifier(lookup.clone(), 2, 0);
        let target = VerificationTarget::new("agents", "data.agent.uuid").with_lookup_field("uuid");
        let record = v
            .verify_creation(&json!({"data": {"agent": {"uuid": "u-1"}}}), &target)
            .await
            .unwrap();
        assert!(record.verified);
        assert_eq!(record.lookup_field, "uuid");
        assert_eq!(record.lookup_value, json!("u-1"));
        assert_eq!(
            lookup.queries(),
            vec![("agents".to_string(), "uuid".to_string(), json!("u-1"))]
        );
    }

    #[test]
    fn test_lookup_field_defaults_to_last_id_segment() {
        let target = VerificationTarget::new("agents", "data.agent.id");
        assert_eq!(target.lookup_field, "id");
        assert_eq!(VerificationTarget::new("agents", "uuid").lookup_field, "uuid");
    }

    #[tokio::test]
    async fn test_lookup_errors_count_as_not_found() {
        let lookup = Arc::new(ScriptedLookup::new(vec![
            LookupStep::Fail("connection reset".into()),
            LookupStep::Found(json!({"id": 1})),
        ]));
        let v = verifier(lookup.clone(), 3, 0);
        let record = v
            .verify_creation(&json!({"id": 1}), &VerificationTarget::new("agents", "id"))
            .await
            .unwrap();
        assert!(record.verified);
        assert_eq!(record.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_between_attempts_only() {
        let lookup = Arc::new(ScriptedLookup::never());
        let v = verifier(lookup, 3, 1_000);
        let started = tokio::time::Instant::now();
        let record = v
            .verify_creation(&json!({"id": 1}), &VerificationTarget::new("agents", "id"))
            .await
            .unwrap();
        assert!(!record.verified);
        // Two waits between three attempts, none after the last.
        assert_eq!(started.elapsed(), Duration::from_millis(2_000));
    }

    #[tokio::test]
    async fn test_zero_budget_reports_unverified() {
        let lookup = Arc::new(ScriptedLookup::never());
        let v = verifier(lookup.clone(), 0, 0);
        let record = v
            .verify_creation(&json!({"id": 1}), &VerificationTarget::new("agents", "id"))
            .await
            .unwrap();
        assert!(!record.verified);
        assert_eq!(record.attempts, 0);
        assert_eq!(lookup.calls(), 0);
    }

    #[tokio::test]
    async fn test_attempt_events_published() {
        let lookup = Arc::new(ScriptedLookup::found_on(2, json!({"id": 1})));
        let bus = Arc::new(EventBus::new(8));
        let mut rx = bus.subscribe();
        let v = verifier(lookup, 3, 0).with_events(bus);
        v.verify_creation(&json!({"id": 1}), &VerificationTarget::new("agents", "id"))
            .await
            .unwrap();

        let mut seen = vec![];
        while let Ok(RuntimeEvent::VerificationAttempt { attempt, found, .. }) = rx.try_recv() {
            seen.push((attempt, found));
        }
        assert_eq!(seen, vec![(1, false), (2, true)]);
    }
}
