use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::event::EventBus;
use nodeflow_core::types::{Envelope, RuntimeEvent};

use super::document::Workflow;
use crate::dispatcher::Dispatcher;

/// Outcome of one node within a workflow run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub node_id: String,
    pub node_type: String,
    pub envelope: Envelope,
    pub elapsed_ms: u64,
}

/// Outcome of a whole workflow run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowReport {
    /// Steps in execution order.
    pub steps: Vec<StepResult>,
    pub total_elapsed_ms: u64,
    /// Whether every executed step succeeded and the run was not halted.
    pub succeeded: bool,
    /// Set when the run was cut short by the visit limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halted_at: Option<String>,
}

impl WorkflowReport {
    /// Envelope of the last executed step.
    pub fn last(&self) -> Option<&Envelope> {
        self.steps.last().map(|s| &s.envelope)
    }
}

/// Runs a workflow one node at a time.
///
/// Starting at `entry`, each node is dispatched, the first outgoing edge whose
/// condition matches is followed, and the node's data payload becomes the
/// next node's input. Error envelopes forward their data too, so a failure
/// branch can inspect what the failed node produced. The run ends when no
/// edge matches.
pub struct WorkflowRunner {
    dispatcher: Dispatcher,
    max_visits: usize,
    events: Option<Arc<EventBus>>,
}

impl WorkflowRunner {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            max_visits: 5,
            events: None,
        }
    }

    /// How many times one node may run before the run is stopped.
    pub fn with_max_visits(mut self, max_visits: usize) -> Self {
        self.max_visits = max_visits;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn run(&self, workflow: &Workflow, input: Value) -> Result<WorkflowReport> {
        let start = Instant::now();
        let mut steps: Vec<StepResult> = Vec::new();
        let mut visits: Vec<&str> = Vec::new();
        let mut current = workflow.entry.as_str();
        let mut input = input;
        let mut halted_at = None;

        loop {
            if visits.iter().filter(|id| **id == current).count() >= self.max_visits {
                warn!(
                    node_id = %current,
                    max_visits = self.max_visits,
                    "Node visit limit reached, stopping workflow"
                );
                halted_at = Some(current.to_string());
                break;
            }
            visits.push(current);

            let node = workflow.node(current).ok_or_else(|| {
                NodeflowError::Workflow(format!("Node '{}' not found in workflow", current))
            })?;

            info!(node_id = %node.id, node_type = %node.node_type, "Executing workflow node");
            let node_start = Instant::now();
            let envelope = self
                .dispatcher
                .execute(&node.node_type, node.config.clone(), input)
                .await;
            let elapsed_ms = node_start.elapsed().as_millis() as u64;
            let succeeded = envelope.is_success();

            if let Some(ref events) = self.events {
                events.publish(RuntimeEvent::WorkflowStepCompleted {
                    node_id: node.id.clone(),
                    node_type: node.node_type.clone(),
                    status: envelope.status(),
                });
            }
            debug!(node_id = %node.id, succeeded, elapsed_ms, "Workflow node complete");

            input = envelope.data.clone();
            steps.push(StepResult {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
                envelope,
                elapsed_ms,
            });

            match workflow
                .outgoing(&node.id)
                .find(|edge| edge.condition.matches(succeeded))
            {
                Some(edge) => current = edge.to.as_str(),
                None => {
                    debug!(node_id = %node.id, "No edge matched, workflow complete");
                    break;
                }
            }
        }

        let succeeded = halted_at.is_none() && steps.iter().all(|s| s.envelope.is_success());
        Ok(WorkflowReport {
            steps,
            total_elapsed_ms: start.elapsed().as_millis() as u64,
            succeeded,
            halted_at,
        })
    }
}
