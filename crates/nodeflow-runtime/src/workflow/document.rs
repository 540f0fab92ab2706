use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use nodeflow_core::error::{NodeflowError, Result};

/// A workflow document: nodes, edges between them, and where to start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Id of the first node to run.
    pub entry: String,
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// One placed node of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Unique id within the workflow.
    pub id: String,
    /// Registered node type to dispatch to.
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub config: Value,
}

impl WorkflowNode {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>, config: Value) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            config,
        }
    }
}

/// A directed connection between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub condition: EdgeCondition,
}

/// When an edge may be traversed, judged by the source node's status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeCondition {
    #[default]
    Always,
    OnSuccess,
    OnFailure,
}

impl EdgeCondition {
    pub fn matches(self, succeeded: bool) -> bool {
        match self {
            Self::Always => true,
            Self::OnSuccess => succeeded,
            Self::OnFailure => !succeeded,
        }
    }
}

impl Edge {
    pub fn always(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(from, to, EdgeCondition::Always)
    }

    pub fn on_success(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(from, to, EdgeCondition::OnSuccess)
    }

    pub fn on_failure(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(from, to, EdgeCondition::OnFailure)
    }

    fn new(from: impl Into<String>, to: impl Into<String>, condition: EdgeCondition) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition,
        }
    }
}

impl Workflow {
    pub fn new(entry: impl Into<String>, nodes: Vec<WorkflowNode>, edges: Vec<Edge>) -> Self {
        Self {
            entry: entry.into(),
            nodes,
            edges,
        }
    }

    /// Parse and validate a JSON workflow document.
    pub fn from_json(text: &str) -> Result<Self> {
        let workflow: Self = serde_json::from_str(text)?;
        workflow.validate()?;
        Ok(workflow)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Outgoing edges of `id`, in document order.
    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.from == id)
    }

    /// Check that ids are unique and every reference points at a node.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(NodeflowError::Workflow(format!(
                    "Duplicate node id '{}'",
                    node.id
                )));
            }
        }
        if !seen.contains(self.entry.as_str()) {
            return Err(NodeflowError::Workflow(format!(
                "Entry node '{}' not found in workflow",
                self.entry
            )));
        }
        for edge in &self.edges {
            for end in [&edge.from, &edge.to] {
                if !seen.contains(end.as_str()) {
                    return Err(NodeflowError::Workflow(format!(
                        "Edge {} -> {} references unknown node '{}'",
                        edge.from, edge.to, end
                    )));
                }
            }
        }
        Ok(())
    }
}
