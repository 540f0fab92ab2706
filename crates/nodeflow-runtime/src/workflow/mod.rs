//! Sequential workflow execution.
//!
//! A `Workflow` is a JSON document of nodes and conditional edges. The
//! `WorkflowRunner` walks it from the entry node through the dispatcher,
//! one node at a time.

pub mod document;
pub mod runner;

pub use document::{Edge, EdgeCondition, Workflow, WorkflowNode};
pub use runner::{StepResult, WorkflowReport, WorkflowRunner};
