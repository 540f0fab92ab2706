pub mod dispatcher;
pub mod workflow;

pub use dispatcher::{merge_config, Dispatcher};
pub use workflow::{Edge, EdgeCondition, StepResult, Workflow, WorkflowNode, WorkflowReport, WorkflowRunner};
