//! Execution error taxonomy (§7). Grounded on the donor's `ExecutionError`
//! (`crates/fuschia-engine/src/error.rs`) — kept as a flat `thiserror` enum
//! with one variant per failure kind rather than a nested hierarchy.

use fuschia_node::{NodeError, StopSeverity, UnknownNodeType};

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
  #[error("node '{node}' failed: {message}")]
  NodeExecution { node: String, message: String },

  #[error("unknown node type: {0}")]
  UnknownNodeType(String),

  #[error("workflow stopped: {message}")]
  WorkflowStop { message: String, severity: StopSeverity },

  #[error("recursion limit exceeded at depth {0}")]
  RecursionLimit(usize),

  #[error("exceeded maximum iterations ({0})")]
  IterationLimit(u32),

  #[error("validation error: {0}")]
  Validation(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("cancelled")]
  Cancelled,
}

impl From<UnknownNodeType> for ExecutionError {
  fn from(e: UnknownNodeType) -> Self {
    ExecutionError::UnknownNodeType(e.0)
  }
}

impl ExecutionError {
  pub fn from_node_error(node: &str, err: NodeError) -> Self {
    match err {
      NodeError::Execution(message) => ExecutionError::NodeExecution { node: node.to_string(), message },
      NodeError::Stop { message, severity } => ExecutionError::WorkflowStop { message, severity },
      NodeError::RecursionLimit(depth) => ExecutionError::RecursionLimit(depth),
    }
  }
}

/// One entry in `ExecutionContext`'s error log (§7 "user-visible behavior").
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorRecord {
  pub node_name: String,
  pub message: String,
  pub timestamp: chrono::DateTime<chrono::Utc>,
}
