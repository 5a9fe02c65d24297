//! Event stream (C8, §4.5/§6.6). Grounded on the donor's
//! `crates/fuschia-engine/src/events.rs` `ExecutionEvent`/`ExecutionNotifier`
//! shape, extended with the node-lifecycle and sub-workflow-tagging fields
//! this spec's taxonomy requires.

use tokio::sync::mpsc;

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
  #[serde(rename = "execution:start")]
  ExecutionStart { execution_id: String, timestamp: chrono::DateTime<chrono::Utc> },
  #[serde(rename = "node:start")]
  NodeStart {
    execution_id: String,
    node_name: String,
    node_type: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subworkflow_parent_node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subworkflow_id: Option<String>,
  },
  #[serde(rename = "node:complete")]
  NodeComplete {
    execution_id: String,
    node_name: String,
    node_type: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subworkflow_parent_node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subworkflow_id: Option<String>,
  },
  #[serde(rename = "node:error")]
  NodeError {
    execution_id: String,
    node_name: String,
    node_type: String,
    error: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subworkflow_parent_node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subworkflow_id: Option<String>,
  },
  #[serde(rename = "execution:complete")]
  ExecutionComplete { execution_id: String, timestamp: chrono::DateTime<chrono::Utc>, progress: Progress },
  #[serde(rename = "execution:error")]
  ExecutionError { execution_id: String, timestamp: chrono::DateTime<chrono::Utc>, error: String },
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Progress {
  pub completed: usize,
}

/// Implement this to observe events during a run (persist, stream to a UI,
/// log). The engine never blocks on a slow consumer when using
/// `ChannelNotifier`, and an error in a notifier implementation must never
/// abort the run (§4.5 "best-effort in-order delivery").
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    let _ = self.sender.send(event);
  }
}

/// Wraps a parent's notifier so that every event emitted by a sub-workflow
/// run is tagged with which node and workflow it came from (§4.5
/// "sub-workflow event tagging"), without any global mutable state — the
/// tagging lives entirely in this wrapper's closure state.
pub struct SubworkflowTaggingNotifier<N: ExecutionNotifier + ?Sized> {
  inner: std::sync::Arc<N>,
  parent_node: String,
  subworkflow_id: String,
}

impl<N: ExecutionNotifier + ?Sized> SubworkflowTaggingNotifier<N> {
  pub fn new(inner: std::sync::Arc<N>, parent_node: String, subworkflow_id: String) -> Self {
    Self { inner, parent_node, subworkflow_id }
  }
}

impl<N: ExecutionNotifier + ?Sized> ExecutionNotifier for SubworkflowTaggingNotifier<N> {
  fn notify(&self, mut event: ExecutionEvent) {
    match &mut event {
      ExecutionEvent::NodeStart { subworkflow_parent_node, subworkflow_id, .. }
      | ExecutionEvent::NodeComplete { subworkflow_parent_node, subworkflow_id, .. }
      | ExecutionEvent::NodeError { subworkflow_parent_node, subworkflow_id, .. } => {
        *subworkflow_parent_node = Some(self.parent_node.clone());
        *subworkflow_id = Some(self.subworkflow_id.clone());
      }
      _ => {}
    }
    self.inner.notify(event);
  }
}
