//! Execution context and layered-BFS workflow runner (C4, C7).

mod context;
mod error;
mod events;
mod job;
mod repository;
mod runner;

pub use context::{ExecutionContext, JobNodeContext, WebhookResponseData};
pub use error::{ErrorRecord, ExecutionError};
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier, Progress, SubworkflowTaggingNotifier};
pub use job::ExecutionJob;
pub use repository::{StoredWorkflow, WorkflowRepository};
pub use runner::{run_subworkflow, RunOutcome, WorkflowRunner};

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use fuschia_node::NodeRegistry;
  use fuschia_value::Item;
  use fuschia_workflow::{Connection, NodeDefinition, Workflow, WorkflowSettings};

  use super::*;

  fn registry() -> Arc<NodeRegistry> {
    let mut registry = NodeRegistry::new();
    fuschia_nodes::register_all(&mut registry);
    Arc::new(registry)
  }

  fn context() -> ExecutionContext {
    let mut ctx = ExecutionContext::new("manual", reqwest::Client::new());
    ctx.registry_for_subworkflow = Some(registry());
    ctx
  }

  #[tokio::test]
  async fn runs_a_linear_workflow() {
    let workflow = Workflow {
      id: "wf-1".into(),
      name: "linear".into(),
      nodes: vec![
        NodeDefinition::new("Start", "Start", serde_json::json!({})),
        NodeDefinition::new("SetName", "Set", serde_json::json!({"mode": "manual", "fields": [{"name": "greeting", "value": "hi"}]})),
      ],
      connections: vec![Connection::normal("Start", "SetName")],
      settings: WorkflowSettings::default(),
    };
    workflow.validate().unwrap();

    let runner = WorkflowRunner::new(registry());
    let ctx = context();
    let outcome = runner.run(&workflow, vec![Item::new(serde_json::json!({}))], &ctx).await.unwrap();

    let set_output = outcome.node_states.get("SetName").unwrap();
    assert_eq!(set_output.len(), 1);
    assert_eq!(set_output[0].json["greeting"], "hi");
  }

  #[tokio::test]
  async fn if_node_suppresses_the_false_branch_via_no_output() {
    let workflow = Workflow {
      id: "wf-2".into(),
      name: "branching".into(),
      nodes: vec![
        NodeDefinition::new("Start", "Start", serde_json::json!({})),
        NodeDefinition::new(
          "Gate",
          "If",
          serde_json::json!({"rules": [{"field": "{{ $json.ok }}", "operation": "equals", "value": true}]}),
        ),
        NodeDefinition::new("OnTrue", "Set", serde_json::json!({"mode": "manual", "fields": [{"name": "path", "value": "true"}]})),
        NodeDefinition::new("OnFalse", "Set", serde_json::json!({"mode": "manual", "fields": [{"name": "path", "value": "false"}]})),
      ],
      connections: vec![
        Connection::normal("Start", "Gate"),
        Connection { source_output: "true".into(), ..Connection::normal("Gate", "OnTrue") },
        Connection { source_output: "false".into(), ..Connection::normal("Gate", "OnFalse") },
      ],
      settings: WorkflowSettings::default(),
    };

    let runner = WorkflowRunner::new(registry());
    let ctx = context();
    let outcome = runner.run(&workflow, vec![Item::new(serde_json::json!({"ok": true}))], &ctx).await.unwrap();

    assert!(outcome.node_states.contains_key("OnTrue"));
    assert!(!outcome.node_states.contains_key("OnFalse"));
  }

  #[tokio::test]
  async fn merge_waits_for_every_branch_before_joining() {
    let workflow = Workflow {
      id: "wf-3".into(),
      name: "merge".into(),
      nodes: vec![
        NodeDefinition::new("Start", "Start", serde_json::json!({})),
        NodeDefinition::new("A", "Set", serde_json::json!({"mode": "manual", "fields": [{"name": "branch", "value": "a"}]})),
        NodeDefinition::new("B", "Set", serde_json::json!({"mode": "manual", "fields": [{"name": "branch", "value": "b"}]})),
        NodeDefinition::new("Join", "Merge", serde_json::json!({"mode": "append"})),
      ],
      connections: vec![
        Connection::normal("Start", "A"),
        Connection::normal("Start", "B"),
        Connection::normal("A", "Join"),
        Connection::normal("B", "Join"),
      ],
      settings: WorkflowSettings::default(),
    };

    let runner = WorkflowRunner::new(registry());
    let ctx = context();
    let outcome = runner.run(&workflow, vec![Item::new(serde_json::json!({}))], &ctx).await.unwrap();

    let joined = outcome.node_states.get("Join").unwrap();
    assert_eq!(joined.len(), 2);
  }

  #[tokio::test]
  async fn exceeding_max_iterations_is_reported() {
    // A single-input node wired back into itself with no exit condition —
    // the simplest topology that drives the BFS layer count unbounded.
    let workflow = Workflow {
      id: "wf-4".into(),
      name: "runaway".into(),
      nodes: vec![
        NodeDefinition::new("Start", "Start", serde_json::json!({})),
        NodeDefinition::new("Spin", "Set", serde_json::json!({"mode": "manual", "fields": [{"name": "tick", "value": "x"}]})),
      ],
      connections: vec![Connection::normal("Start", "Spin"), Connection::normal("Spin", "Spin")],
      settings: WorkflowSettings { max_iterations: 3 },
    };

    let runner = WorkflowRunner::new(registry());
    let ctx = context();
    let err = runner.run(&workflow, vec![Item::new(serde_json::json!({}))], &ctx).await.unwrap_err();
    assert!(matches!(err, ExecutionError::IterationLimit(3)));
  }
}
