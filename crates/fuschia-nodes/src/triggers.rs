//! Trigger nodes (§4.2 "Triggers"): zero input ports, the workflow's entry
//! points. Grounded on `nodes/start.py`, `nodes/cron.py`,
//! `nodes/triggers/webhook.py`, `nodes/triggers/error_trigger.py`, and
//! `nodes/triggers/execute_workflow_trigger.py`.

use async_trait::async_trait;
use chrono::Utc;
use fuschia_node::{InputCount, Node, NodeContext, NodeDescriptionMetadata, NodeError, NodeExecutionResult};
use fuschia_value::Item;
use fuschia_workflow::NodeDefinition;

use crate::params::{resolved, str_param, u64_param};

/// Manual trigger (§6.4): passes through caller-supplied payload, or
/// synthesizes `{triggeredAt, mode}` when run without one.
pub struct Start;

#[async_trait]
impl Node for Start {
  fn node_type(&self) -> &'static str {
    "Start"
  }
  fn input_count(&self) -> InputCount {
    InputCount::Fixed(0)
  }
  fn description_metadata(&self) -> NodeDescriptionMetadata {
    NodeDescriptionMetadata { display_name: "Start".into(), category: "Trigger".into(), properties: vec![] }
  }
  async fn execute(&self, ctx: &dyn NodeContext, _def: &NodeDefinition, input_items: &[Item]) -> Result<NodeExecutionResult, NodeError> {
    if let Some(first) = input_items.first() {
      if !first.json.is_null() {
        return Ok(NodeExecutionResult::with_main(input_items.to_vec()));
      }
    }
    let item = Item::new(serde_json::json!({
      "triggeredAt": Utc::now().to_rfc3339(),
      "mode": ctx.mode(),
    }));
    Ok(NodeExecutionResult::with_main(vec![item]))
  }
}

/// Scheduled trigger. The actual scheduling loop is an external
/// collaborator (cron daemon / timer task); this node only shapes the seed
/// item once invoked (§6.4).
pub struct Cron;

#[async_trait]
impl Node for Cron {
  fn node_type(&self) -> &'static str {
    "Cron"
  }
  fn input_count(&self) -> InputCount {
    InputCount::Fixed(0)
  }
  fn description_metadata(&self) -> NodeDescriptionMetadata {
    NodeDescriptionMetadata { display_name: "Cron".into(), category: "Trigger".into(), properties: vec![] }
  }
  async fn execute(&self, ctx: &dyn NodeContext, def: &NodeDefinition, _input_items: &[Item]) -> Result<NodeExecutionResult, NodeError> {
    let params = resolved(ctx, &def.parameters);
    let mode = str_param(&params, "mode", "interval");
    let schedule = if mode == "interval" {
      format!("every {} seconds", u64_param(&params, "interval", 60))
    } else {
      str_param(&params, "cronExpression", "0 * * * *")
    };
    let item = Item::new(serde_json::json!({
      "triggeredAt": Utc::now().to_rfc3339(),
      "mode": "cron",
      "schedule": schedule,
    }));
    Ok(NodeExecutionResult::with_main(vec![item]))
  }
}

/// Webhook trigger: zero inputs when run standalone (dispatcher-seeded
/// items flow in as `input_items` in webhook mode), synthesizes a
/// placeholder shape otherwise so the node is still runnable manually.
pub struct Webhook;

#[async_trait]
impl Node for Webhook {
  fn node_type(&self) -> &'static str {
    "Webhook"
  }
  fn input_count(&self) -> InputCount {
    InputCount::Fixed(0)
  }
  fn description_metadata(&self) -> NodeDescriptionMetadata {
    NodeDescriptionMetadata { display_name: "Webhook".into(), category: "Trigger".into(), properties: vec![] }
  }
  async fn execute(&self, ctx: &dyn NodeContext, _def: &NodeDefinition, input_items: &[Item]) -> Result<NodeExecutionResult, NodeError> {
    if !input_items.is_empty() {
      return Ok(NodeExecutionResult::with_main(input_items.to_vec()));
    }
    let item = Item::new(serde_json::json!({
      "body": {},
      "headers": {},
      "query": {},
      "method": "POST",
      "triggeredAt": Utc::now().to_rfc3339(),
    }));
    let _ = ctx.mode();
    Ok(NodeExecutionResult::with_main(vec![item]))
  }
}

/// Entry point for error-handling workflows, triggered when another
/// workflow fails. Passes through whatever failure payload it was seeded
/// with (§6.4 sub-workflow seed shapes).
pub struct ErrorTrigger;

#[async_trait]
impl Node for ErrorTrigger {
  fn node_type(&self) -> &'static str {
    "ErrorTrigger"
  }
  fn input_count(&self) -> InputCount {
    InputCount::Fixed(0)
  }
  fn description_metadata(&self) -> NodeDescriptionMetadata {
    NodeDescriptionMetadata { display_name: "Error Trigger".into(), category: "Trigger".into(), properties: vec![] }
  }
  async fn execute(&self, _ctx: &dyn NodeContext, _def: &NodeDefinition, input_items: &[Item]) -> Result<NodeExecutionResult, NodeError> {
    if input_items.is_empty() {
      return Ok(NodeExecutionResult::with_main(vec![Item::new(serde_json::json!({}))]));
    }
    Ok(NodeExecutionResult::with_main(input_items.to_vec()))
  }
}

/// Entry point for sub-workflows invoked by `ExecuteWorkflow` (§6.4): the
/// parent's json is forwarded with `_triggeredAt`, `_triggerType`, and
/// `_executionDepth` markers already attached by the calling node, so this
/// trigger is a pure pass-through.
pub struct ExecuteWorkflowTrigger;

#[async_trait]
impl Node for ExecuteWorkflowTrigger {
  fn node_type(&self) -> &'static str {
    "ExecuteWorkflowTrigger"
  }
  fn input_count(&self) -> InputCount {
    InputCount::Fixed(0)
  }
  fn description_metadata(&self) -> NodeDescriptionMetadata {
    NodeDescriptionMetadata { display_name: "Execute Workflow Trigger".into(), category: "Trigger".into(), properties: vec![] }
  }
  async fn execute(&self, _ctx: &dyn NodeContext, _def: &NodeDefinition, input_items: &[Item]) -> Result<NodeExecutionResult, NodeError> {
    if input_items.is_empty() {
      return Ok(NodeExecutionResult::with_main(vec![Item::new(serde_json::json!({}))]));
    }
    Ok(NodeExecutionResult::with_main(input_items.to_vec()))
  }
}

/// Generic seed-item trigger used by chat-style integrations. Kept as a
/// plain pass-through shape — the chat/AI assistant layer that would
/// populate it is out of scope (§1 Non-goals).
pub struct ChatInput;

#[async_trait]
impl Node for ChatInput {
  fn node_type(&self) -> &'static str {
    "ChatInput"
  }
  fn input_count(&self) -> InputCount {
    InputCount::Fixed(0)
  }
  fn description_metadata(&self) -> NodeDescriptionMetadata {
    NodeDescriptionMetadata { display_name: "Chat Input".into(), category: "Trigger".into(), properties: vec![] }
  }
  async fn execute(&self, _ctx: &dyn NodeContext, _def: &NodeDefinition, input_items: &[Item]) -> Result<NodeExecutionResult, NodeError> {
    if input_items.is_empty() {
      return Ok(NodeExecutionResult::with_main(vec![Item::new(serde_json::json!({"message": ""}))]));
    }
    Ok(NodeExecutionResult::with_main(input_items.to_vec()))
  }
}
