//! `ExecutionContext` (§3) — state shared across one run, guarded by a
//! single mutex per §9's concurrency-primitives guidance ("per-context
//! mutex, or serialize result application after a layer's gather"). This
//! implementation takes the mutex approach: every mutation
//! (`node_states`, `pending_inputs`, `node_internal_state`, `errors`,
//! `webhook_response`) goes through `ContextState`, locked briefly per
//! access rather than held across an `.await`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fuschia_node::{NodeContext, NodeError, NodeRegistry, PortOutput};
use fuschia_value::Item;
use fuschia_workflow::{Connection, Workflow};

use crate::error::ErrorRecord;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier, Progress};
use crate::repository::WorkflowRepository;

pub struct WebhookResponseData {
  pub status_code: u16,
  pub body: Vec<u8>,
  pub headers: Vec<(String, String)>,
  pub content_type: Option<String>,
}

struct ContextState {
  node_states: BTreeMap<String, Vec<Item>>,
  node_run_counts: BTreeMap<String, u32>,
  pending_inputs: BTreeMap<String, BTreeMap<String, PortOutput>>,
  node_internal_state: BTreeMap<String, serde_json::Value>,
  errors: Vec<ErrorRecord>,
  webhook_response: Option<WebhookResponseData>,
  completed_nodes: usize,
}

/// Per-run state (§3). One `ExecutionContext` is created per top-level
/// `run` call and per sub-workflow call; sub-workflows get their own
/// instance but inherit `execution_depth + 1`, `max_execution_depth`,
/// `parent_execution_id`, `workflow_repository`, and `http_client`.
pub struct ExecutionContext {
  pub execution_id: String,
  pub mode: String,
  pub start_time: chrono::DateTime<chrono::Utc>,
  pub execution_depth: usize,
  pub max_execution_depth: usize,
  pub parent_execution_id: Option<String>,
  pub workflow_repository: Option<Arc<dyn WorkflowRepository>>,
  pub http_client: reqwest::Client,
  pub on_event: Arc<dyn ExecutionNotifier>,
  /// Shared with every sub-workflow run spawned from this one, so
  /// `ExecuteWorkflow` never needs a second registry wired in separately.
  pub registry_for_subworkflow: Option<Arc<NodeRegistry>>,
  state: Mutex<ContextState>,
}

impl ExecutionContext {
  pub fn new(mode: impl Into<String>, http_client: reqwest::Client) -> Self {
    Self {
      execution_id: uuid::Uuid::new_v4().to_string(),
      mode: mode.into(),
      start_time: chrono::Utc::now(),
      execution_depth: 0,
      max_execution_depth: 10,
      parent_execution_id: None,
      workflow_repository: None,
      http_client,
      on_event: Arc::new(NoopNotifier),
      registry_for_subworkflow: None,
      state: Mutex::new(ContextState {
        node_states: BTreeMap::new(),
        node_run_counts: BTreeMap::new(),
        pending_inputs: BTreeMap::new(),
        node_internal_state: BTreeMap::new(),
        errors: Vec::new(),
        webhook_response: None,
        completed_nodes: 0,
      }),
    }
  }

  pub fn child(&self, mode: impl Into<String>) -> Self {
    Self {
      execution_id: uuid::Uuid::new_v4().to_string(),
      mode: mode.into(),
      start_time: chrono::Utc::now(),
      execution_depth: self.execution_depth + 1,
      max_execution_depth: self.max_execution_depth,
      parent_execution_id: Some(self.execution_id.clone()),
      workflow_repository: self.workflow_repository.clone(),
      http_client: self.http_client.clone(),
      on_event: self.on_event.clone(),
      registry_for_subworkflow: self.registry_for_subworkflow.clone(),
      state: Mutex::new(ContextState {
        node_states: BTreeMap::new(),
        node_run_counts: BTreeMap::new(),
        pending_inputs: BTreeMap::new(),
        node_internal_state: BTreeMap::new(),
        errors: Vec::new(),
        webhook_response: None,
        completed_nodes: 0,
      }),
    }
  }

  pub fn record_node_state(&self, node_name: &str, items: Vec<Item>) {
    let mut state = self.state.lock().unwrap();
    *state.node_run_counts.entry(node_name.to_string()).or_insert(0) += 1;
    state.node_states.insert(node_name.to_string(), items);
  }

  pub fn node_state(&self, node_name: &str) -> Option<Vec<Item>> {
    self.state.lock().unwrap().node_states.get(node_name).cloned()
  }

  pub fn node_states_snapshot(&self) -> BTreeMap<String, Vec<Item>> {
    self.state.lock().unwrap().node_states.clone()
  }

  pub fn node_run_count(&self, node_name: &str) -> u32 {
    self.state.lock().unwrap().node_run_counts.get(node_name).copied().unwrap_or(0)
  }

  pub fn record_error(&self, node_name: &str, message: &str) {
    let mut state = self.state.lock().unwrap();
    state.errors.push(ErrorRecord { node_name: node_name.to_string(), message: message.to_string(), timestamp: chrono::Utc::now() });
  }

  pub fn errors(&self) -> Vec<ErrorRecord> {
    self.state.lock().unwrap().errors.clone()
  }

  pub fn webhook_response(&self) -> Option<(u16, Vec<u8>, Vec<(String, String)>, Option<String>)> {
    self.state.lock().unwrap().webhook_response.as_ref().map(|r| (r.status_code, r.body.clone(), r.headers.clone(), r.content_type.clone()))
  }

  /// Record one arriving `(source_node, source_output)` contribution for
  /// `node_name`'s join at `run_index`, returning the flattened,
  /// `NO_OUTPUT`-filtered item list once every distinct expected source has
  /// reported in (§3 "Join"). Returns `None` while the join is still
  /// waiting on other branches.
  pub fn join_arrival(
    &self,
    node_name: &str,
    run_index: u32,
    source_key: String,
    output: PortOutput,
    expected: &std::collections::BTreeSet<(String, String)>,
  ) -> Option<Vec<Item>> {
    let key = format!("{node_name}:{run_index}");
    let mut state = self.state.lock().unwrap();
    let bucket = state.pending_inputs.entry(key.clone()).or_default();
    bucket.insert(source_key, output);

    if expected.iter().all(|(src, out)| bucket.contains_key(&format!("{src}:{out}"))) {
      let bucket = state.pending_inputs.remove(&key).unwrap();
      let items = bucket.into_values().filter_map(|o| o.as_items().map(<[Item]>::to_vec)).flatten().collect();
      Some(items)
    } else {
      None
    }
  }

  pub fn internal_state(&self, node_name: &str) -> Option<serde_json::Value> {
    self.state.lock().unwrap().node_internal_state.get(node_name).cloned()
  }

  pub fn set_internal_state(&self, node_name: &str, value: serde_json::Value) {
    self.state.lock().unwrap().node_internal_state.insert(node_name.to_string(), value);
  }

  pub fn clear_internal_state(&self, node_name: &str) {
    self.state.lock().unwrap().node_internal_state.remove(node_name);
  }

  pub fn emit(&self, event: ExecutionEvent) {
    if matches!(event, ExecutionEvent::NodeComplete { .. }) {
      self.state.lock().unwrap().completed_nodes += 1;
    }
    self.on_event.notify(event);
  }

  pub fn progress(&self) -> Progress {
    Progress { completed: self.state.lock().unwrap().completed_nodes }
  }
}

/// The narrow, per-job view of `ExecutionContext` handed to a node's
/// `execute` call (§3 "Lifecycles and Ownership": nodes may only mutate
/// `pending_inputs`, `node_internal_state`, `webhook_response`, `errors` —
/// all of those go through the shared `ExecutionContext`, never touched
/// directly here).
pub struct JobNodeContext<'a> {
  pub execution: &'a ExecutionContext,
  pub workflow: &'a Workflow,
  pub node_name: String,
  pub item_index: usize,
  pub input_items: Vec<Item>,
}

impl<'a> JobNodeContext<'a> {
  fn expr_context(&self, item_index: usize) -> fuschia_expr::ExpressionContext {
    let node_states = self.execution.node_states_snapshot();
    fuschia_expr::ExpressionContext::new(&self.input_items, &node_states, &self.execution.execution_id, &self.execution.mode, item_index)
  }
}

#[async_trait]
impl<'a> NodeContext for JobNodeContext<'a> {
  fn execution_id(&self) -> &str {
    &self.execution.execution_id
  }

  fn mode(&self) -> &str {
    &self.execution.mode
  }

  fn item_index(&self) -> usize {
    self.item_index
  }

  fn execution_depth(&self) -> usize {
    self.execution.execution_depth
  }

  fn max_execution_depth(&self) -> usize {
    self.execution.max_execution_depth
  }

  fn resolve_at(&self, value: &serde_json::Value, item_index: usize) -> serde_json::Value {
    let ctx = self.expr_context(item_index);
    fuschia_expr::resolve(value, &ctx, false)
  }

  fn subnode_connections(&self, node_name: &str) -> Vec<Connection> {
    self.workflow.subnode_connections(node_name).cloned().collect()
  }

  fn node_state(&self, node_name: &str) -> Option<Vec<Item>> {
    self.execution.node_state(node_name)
  }

  fn internal_state(&self) -> Option<serde_json::Value> {
    self.execution.internal_state(&self.node_name)
  }

  fn set_internal_state(&self, value: serde_json::Value) {
    self.execution.set_internal_state(&self.node_name, value);
  }

  fn clear_internal_state(&self) {
    self.execution.clear_internal_state(&self.node_name);
  }

  fn set_webhook_response(&self, status_code: u16, body: Vec<u8>, headers: Vec<(String, String)>, content_type: Option<String>) {
    let mut state = self.execution.state.lock().unwrap();
    state.webhook_response = Some(WebhookResponseData { status_code, body, headers, content_type });
  }

  fn http_client(&self) -> reqwest::Client {
    self.execution.http_client.clone()
  }

  async fn run_subworkflow(&self, workflow_id: &str, input: Vec<Item>) -> Result<serde_json::Value, NodeError> {
    if self.execution.execution_depth + 1 > self.execution.max_execution_depth {
      return Err(NodeError::RecursionLimit(self.execution.execution_depth + 1));
    }
    let repository = self
      .execution
      .workflow_repository
      .as_ref()
      .ok_or_else(|| NodeError::Execution("no workflow repository configured for sub-workflow execution".to_string()))?;
    let stored = repository.get(workflow_id).await.ok_or_else(|| NodeError::Execution(format!("workflow '{workflow_id}' not found")))?;

    let sub_ctx = crate::runner::run_subworkflow(&stored.workflow, input, self.execution, &self.node_name, workflow_id).await?;

    let terminal_sources: std::collections::BTreeSet<&str> = stored.workflow.connections.iter().map(|c| c.source_node.as_str()).collect();
    let terminal_targets: std::collections::BTreeSet<&str> = stored.workflow.connections.iter().map(|c| c.target_node.as_str()).collect();
    let terminal_nodes: Vec<&str> = terminal_sources.difference(&terminal_targets).copied().collect();

    let states = sub_ctx.node_states_snapshot();
    let mut combined = terminal_nodes
      .iter()
      .filter_map(|name| states.get(*name))
      .filter_map(|items| items.last())
      .last()
      .map(|item| item.json.clone())
      .or_else(|| states.values().last().and_then(|items| items.last()).map(|i| i.json.clone()))
      .unwrap_or(serde_json::json!({}));

    if let serde_json::Value::Object(m) = &mut combined {
      m.insert(
        "_subworkflow".to_string(),
        serde_json::json!({"id": workflow_id, "name": stored.name, "execution_id": sub_ctx.execution_id}),
      );
    }
    Ok(combined)
  }
}
