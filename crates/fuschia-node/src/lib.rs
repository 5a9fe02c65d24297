//! Node contract and type registry (C3).
//!
//! Grounded on the donor's component trait (`fuschia-runtime`'s task-runner
//! abstraction, previously dispatching to a WASM component per node) —
//! generalized here into a plain async Rust trait, since this engine
//! executes nodes in-process rather than as sandboxed WIT components. The
//! single-capability-with-port-map shape (`NodeExecutionResult`) replaces
//! per-node-kind subclassing (§9 "Multi-output polymorphism").

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use fuschia_value::Item;
use fuschia_workflow::{Connection, NodeDefinition};

/// A port's output. `NoOutput` is distinct from `Items(vec![])`: an empty
/// list means "this port ran and produced zero items", which still
/// satisfies a multi-input join; `NoOutput` means "this branch is dead" and
/// a single-input downstream node must not be scheduled at all (§3, §9).
#[derive(Debug, Clone, PartialEq)]
pub enum PortOutput {
  Items(Vec<Item>),
  NoOutput,
}

impl PortOutput {
  pub fn items(items: Vec<Item>) -> Self {
    Self::Items(items)
  }

  pub fn is_no_output(&self) -> bool {
    matches!(self, Self::NoOutput)
  }

  pub fn as_items(&self) -> Option<&[Item]> {
    match self {
      Self::Items(items) => Some(items),
      Self::NoOutput => None,
    }
  }
}

/// The full result of one node execution: a map from output port name to
/// what that port produced. A port simply absent from the map behaves the
/// same as `NoOutput` for downstream scheduling purposes, but an explicit
/// `NoOutput` entry is preferred so the runner's join bookkeeping can record
/// that the port was visited.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeExecutionResult {
  pub ports: BTreeMap<String, PortOutput>,
}

pub const MAIN_PORT: &str = "main";

impl NodeExecutionResult {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_main(items: Vec<Item>) -> Self {
    let mut ports = BTreeMap::new();
    ports.insert(MAIN_PORT.to_string(), PortOutput::Items(items));
    Self { ports }
  }

  pub fn with_port(mut self, port: impl Into<String>, output: PortOutput) -> Self {
    self.ports.insert(port.into(), output);
    self
  }

  pub fn port(&self, name: &str) -> Option<&PortOutput> {
    self.ports.get(name)
  }
}

/// How many input ports a node type declares. Most nodes have exactly one
/// (`Fixed(1)`); triggers declare `Fixed(0)`; `Merge` declares `Dynamic`,
/// meaning the runner resolves its expected upstream set from the
/// workflow's connections rather than a type-level constant (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputCount {
  Fixed(usize),
  Dynamic,
}

/// UI/introspection metadata about a node type — no runtime behavior, but
/// part of the published node contract (§4.2) and useful for validation
/// tooling and the CLI's `describe` support.
#[derive(Debug, Clone, Default)]
pub struct NodeDescriptionMetadata {
  pub display_name: String,
  pub category: String,
  pub properties: Vec<(String, String)>,
}

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
  #[error("{0}")]
  Execution(String),
  #[error("workflow stop: {message}")]
  Stop { message: String, severity: StopSeverity },
  #[error("recursion limit exceeded at depth {0}")]
  RecursionLimit(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSeverity {
  Error,
  Warning,
}

/// What a node sees and may mutate during one call to `execute` (§3
/// "Lifecycles and Ownership"). This is a narrow slice of the engine's full
/// `ExecutionContext` — the node crate does not depend on `fuschia-engine`,
/// so the engine hands nodes this trait-level view instead.
#[async_trait]
pub trait NodeContext: Send + Sync {
  fn execution_id(&self) -> &str;
  fn mode(&self) -> &str;
  fn item_index(&self) -> usize;
  fn execution_depth(&self) -> usize;
  fn max_execution_depth(&self) -> usize;

  /// Resolve `{{ ... }}` templates in `value` against this call's item and
  /// prior node state, using `item_index()` (§4.3: top-level parameter
  /// resolution happens once, at item index 0).
  fn resolve(&self, value: &serde_json::Value) -> serde_json::Value {
    self.resolve_at(value, self.item_index())
  }

  /// Resolve `{{ ... }}` templates against a specific item index — nodes
  /// that evaluate a per-item expression (`Set`, `Filter`, `Switch`) need
  /// this rather than the fixed index `resolve` uses.
  fn resolve_at(&self, value: &serde_json::Value, item_index: usize) -> serde_json::Value;

  /// Subnode connections feeding `node_name`, for nodes that consult
  /// attached configuration (§9 "Subnode configuration plumbing").
  fn subnode_connections(&self, node_name: &str) -> Vec<Connection>;

  /// Read another node's last recorded output items, for nodes (like
  /// `Merge`) that need direct access beyond what `resolve` exposes.
  fn node_state(&self, node_name: &str) -> Option<Vec<Item>>;

  /// Per-node persistent state across repeated invocations in the same run
  /// (`Loop`, `SplitInBatches`). Keyed by the calling node's own name.
  fn internal_state(&self) -> Option<serde_json::Value>;
  fn set_internal_state(&self, value: serde_json::Value);
  fn clear_internal_state(&self);

  /// Set the HTTP response a `RespondToWebhook` node wants to send; only
  /// meaningful in `mode() == "webhook"`.
  fn set_webhook_response(&self, status_code: u16, body: Vec<u8>, headers: Vec<(String, String)>, content_type: Option<String>);

  fn http_client(&self) -> reqwest::Client;

  /// Run a referenced workflow as a sub-workflow, inheriting this
  /// execution's depth-tracking and client. Returns the sub-workflow's
  /// combined terminal output on success.
  async fn run_subworkflow(&self, workflow_id: &str, input: Vec<Item>) -> Result<serde_json::Value, NodeError>;
}

/// The node contract (§4.2): a type name, descriptive metadata, a declared
/// input arity, and an async execution entry point.
#[async_trait]
pub trait Node: Send + Sync {
  fn node_type(&self) -> &'static str;
  fn input_count(&self) -> InputCount;
  fn description_metadata(&self) -> NodeDescriptionMetadata;

  async fn execute(&self, ctx: &dyn NodeContext, node_definition: &NodeDefinition, input_items: &[Item]) -> Result<NodeExecutionResult, NodeError>;
}

/// Single-instance-per-type lookup (§4.2): node instances are stateless
/// (all mutable state lives in `NodeContext`/`ExecutionContext`), so one
/// `Arc<dyn Node>` per type is shared across every run.
#[derive(Default, Clone)]
pub struct NodeRegistry {
  nodes: BTreeMap<&'static str, Arc<dyn Node>>,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown node type: {0}")]
pub struct UnknownNodeType(pub String);

impl NodeRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&mut self, node: Arc<dyn Node>) {
    self.nodes.insert(node.node_type(), node);
  }

  pub fn get(&self, node_type: &str) -> Result<Arc<dyn Node>, UnknownNodeType> {
    self.nodes.get(node_type).cloned().ok_or_else(|| UnknownNodeType(node_type.to_string()))
  }

  pub fn has(&self, node_type: &str) -> bool {
    self.nodes.contains_key(node_type)
  }

  pub fn list(&self) -> Vec<&'static str> {
    self.nodes.keys().copied().collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Echo;

  #[async_trait]
  impl Node for Echo {
    fn node_type(&self) -> &'static str {
      "Echo"
    }
    fn input_count(&self) -> InputCount {
      InputCount::Fixed(1)
    }
    fn description_metadata(&self) -> NodeDescriptionMetadata {
      NodeDescriptionMetadata { display_name: "Echo".into(), category: "Transform".into(), properties: vec![] }
    }
    async fn execute(&self, _ctx: &dyn NodeContext, _def: &NodeDefinition, input_items: &[Item]) -> Result<NodeExecutionResult, NodeError> {
      Ok(NodeExecutionResult::with_main(input_items.to_vec()))
    }
  }

  #[test]
  fn registry_resolves_registered_type() {
    let mut registry = NodeRegistry::new();
    registry.register(Arc::new(Echo));
    assert!(registry.has("Echo"));
    assert!(registry.get("Echo").is_ok());
  }

  #[test]
  fn registry_reports_unknown_type() {
    let registry = NodeRegistry::new();
    assert!(registry.get("DoesNotExist").is_err());
  }

  #[test]
  fn no_output_is_distinct_from_empty_items() {
    let empty = PortOutput::Items(vec![]);
    let dead = PortOutput::NoOutput;
    assert!(!empty.is_no_output());
    assert!(dead.is_no_output());
    assert_eq!(empty.as_items(), Some(&[][..]));
    assert_eq!(dead.as_items(), None);
  }
}
