//! Workflow data model (§3) and persisted JSON format (§6.5).
//!
//! Grounded on the donor's `fuschia-config`/`fuschia-workflow` crates
//! (`ComponentRef`, `Edge`, `WorkflowDef`/`NodeDef` tagged-enum shape) but
//! generalized: connections carry explicit `source_output`/`target_input`
//! port names and a `connection_type` (normal vs subnode) rather than a bare
//! two-field edge, and node definitions hold arbitrary JSON `parameters`
//! with embedded `{{ }}` expressions rather than a locked component
//! reference, since this engine dispatches to an in-process `Node` trait
//! (C3) instead of a WASM component.

use std::collections::BTreeSet;

use fuschia_value::Item;
use serde::{Deserialize, Serialize};

fn default_output() -> String {
  "main".to_string()
}

fn default_input() -> String {
  "main".to_string()
}

fn default_retry_delay_ms() -> u64 {
  1000
}

fn default_max_iterations() -> u32 {
  1000
}

/// A directed edge between two nodes' ports. `Subnode` connections attach
/// configuration providers (models, memory, tools) to a parent node rather
/// than carrying runtime data — the runner treats them as metadata, never
/// scheduling the subnode itself (§9 "Subnode configuration plumbing").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionType {
  #[default]
  Normal,
  Subnode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
  pub source_node: String,
  pub target_node: String,
  #[serde(default = "default_output")]
  pub source_output: String,
  #[serde(default = "default_input")]
  pub target_input: String,
  #[serde(default)]
  pub connection_type: ConnectionType,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub slot_name: Option<String>,
}

impl Connection {
  pub fn normal(source_node: impl Into<String>, target_node: impl Into<String>) -> Self {
    Self {
      source_node: source_node.into(),
      target_node: target_node.into(),
      source_output: default_output(),
      target_input: default_input(),
      connection_type: ConnectionType::Normal,
      slot_name: None,
    }
  }
}

/// The static declaration of a node inside a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
  pub name: String,
  #[serde(rename = "type")]
  pub node_type: String,
  #[serde(default = "default_parameters")]
  pub parameters: serde_json::Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub position: Option<(f64, f64)>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub pinned_data: Option<Vec<Item>>,
  #[serde(default)]
  pub retry_on_fail: u32,
  #[serde(default = "default_retry_delay_ms")]
  pub retry_delay_ms: u64,
  #[serde(default)]
  pub continue_on_fail: bool,
}

fn default_parameters() -> serde_json::Value {
  serde_json::json!({})
}

impl NodeDefinition {
  pub fn new(name: impl Into<String>, node_type: impl Into<String>, parameters: serde_json::Value) -> Self {
    Self {
      name: name.into(),
      node_type: node_type.into(),
      parameters,
      position: None,
      pinned_data: None,
      retry_on_fail: 0,
      retry_delay_ms: default_retry_delay_ms(),
      continue_on_fail: false,
    }
  }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorkflowSettings {
  #[serde(default = "default_max_iterations")]
  pub max_iterations: u32,
}

impl Default for WorkflowSettings {
  fn default() -> Self {
    Self { max_iterations: default_max_iterations() }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
  pub id: String,
  pub name: String,
  pub nodes: Vec<NodeDefinition>,
  pub connections: Vec<Connection>,
  #[serde(default)]
  pub settings: WorkflowSettings,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WorkflowValidationError {
  #[error("duplicate node name: {0}")]
  DuplicateNodeName(String),
  #[error("connection references unknown node: {0}")]
  UnknownConnectionEndpoint(String),
}

impl Workflow {
  /// Every connection's endpoints reference existing nodes; node names are
  /// unique (§3 Workflow invariants). Parameters are always JSON-serializable
  /// by construction (`serde_json::Value`), so that invariant needs no
  /// runtime check.
  pub fn validate(&self) -> Result<(), WorkflowValidationError> {
    let mut seen = BTreeSet::new();
    for node in &self.nodes {
      if !seen.insert(node.name.as_str()) {
        return Err(WorkflowValidationError::DuplicateNodeName(node.name.clone()));
      }
    }
    for conn in &self.connections {
      if !seen.contains(conn.source_node.as_str()) {
        return Err(WorkflowValidationError::UnknownConnectionEndpoint(conn.source_node.clone()));
      }
      if !seen.contains(conn.target_node.as_str()) {
        return Err(WorkflowValidationError::UnknownConnectionEndpoint(conn.target_node.clone()));
      }
    }
    Ok(())
  }

  pub fn node(&self, name: &str) -> Option<&NodeDefinition> {
    self.nodes.iter().find(|n| n.name == name)
  }

  /// Outbound normal connections leaving `(node, output)`.
  pub fn connections_from(&self, node: &str, output: &str) -> impl Iterator<Item = &Connection> {
    self.connections.iter().filter(move |c| c.connection_type == ConnectionType::Normal && c.source_node == node && c.source_output == output)
  }

  /// All distinct `(source_node, source_output)` pairs feeding `node`'s
  /// normal inputs — the expected-arrival set for a multi-input join.
  pub fn upstream_sources(&self, node: &str) -> BTreeSet<(String, String)> {
    self
      .connections
      .iter()
      .filter(|c| c.connection_type == ConnectionType::Normal && c.target_node == node)
      .map(|c| (c.source_node.clone(), c.source_output.clone()))
      .collect()
  }

  /// Subnode connections targeting `node`, grouped by slot — consulted by a
  /// parent node's `execute`, never scheduled (§9).
  pub fn subnode_connections(&self, node: &str) -> impl Iterator<Item = &Connection> {
    self.connections.iter().filter(move |c| c.connection_type == ConnectionType::Subnode && c.target_node == node)
  }

  /// Start-node heuristic (§4.3): prefer `Webhook` > `Cron` > `Start`,
  /// otherwise the first declared node.
  pub fn default_start_node(&self) -> Option<&NodeDefinition> {
    for preferred in ["Webhook", "Cron", "Start"] {
      if let Some(n) = self.nodes.iter().find(|n| n.node_type == preferred) {
        return Some(n);
      }
    }
    self.nodes.first()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> Workflow {
    Workflow {
      id: "wf-1".into(),
      name: "test".into(),
      nodes: vec![NodeDefinition::new("Start", "Start", serde_json::json!({})), NodeDefinition::new("Set1", "Set", serde_json::json!({}))],
      connections: vec![Connection::normal("Start", "Set1")],
      settings: WorkflowSettings::default(),
    }
  }

  #[test]
  fn validates_clean_workflow() {
    assert!(sample().validate().is_ok());
  }

  #[test]
  fn rejects_duplicate_node_names() {
    let mut wf = sample();
    wf.nodes.push(NodeDefinition::new("Start", "Start", serde_json::json!({})));
    assert_eq!(wf.validate(), Err(WorkflowValidationError::DuplicateNodeName("Start".into())));
  }

  #[test]
  fn rejects_dangling_connection() {
    let mut wf = sample();
    wf.connections.push(Connection::normal("Set1", "Missing"));
    assert_eq!(wf.validate(), Err(WorkflowValidationError::UnknownConnectionEndpoint("Missing".into())));
  }

  #[test]
  fn deserializes_persisted_json_with_defaults() {
    let json = serde_json::json!({
      "id": "wf-1",
      "name": "demo",
      "nodes": [{"name": "Start", "type": "Start", "parameters": {}}],
      "connections": []
    });
    let wf: Workflow = serde_json::from_value(json).unwrap();
    assert_eq!(wf.settings.max_iterations, 1000);
    assert_eq!(wf.nodes[0].retry_delay_ms, 1000);
    assert!(!wf.nodes[0].continue_on_fail);
  }

  #[test]
  fn default_start_node_prefers_webhook_over_start() {
    let wf = Workflow {
      id: "wf".into(),
      name: "n".into(),
      nodes: vec![NodeDefinition::new("Manual", "Start", serde_json::json!({})), NodeDefinition::new("Hook", "Webhook", serde_json::json!({}))],
      connections: vec![],
      settings: WorkflowSettings::default(),
    };
    assert_eq!(wf.default_start_node().unwrap().name, "Hook");
  }

  #[test]
  fn upstream_sources_collects_distinct_ports() {
    let wf = Workflow {
      id: "wf".into(),
      name: "n".into(),
      nodes: vec![
        NodeDefinition::new("If1", "If", serde_json::json!({})),
        NodeDefinition::new("Merge1", "Merge", serde_json::json!({})),
      ],
      connections: vec![
        Connection { source_output: "true".into(), target_input: "main".into(), ..Connection::normal("If1", "Merge1") },
        Connection { source_output: "false".into(), target_input: "main".into(), ..Connection::normal("If1", "Merge1") },
      ],
      settings: WorkflowSettings::default(),
    };
    assert_eq!(wf.upstream_sources("Merge1").len(), 2);
  }
}
