//! In-memory workflow repository (§6.1/§6.2). Grounded on the donor's
//! `axum-backend`-adjacent `WorkflowStorage`/`WorkflowRegistry` split
//! (`insanalamin-mechaway`) but collapsed into one `Mutex`-guarded store —
//! this crate has no persistence layer of its own, only the CRUD surface
//! `fuschia-engine::WorkflowRepository` needs plus the richer management
//! operations the HTTP API exposes.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use fuschia_engine::{StoredWorkflow, WorkflowRepository};
use fuschia_workflow::{NodeDefinition, Workflow, WorkflowValidationError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("workflow '{0}' already exists")]
  AlreadyExists(String),
  #[error("workflow '{0}' not found")]
  NotFound(String),
  #[error(transparent)]
  Invalid(#[from] WorkflowValidationError),
}

#[derive(Default)]
pub struct InMemoryWorkflowStore {
  workflows: Mutex<BTreeMap<String, StoredWorkflow>>,
}

impl InMemoryWorkflowStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn create(&self, workflow: Workflow) -> Result<StoredWorkflow, StoreError> {
    workflow.validate()?;
    let mut workflows = self.workflows.lock().unwrap();
    if workflows.contains_key(&workflow.id) {
      return Err(StoreError::AlreadyExists(workflow.id));
    }
    let now = chrono::Utc::now();
    let stored = StoredWorkflow { id: workflow.id.clone(), name: workflow.name.clone(), workflow, active: false, created_at: now, updated_at: now };
    workflows.insert(stored.id.clone(), stored.clone());
    Ok(stored)
  }

  pub fn get(&self, id: &str) -> Option<StoredWorkflow> {
    self.workflows.lock().unwrap().get(id).cloned()
  }

  pub fn list(&self) -> Vec<StoredWorkflow> {
    self.workflows.lock().unwrap().values().cloned().collect()
  }

  pub fn update(&self, id: &str, workflow: Workflow) -> Result<StoredWorkflow, StoreError> {
    workflow.validate()?;
    let mut workflows = self.workflows.lock().unwrap();
    let existing = workflows.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
    existing.name = workflow.name.clone();
    existing.workflow = workflow;
    existing.updated_at = chrono::Utc::now();
    Ok(existing.clone())
  }

  pub fn set_active(&self, id: &str, active: bool) -> Result<StoredWorkflow, StoreError> {
    let mut workflows = self.workflows.lock().unwrap();
    let existing = workflows.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
    existing.active = active;
    existing.updated_at = chrono::Utc::now();
    Ok(existing.clone())
  }

  pub fn delete(&self, id: &str) -> Result<(), StoreError> {
    self.workflows.lock().unwrap().remove(id).map(|_| ()).ok_or_else(|| StoreError::NotFound(id.to_string()))
  }

  /// Find the workflow with the given id and, within it, a `Webhook` node
  /// whose `path` parameter matches `path` — regardless of whether the
  /// workflow is active, so the caller can distinguish "no such trigger"
  /// (400) from "trigger exists but workflow is inactive" (400, but a
  /// different message) from "no such workflow at all" (404). Returns the
  /// workflow and the matching node so the caller can seed execution
  /// directly at it and inspect its configured method.
  pub fn find_webhook_node(&self, workflow_id: &str, path: &str) -> Option<(StoredWorkflow, NodeDefinition)> {
    let stored = self.get(workflow_id)?;
    for node in &stored.workflow.nodes {
      if node.node_type == "Webhook" {
        let configured = node.parameters.get("path").and_then(serde_json::Value::as_str).unwrap_or(&node.name);
        if configured == path {
          let node = node.clone();
          return Some((stored.clone(), node));
        }
      }
    }
    None
  }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowStore {
  async fn get(&self, id: &str) -> Option<StoredWorkflow> {
    InMemoryWorkflowStore::get(self, id)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use fuschia_workflow::{NodeDefinition, WorkflowSettings};

  fn sample(id: &str) -> Workflow {
    Workflow {
      id: id.to_string(),
      name: "test".into(),
      nodes: vec![NodeDefinition::new("Start", "Start", serde_json::json!({}))],
      connections: vec![],
      settings: WorkflowSettings::default(),
    }
  }

  #[test]
  fn create_then_get_round_trips() {
    let store = InMemoryWorkflowStore::new();
    store.create(sample("wf-1")).unwrap();
    assert!(store.get("wf-1").is_some());
  }

  #[test]
  fn create_twice_conflicts() {
    let store = InMemoryWorkflowStore::new();
    store.create(sample("wf-1")).unwrap();
    assert!(matches!(store.create(sample("wf-1")), Err(StoreError::AlreadyExists(_))));
  }

  #[test]
  fn find_webhook_node_matches_regardless_of_active_state() {
    let store = InMemoryWorkflowStore::new();
    let mut wf = sample("wf-1");
    wf.nodes.push(NodeDefinition::new("Hook", "Webhook", serde_json::json!({"path": "/in"})));
    store.create(wf).unwrap();
    let (stored, node) = store.find_webhook_node("wf-1", "/in").expect("trigger found even while inactive");
    assert!(!stored.active);
    assert_eq!(node.name, "Hook");
    store.set_active("wf-1", true).unwrap();
    assert!(store.find_webhook_node("wf-1", "/in").unwrap().0.active);
  }

  #[test]
  fn find_webhook_node_is_none_for_unknown_workflow_or_path() {
    let store = InMemoryWorkflowStore::new();
    let mut wf = sample("wf-1");
    wf.nodes.push(NodeDefinition::new("Hook", "Webhook", serde_json::json!({"path": "/in"})));
    store.create(wf).unwrap();
    assert!(store.find_webhook_node("wf-missing", "/in").is_none());
    assert!(store.find_webhook_node("wf-1", "/other").is_none());
  }
}
