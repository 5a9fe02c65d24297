//! Workflow repository interface (§6.1). The engine only ever needs `get`
//! (to resolve `ExecuteWorkflow`'s target); the richer CRUD surface lives
//! on top of this in `fuschia-webhook`, which also needs to list/create/
//! activate workflows for the HTTP surface.

use async_trait::async_trait;
use fuschia_workflow::Workflow;

#[derive(Debug, Clone)]
pub struct StoredWorkflow {
  pub id: String,
  pub name: String,
  pub workflow: Workflow,
  pub active: bool,
  pub created_at: chrono::DateTime<chrono::Utc>,
  pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
  async fn get(&self, id: &str) -> Option<StoredWorkflow>;
}
