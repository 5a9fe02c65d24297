//! Workflow management REST API (§6.2). Grounded on the donor pack's
//! `insanalamin-mechaway` `api::workflows` routes — same verb/path layout
//! (`POST/GET/PUT/DELETE /api/workflows[/:id]`), backed here by the
//! in-memory store instead of SQLite, plus an `/activate` toggle this
//! spec's webhook dispatch needs (§4.1: only active workflows are
//! webhook-reachable).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{delete, get, post, put};
use axum::Router;
use fuschia_workflow::Workflow;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::state::AppState;
use crate::store::StoreError;

#[derive(Debug, Serialize)]
struct WorkflowResponse {
  id: String,
  message: String,
}

#[derive(Debug, Deserialize)]
struct CreateWorkflowRequest {
  workflow: Workflow,
}

pub fn routes() -> Router<AppState> {
  Router::new()
    .route("/api/workflows", post(create_workflow))
    .route("/api/workflows", get(list_workflows))
    .route("/api/workflows/{id}", get(get_workflow))
    .route("/api/workflows/{id}", put(update_workflow))
    .route("/api/workflows/{id}", delete(delete_workflow))
    .route("/api/workflows/{id}/activate", post(activate_workflow))
    .route("/api/workflows/{id}/deactivate", post(deactivate_workflow))
}

fn status_for(err: &StoreError) -> StatusCode {
  match err {
    StoreError::AlreadyExists(_) => StatusCode::CONFLICT,
    StoreError::NotFound(_) => StatusCode::NOT_FOUND,
    StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
  }
}

async fn create_workflow(State(state): State<AppState>, Json(payload): Json<CreateWorkflowRequest>) -> Result<Json<WorkflowResponse>, StatusCode> {
  let workflow = payload.workflow;
  if workflow.id.is_empty() || workflow.name.is_empty() {
    return Err(StatusCode::BAD_REQUEST);
  }
  let name = workflow.name.clone();
  let id = workflow.id.clone();
  state.workflows.create(workflow).map_err(|e| {
    tracing::warn!("create_workflow failed: {e}");
    status_for(&e)
  })?;
  Ok(Json(WorkflowResponse { id, message: format!("workflow '{name}' created") }))
}

async fn list_workflows(State(state): State<AppState>) -> Json<Value> {
  let workflows: Vec<Value> = state
    .workflows
    .list()
    .into_iter()
    .map(|w| json!({ "id": w.id, "name": w.name, "active": w.active, "createdAt": w.created_at, "updatedAt": w.updated_at }))
    .collect();
  Json(json!({ "workflows": workflows }))
}

async fn get_workflow(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Workflow>, StatusCode> {
  state.workflows.get(&id).map(|w| Json(w.workflow)).ok_or(StatusCode::NOT_FOUND)
}

async fn update_workflow(State(state): State<AppState>, Path(id): Path<String>, Json(payload): Json<CreateWorkflowRequest>) -> Result<Json<WorkflowResponse>, StatusCode> {
  let mut workflow = payload.workflow;
  workflow.id = id.clone();
  let name = workflow.name.clone();
  state.workflows.update(&id, workflow).map_err(|e| status_for(&e))?;
  Ok(Json(WorkflowResponse { id, message: format!("workflow '{name}' updated") }))
}

async fn delete_workflow(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, StatusCode> {
  state.workflows.delete(&id).map_err(|e| status_for(&e))?;
  Ok(StatusCode::NO_CONTENT)
}

async fn activate_workflow(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<WorkflowResponse>, StatusCode> {
  state.workflows.set_active(&id, true).map_err(|e| status_for(&e))?;
  Ok(Json(WorkflowResponse { id: id.clone(), message: format!("workflow '{id}' activated") }))
}

async fn deactivate_workflow(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<WorkflowResponse>, StatusCode> {
  state.workflows.set_active(&id, false).map_err(|e| status_for(&e))?;
  Ok(Json(WorkflowResponse { id: id.clone(), message: format!("workflow '{id}' deactivated") }))
}
