//! HTTP dispatcher (C7): webhook trigger routes, workflow CRUD, and the
//! execution event stream (C8). Grounded on the donor pack's
//! `insanalamin-mechaway` axum backend's route layout and `AppState`
//! shape — the only repo in the retrieval pack that runs an HTTP service.

mod executions;
mod routes;
mod state;
mod store;

pub use executions::{ExecutionRecord, ExecutionStatus, InMemoryExecutionStore};
pub use state::AppState;
pub use store::{InMemoryWorkflowStore, StoreError};

use axum::routing::get;
use axum::Router;

pub fn app(state: AppState) -> Router {
  Router::new()
    .route("/healthz", get(health_check))
    .merge(routes::workflows::routes())
    .merge(routes::webhook::routes())
    .merge(routes::events::routes())
    .with_state(state)
}

async fn health_check() -> &'static str {
  "ok"
}

#[cfg(test)]
mod tests {
  use axum::body::Body;
  use axum::http::{Request, StatusCode};
  use tower::ServiceExt;

  use super::*;

  #[tokio::test]
  async fn health_check_responds_ok() {
    let app = app(AppState::new());
    let response = app.oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn unknown_webhook_path_is_not_found() {
    let app = app(AppState::new());
    let response = app.oneshot(Request::builder().uri("/webhook/missing/in").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn create_and_fetch_workflow() {
    let app = app(AppState::new());
    let body = serde_json::json!({
      "workflow": {
        "id": "wf-1",
        "name": "demo",
        "nodes": [{"name": "Start", "type": "Start", "parameters": {}}],
        "connections": []
      }
    });
    let response = app
      .clone()
      .oneshot(Request::builder().method("POST").uri("/api/workflows").header("content-type", "application/json").body(Body::from(body.to_string())).unwrap())
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(Request::builder().uri("/api/workflows/wf-1").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
  }
}
