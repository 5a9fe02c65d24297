//! Dynamic webhook trigger dispatch (§4.1, §4.4, §6.2, §6.3). Grounded on
//! the donor pack's `insanalamin-mechaway` `execute_webhook` handler: look
//! the workflow up by path, build a trigger item from the request, run it,
//! and map the outcome to an HTTP response — generalized here to also
//! honor a `RespondToWebhook` node's captured response when one ran (§4.6),
//! and on the status-code contract and execution-record persistence from
//! `repositories/execution_repository.py` / `routes/webhooks.py`.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::any;
use axum::Router;
use fuschia_engine::{ExecutionContext, WorkflowRunner};
use fuschia_value::Item;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
  Router::new().route("/webhook/{workflow_id}/{*path}", any(execute_webhook))
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
  (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

async fn execute_webhook(State(state): State<AppState>, Path((workflow_id, path)): Path<(String, String)>, method: Method, headers: HeaderMap, body: Bytes) -> Response {
  let path = if path.starts_with('/') { path } else { format!("/{path}") };

  // §4.4 step 1: resolve the workflow; 404 if no workflow with this id
  // exists at all (regardless of whether it has a matching trigger).
  if state.workflows.get(&workflow_id).is_none() {
    return error_response(StatusCode::NOT_FOUND, format!("workflow '{workflow_id}' not found"));
  }

  // §4.4 step 2: find the Webhook node this path is bound to; its absence
  // (including "configured for a different path") is a 400, not a 404 —
  // the workflow exists, it just has no trigger reachable this way.
  let Some((stored, node)) = state.workflows.find_webhook_node(&workflow_id, &path) else {
    return error_response(StatusCode::BAD_REQUEST, "workflow has no Webhook trigger at this path");
  };
  let start_node = node.name.clone();

  // §6.3: inactive workflows are reachable by id but not triggerable.
  if !stored.active {
    return error_response(StatusCode::BAD_REQUEST, format!("workflow '{workflow_id}' is not active"));
  }

  let allowed_method = node.parameters.get("method").and_then(serde_json::Value::as_str).unwrap_or("POST").to_uppercase();
  if method.as_str() != allowed_method {
    return error_response(StatusCode::METHOD_NOT_ALLOWED, format!("method {method} not allowed for this webhook, expected {allowed_method}"));
  }

  let payload: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
  let header_map: serde_json::Value =
    serde_json::Value::Object(headers.iter().filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), serde_json::Value::String(v.to_string())))).collect());

  let trigger_item = Item::new(serde_json::json!({
    "body": payload,
    "headers": header_map,
    "method": method.as_str(),
    "path": path,
  }));

  let mut ctx = ExecutionContext::new("webhook", state.http_client.clone());
  ctx.workflow_repository = Some(state.workflows.clone());
  ctx.registry_for_subworkflow = Some(state.registry.clone());
  ctx.on_event = state.notifier_for(&ctx.execution_id);

  // §4.4 step 4 / §6.2: an execution record exists the moment a run
  // starts, independent of how it ends.
  state.executions.start(&ctx.execution_id, &stored.id, &stored.name, "webhook");

  let runner = WorkflowRunner::new(state.registry.clone());
  match runner.run_from(&stored.workflow, &start_node, vec![trigger_item], &ctx).await {
    Ok(outcome) => {
      state.executions.complete(&outcome.execution_id, &stored.id, &stored.name, "webhook", outcome.node_states.clone(), outcome.errors.clone());

      if let Some((status, body, resp_headers, content_type)) = outcome.webhook_response {
        let mut response = (StatusCode::from_u16(status).unwrap_or(StatusCode::OK), body).into_response();
        for (name, value) in resp_headers {
          if let (Ok(name), Ok(value)) = (axum::http::HeaderName::try_from(name), axum::http::HeaderValue::from_str(&value)) {
            response.headers_mut().insert(name, value);
          }
        }
        if let Some(content_type) = content_type {
          if let Ok(value) = axum::http::HeaderValue::from_str(&content_type) {
            response.headers_mut().insert(axum::http::header::CONTENT_TYPE, value);
          }
        }
        return response;
      }
      let sources: std::collections::BTreeSet<&str> = stored.workflow.connections.iter().map(|c| c.source_node.as_str()).collect();
      let targets: std::collections::BTreeSet<&str> = stored.workflow.connections.iter().map(|c| c.target_node.as_str()).collect();
      let terminal: Vec<&str> = sources.difference(&targets).copied().collect();
      let data: Vec<_> = if terminal.is_empty() {
        outcome.node_states.get(start_node.as_str()).cloned().unwrap_or_default()
      } else {
        terminal.iter().filter_map(|name| outcome.node_states.get(*name)).flatten().cloned().collect()
      };
      let status = if outcome.errors.is_empty() { "success" } else { "failed" };
      Json(serde_json::json!({ "status": status, "executionId": outcome.execution_id, "data": data })).into_response()
    }
    Err(err) => {
      tracing::error!("webhook execution failed for {workflow_id}: {err}");
      state.executions.fail(&ctx.execution_id, &stored.id, &stored.name, "webhook", &err.to_string());
      error_response(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
    }
  }
}

