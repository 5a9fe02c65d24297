//! Layered-BFS workflow runner (§3, §4). Grounded on the donor's
//! `crates/fuschia-engine/src/{engine.rs,runner.rs}` `find_ready_nodes` /
//! `execute_ready_nodes` / `run_execution_loop` shape, generalized from a
//! WASM-component dispatch loop into one that calls `fuschia_node::Node`
//! in-process and understands multi-port outputs, `NO_OUTPUT`, joins, and
//! loop-edge `run_index` bumps.
//!
//! One layer = every job ready to run at once. Jobs within a layer run
//! concurrently via `futures::future::join_all` over borrowing futures
//! (no `tokio::spawn`, so `JobNodeContext`'s borrow of `ExecutionContext`
//! and `Workflow` needs no `Arc`/`'static` bound); cancellation is checked
//! between layers and raced against the layer's join via `tokio::select!`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use fuschia_node::{NodeContext, NodeError, NodeExecutionResult, NodeRegistry, PortOutput, StopSeverity};
use fuschia_value::Item;
use fuschia_workflow::Workflow;
use tokio_util::sync::CancellationToken;

use crate::context::{ExecutionContext, JobNodeContext};
use crate::error::ExecutionError;
use crate::events::ExecutionEvent;
use crate::job::ExecutionJob;

/// The outcome of a completed run: the final state of every node that
/// executed, plus any non-fatal per-node errors recorded along the way
/// (§7 "continue-on-fail still surfaces the failure").
#[derive(Debug, Clone)]
pub struct RunOutcome {
  pub execution_id: String,
  pub node_states: BTreeMap<String, Vec<Item>>,
  pub errors: Vec<crate::error::ErrorRecord>,
  pub webhook_response: Option<(u16, Vec<u8>, Vec<(String, String)>, Option<String>)>,
}

pub struct WorkflowRunner {
  pub registry: Arc<NodeRegistry>,
  pub cancellation: CancellationToken,
}

impl WorkflowRunner {
  pub fn new(registry: Arc<NodeRegistry>) -> Self {
    Self { registry, cancellation: CancellationToken::new() }
  }

  /// Run `workflow` from its default start node with `trigger_items` as the
  /// seed input (§4.1 "Triggering"). `execution` carries mode, depth, the
  /// HTTP client, and the event sink for this run.
  pub async fn run(&self, workflow: &Workflow, trigger_items: Vec<Item>, execution: &ExecutionContext) -> Result<RunOutcome, ExecutionError> {
    let start = workflow.default_start_node().ok_or_else(|| ExecutionError::Validation("workflow has no nodes".to_string()))?;
    self.run_from(workflow, &start.name.clone(), trigger_items, execution).await
  }

  /// Run `workflow`, seeding the first layer at `start_node` rather than
  /// the default-start heuristic — used by webhook dispatch, where the
  /// triggering node is whichever `Webhook` node's path matched the
  /// request, not necessarily the workflow's first declared node.
  pub async fn run_from(&self, workflow: &Workflow, start_node: &str, trigger_items: Vec<Item>, execution: &ExecutionContext) -> Result<RunOutcome, ExecutionError> {
    execution.emit(ExecutionEvent::ExecutionStart { execution_id: execution.execution_id.clone(), timestamp: execution.start_time });

    if workflow.node(start_node).is_none() {
      return Err(ExecutionError::NotFound(start_node.to_string()));
    }
    let mut layer = vec![ExecutionJob::new(start_node, trigger_items, 0)];
    let mut iterations: u32 = 0;

    tracing::info!(execution_id = %execution.execution_id, start_node, "execution starting");
    let result = self.drive(workflow, execution, &mut layer, &mut iterations).await;

    match &result {
      Ok(()) => {
        tracing::info!(execution_id = %execution.execution_id, "execution complete");
        execution.emit(ExecutionEvent::ExecutionComplete {
          execution_id: execution.execution_id.clone(),
          timestamp: chrono::Utc::now(),
          progress: execution.progress(),
        });
      }
      Err(e) => {
        tracing::error!(execution_id = %execution.execution_id, error = %e, "execution failed");
        execution.emit(ExecutionEvent::ExecutionError { execution_id: execution.execution_id.clone(), timestamp: chrono::Utc::now(), error: e.to_string() });
      }
    }

    result.map(|()| RunOutcome {
      execution_id: execution.execution_id.clone(),
      node_states: execution.node_states_snapshot(),
      errors: execution.errors(),
      webhook_response: execution.webhook_response(),
    })
  }

  async fn drive(&self, workflow: &Workflow, execution: &ExecutionContext, layer: &mut Vec<ExecutionJob>, iterations: &mut u32) -> Result<(), ExecutionError> {
    while !layer.is_empty() {
      *iterations += 1;
      if *iterations > workflow.settings.max_iterations {
        return Err(ExecutionError::IterationLimit(workflow.settings.max_iterations));
      }

      let futures = layer.drain(..).map(|job| self.run_job(workflow, execution, job));

      let joined = tokio::select! {
        biased;
        _ = self.cancellation.cancelled() => return Err(ExecutionError::Cancelled),
        results = futures::future::join_all(futures) => results,
      };

      let mut next_layer = Vec::new();
      for outcome in joined {
        let (node_name, run_index, result) = outcome?;
        self.propagate(workflow, execution, &node_name, run_index, result, &mut next_layer);
      }
      *layer = next_layer;
    }
    Ok(())
  }

  /// Execute one job, applying `retry_on_fail`/`retry_delay_ms` and
  /// `continue_on_fail` (§4.4 "Retries"). Returns the node name, the job's
  /// `run_index` (unchanged by this call), and its result.
  async fn run_job(&self, workflow: &Workflow, execution: &ExecutionContext, job: ExecutionJob) -> Result<(String, u32, NodeExecutionResult), ExecutionError> {
    let node_definition = workflow.node(&job.node_name).ok_or_else(|| ExecutionError::NotFound(job.node_name.clone()))?;
    let node = self.registry.get(&node_definition.node_type)?;

    execution.emit(ExecutionEvent::NodeStart {
      execution_id: execution.execution_id.clone(),
      node_name: job.node_name.clone(),
      node_type: node_definition.node_type.clone(),
      timestamp: chrono::Utc::now(),
      subworkflow_parent_node: None,
      subworkflow_id: None,
    });

    let attempts = node_definition.retry_on_fail as usize + 1;
    let mut last_err: Option<NodeError> = None;

    for attempt in 0..attempts {
      if attempt > 0 {
        tokio::time::sleep(Duration::from_millis(node_definition.retry_delay_ms)).await;
      }
      let ctx = JobNodeContext { execution, workflow, node_name: job.node_name.clone(), item_index: 0, input_items: job.input_items.clone() };

      match node.execute(&ctx, node_definition, &job.input_items).await {
        Ok(result) => {
          execution.record_node_state(&job.node_name, flatten(&result));
          execution.emit(ExecutionEvent::NodeComplete {
            execution_id: execution.execution_id.clone(),
            node_name: job.node_name.clone(),
            node_type: node_definition.node_type.clone(),
            timestamp: chrono::Utc::now(),
            subworkflow_parent_node: None,
            subworkflow_id: None,
          });
          return Ok((job.node_name, job.run_index, result));
        }
        Err(err @ NodeError::Stop { .. }) => {
          // A deliberate stop is not a failure to retry; surface it directly.
          last_err = Some(err);
          break;
        }
        Err(err) => {
          tracing::warn!(node = %job.node_name, attempt, error = %err, "node attempt failed");
          last_err = Some(err);
        }
      }
    }

    let err = last_err.expect("loop runs at least once");

    if node_definition.continue_on_fail && !matches!(err, NodeError::Stop { .. }) {
      let message = err.to_string();
      execution.record_error(&job.node_name, &message);
      let synthesized: Vec<Item> = job
        .input_items
        .iter()
        .map(|item| {
          let mut json = item.json.clone();
          if let serde_json::Value::Object(m) = &mut json {
            m.insert("error".to_string(), serde_json::Value::String(message.clone()));
            m.insert("_errorNode".to_string(), serde_json::Value::String(job.node_name.clone()));
          }
          Item::new(json)
        })
        .collect();
      let result = NodeExecutionResult::with_main(synthesized);
      execution.record_node_state(&job.node_name, flatten(&result));
      return Ok((job.node_name, job.run_index, result));
    }

    execution.emit(ExecutionEvent::NodeError {
      execution_id: execution.execution_id.clone(),
      node_name: job.node_name.clone(),
      node_type: node_definition.node_type.clone(),
      error: err.to_string(),
      timestamp: chrono::Utc::now(),
      subworkflow_parent_node: None,
      subworkflow_id: None,
    });
    execution.record_error(&job.node_name, &err.to_string());

    if let NodeError::Stop { severity: StopSeverity::Warning, .. } = &err {
      // A warning-grade stop ends this branch without failing the run.
      return Ok((job.node_name, job.run_index, NodeExecutionResult::new()));
    }

    Err(ExecutionError::from_node_error(&job.node_name, err))
  }

  /// Fan a completed job's port outputs out to downstream jobs, applying
  /// join bookkeeping for multi-input nodes and the `NO_OUTPUT` scheduling
  /// rule for single-input ones (§3 "Join", §9).
  ///
  /// Whether a target node joins is decided by its *declared* input arity
  /// (`InputCount`), not by how many edges happen to reach it: a `Fixed(1)`
  /// node like `Loop` commonly has two incoming edges (its initial trigger
  /// and its own loop-back output), but those never arrive at the same
  /// `run_index` — gating on topology alone would deadlock waiting for a
  /// source that will never fire again at that index. Only nodes whose
  /// contract calls for synchronizing more than one named input (`Dynamic`,
  /// or a declared `Fixed(n > 1)`) go through the join path.
  fn propagate(&self, workflow: &Workflow, execution: &ExecutionContext, node_name: &str, run_index: u32, result: NodeExecutionResult, next_layer: &mut Vec<ExecutionJob>) {
    for (port_name, output) in &result.ports {
      let next_run_index = if port_name == "loop" { run_index + 1 } else { run_index };

      for conn in workflow.connections_from(node_name, port_name) {
        let joins = workflow
          .node(&conn.target_node)
          .and_then(|def| self.registry.get(&def.node_type).ok())
          .map(|node| !matches!(node.input_count(), fuschia_node::InputCount::Fixed(n) if n <= 1))
          .unwrap_or(false);

        if !joins {
          if let Some(items) = output.as_items() {
            next_layer.push(ExecutionJob::new(conn.target_node.clone(), items.to_vec(), next_run_index));
          }
          continue;
        }

        let expected = workflow.upstream_sources(&conn.target_node);
        let source_key = format!("{node_name}:{port_name}");
        if let Some(items) = execution.join_arrival(&conn.target_node, next_run_index, source_key, output.clone(), &expected) {
          next_layer.push(ExecutionJob::new(conn.target_node.clone(), items, next_run_index));
        }
      }
    }
  }
}

fn flatten(result: &NodeExecutionResult) -> Vec<Item> {
  result.ports.get(fuschia_node::MAIN_PORT).and_then(PortOutput::as_items).map(<[Item]>::to_vec).unwrap_or_else(|| {
    result.ports.values().filter_map(PortOutput::as_items).flat_map(<[Item]>::to_vec).collect()
  })
}

/// Run a referenced workflow to completion as a sub-workflow (§4.6
/// "ExecuteWorkflow"), sharing the parent's node registry, HTTP client, and
/// (wrapped) event notifier so sub-workflow events are tagged per §4.5.
pub async fn run_subworkflow(
  workflow: &Workflow,
  input: Vec<Item>,
  parent: &ExecutionContext,
  parent_node: &str,
  workflow_id: &str,
) -> Result<ExecutionContext, NodeError> {
  let mut child = parent.child("subworkflow");
  child.on_event = Arc::new(crate::events::SubworkflowTaggingNotifier::new(parent.on_event.clone(), parent_node.to_string(), workflow_id.to_string()));

  let runner = WorkflowRunner::new(
    parent
      .registry_for_subworkflow
      .clone()
      .expect("sub-workflow execution requires a registry; see ExecutionContext::registry_for_subworkflow"),
  );
  runner.run(workflow, input, &child).await.map_err(|e| NodeError::Execution(e.to_string()))?;
  Ok(child)
}
