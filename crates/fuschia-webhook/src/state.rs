use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use fuschia_engine::ExecutionEvent;
use fuschia_node::NodeRegistry;
use tokio::sync::broadcast;

use crate::executions::InMemoryExecutionStore;
use crate::store::InMemoryWorkflowStore;

/// Shared application state handed to every route (mirrors the donor's
/// `AppState`/`WebhookAppState` split, collapsed into one struct since this
/// crate has a single in-memory store rather than per-project databases).
#[derive(Clone)]
pub struct AppState {
  pub workflows: Arc<InMemoryWorkflowStore>,
  pub executions: Arc<InMemoryExecutionStore>,
  pub registry: Arc<NodeRegistry>,
  pub http_client: reqwest::Client,
  pub event_streams: Arc<Mutex<BTreeMap<String, broadcast::Sender<ExecutionEvent>>>>,
}

impl AppState {
  pub fn new() -> Self {
    let mut registry = NodeRegistry::new();
    fuschia_nodes::register_all(&mut registry);
    Self {
      workflows: Arc::new(InMemoryWorkflowStore::new()),
      executions: Arc::new(InMemoryExecutionStore::default()),
      registry: Arc::new(registry),
      http_client: reqwest::Client::new(),
      event_streams: Arc::new(Mutex::new(BTreeMap::new())),
    }
  }

  /// Register a broadcast channel for `execution_id` so `/executions/{id}/events`
  /// can stream it via SSE, and return a notifier that forwards into it.
  pub fn notifier_for(&self, execution_id: &str) -> Arc<dyn fuschia_engine::ExecutionNotifier> {
    let (tx, _rx) = broadcast::channel(256);
    self.event_streams.lock().unwrap().insert(execution_id.to_string(), tx.clone());
    Arc::new(BroadcastNotifier { sender: tx })
  }

  pub fn subscribe(&self, execution_id: &str) -> Option<broadcast::Receiver<ExecutionEvent>> {
    self.event_streams.lock().unwrap().get(execution_id).map(|tx| tx.subscribe())
  }
}

impl Default for AppState {
  fn default() -> Self {
    Self::new()
  }
}

struct BroadcastNotifier {
  sender: broadcast::Sender<ExecutionEvent>,
}

impl fuschia_engine::ExecutionNotifier for BroadcastNotifier {
  fn notify(&self, event: ExecutionEvent) {
    let _ = self.sender.send(event);
  }
}
