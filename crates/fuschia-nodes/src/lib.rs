//! Built-in node library (C4). `register_all` populates a
//! [`fuschia_node::NodeRegistry`] with every node type this crate
//! implements, mirroring `engine/node_registry.py`'s `register_all_nodes()`.

mod flow;
mod params;
mod triggers;
mod transform;

use std::sync::Arc;

use fuschia_node::NodeRegistry;

pub use flow::{evaluate_rule, ExecuteWorkflow, If, Loop, Merge, RespondToWebhook, SplitInBatches, StopAndError, Switch, Wait};
pub use transform::{Code, Filter, HttpRequest, ItemLists, Set};
pub use triggers::{ChatInput, Cron, ErrorTrigger, ExecuteWorkflowTrigger, Start, Webhook};

pub fn register_all(registry: &mut NodeRegistry) {
  registry.register(Arc::new(Start));
  registry.register(Arc::new(Webhook));
  registry.register(Arc::new(Cron));
  registry.register(Arc::new(ErrorTrigger));
  registry.register(Arc::new(ExecuteWorkflowTrigger));
  registry.register(Arc::new(ChatInput));

  registry.register(Arc::new(Set));
  registry.register(Arc::new(Filter));
  registry.register(Arc::new(ItemLists));
  registry.register(Arc::new(HttpRequest));
  registry.register(Arc::new(Code));

  registry.register(Arc::new(If));
  registry.register(Arc::new(Switch));
  registry.register(Arc::new(Merge));
  registry.register(Arc::new(Wait));
  registry.register(Arc::new(SplitInBatches));
  registry.register(Arc::new(Loop));
  registry.register(Arc::new(ExecuteWorkflow));
  registry.register(Arc::new(StopAndError));
  registry.register(Arc::new(RespondToWebhook));
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn registers_every_builtin_type() {
    let mut registry = NodeRegistry::new();
    register_all(&mut registry);
    for t in [
      "Start", "Webhook", "Cron", "ErrorTrigger", "ExecuteWorkflowTrigger", "ChatInput", "Set", "Filter", "ItemLists", "HttpRequest", "Code", "If",
      "Switch", "Merge", "Wait", "SplitInBatches", "Loop", "ExecuteWorkflow", "StopAndError", "RespondToWebhook",
    ] {
      assert!(registry.has(t), "missing node type {t}");
    }
  }
}
