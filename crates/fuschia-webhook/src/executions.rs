//! In-memory execution repository (§6.2). Grounded on
//! `repositories/execution_repository.py`'s `start`/`complete`/`get`/
//! `list`/`delete`/`clear` surface and its max-record FIFO cap, collapsed
//! from a SQL-backed model into a `Mutex`-guarded `VecDeque` since this
//! crate has no database of its own (the same simplification `store.rs`
//! makes for workflows).

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use fuschia_engine::ErrorRecord;
use fuschia_value::Item;
use serde::Serialize;

const DEFAULT_MAX_RECORDS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
  Running,
  Success,
  Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
  pub id: String,
  pub workflow_id: String,
  pub workflow_name: String,
  pub status: ExecutionStatus,
  pub mode: String,
  pub start_time: DateTime<Utc>,
  pub end_time: Option<DateTime<Utc>>,
  pub node_data: BTreeMap<String, Vec<Item>>,
  pub errors: Vec<ErrorRecord>,
}

pub struct InMemoryExecutionStore {
  records: Mutex<VecDeque<ExecutionRecord>>,
  max_records: usize,
}

impl InMemoryExecutionStore {
  pub fn new(max_records: usize) -> Self {
    Self { records: Mutex::new(VecDeque::new()), max_records }
  }

  /// Create a `running` record when a workflow starts executing, then
  /// evict the oldest record(s) past `max_records` (FIFO, default 100).
  pub fn start(&self, execution_id: &str, workflow_id: &str, workflow_name: &str, mode: &str) -> ExecutionRecord {
    let record = ExecutionRecord {
      id: execution_id.to_string(),
      workflow_id: workflow_id.to_string(),
      workflow_name: workflow_name.to_string(),
      status: ExecutionStatus::Running,
      mode: mode.to_string(),
      start_time: Utc::now(),
      end_time: None,
      node_data: BTreeMap::new(),
      errors: Vec::new(),
    };
    let mut records = self.records.lock().unwrap();
    records.push_back(record.clone());
    while records.len() > self.max_records {
      records.pop_front();
    }
    record
  }

  /// Update a record with its final state (`success` if no errors were
  /// recorded, `failed` otherwise). Creates the record if `start` was
  /// never called for it, matching the original's "shouldn't happen
  /// normally, but don't lose the data" fallback.
  pub fn complete(&self, execution_id: &str, workflow_id: &str, workflow_name: &str, mode: &str, node_data: BTreeMap<String, Vec<Item>>, errors: Vec<ErrorRecord>) -> ExecutionRecord {
    let mut records = self.records.lock().unwrap();
    let status = if errors.is_empty() { ExecutionStatus::Success } else { ExecutionStatus::Failed };
    if let Some(existing) = records.iter_mut().find(|r| r.id == execution_id) {
      existing.status = status;
      existing.end_time = Some(Utc::now());
      existing.node_data = node_data;
      existing.errors = errors;
      return existing.clone();
    }
    let record = ExecutionRecord {
      id: execution_id.to_string(),
      workflow_id: workflow_id.to_string(),
      workflow_name: workflow_name.to_string(),
      status,
      mode: mode.to_string(),
      start_time: Utc::now(),
      end_time: Some(Utc::now()),
      node_data,
      errors,
    };
    records.push_back(record.clone());
    while records.len() > self.max_records {
      records.pop_front();
    }
    record
  }

  /// Mark a record `failed` with a single run-level error — used when the
  /// runner itself errors out before producing a `RunOutcome` (iteration
  /// limit, cancellation, validation failure).
  pub fn fail(&self, execution_id: &str, workflow_id: &str, workflow_name: &str, mode: &str, message: &str) -> ExecutionRecord {
    let error = ErrorRecord { node_name: String::new(), message: message.to_string(), timestamp: Utc::now() };
    self.complete(execution_id, workflow_id, workflow_name, mode, BTreeMap::new(), vec![error])
  }

  pub fn get(&self, execution_id: &str) -> Option<ExecutionRecord> {
    self.records.lock().unwrap().iter().find(|r| r.id == execution_id).cloned()
  }

  /// Most recent first, optionally filtered to one workflow.
  pub fn list(&self, workflow_id: Option<&str>) -> Vec<ExecutionRecord> {
    let records = self.records.lock().unwrap();
    let mut matching: Vec<ExecutionRecord> =
      records.iter().filter(|r| workflow_id.map(|id| r.workflow_id == id).unwrap_or(true)).cloned().collect();
    matching.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    matching
  }

  pub fn delete(&self, execution_id: &str) -> bool {
    let mut records = self.records.lock().unwrap();
    let before = records.len();
    records.retain(|r| r.id != execution_id);
    records.len() != before
  }

  pub fn clear(&self) {
    self.records.lock().unwrap().clear();
  }
}

impl Default for InMemoryExecutionStore {
  fn default() -> Self {
    Self::new(DEFAULT_MAX_RECORDS)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn start_then_complete_transitions_to_success() {
    let store = InMemoryExecutionStore::default();
    store.start("exec-1", "wf-1", "demo", "webhook");
    let record = store.complete("exec-1", "wf-1", "demo", "webhook", BTreeMap::new(), vec![]);
    assert_eq!(record.status, ExecutionStatus::Success);
    assert!(record.end_time.is_some());
  }

  #[test]
  fn complete_with_errors_is_failed() {
    let store = InMemoryExecutionStore::default();
    store.start("exec-1", "wf-1", "demo", "webhook");
    let error = ErrorRecord { node_name: "Hook".into(), message: "boom".into(), timestamp: Utc::now() };
    let record = store.complete("exec-1", "wf-1", "demo", "webhook", BTreeMap::new(), vec![error]);
    assert_eq!(record.status, ExecutionStatus::Failed);
  }

  #[test]
  fn fifo_eviction_caps_at_max_records() {
    let store = InMemoryExecutionStore::new(2);
    store.start("exec-1", "wf-1", "demo", "manual");
    store.start("exec-2", "wf-1", "demo", "manual");
    store.start("exec-3", "wf-1", "demo", "manual");
    let all = store.list(None);
    assert_eq!(all.len(), 2);
    assert!(store.get("exec-1").is_none());
    assert!(store.get("exec-3").is_some());
  }

  #[test]
  fn list_filters_by_workflow_id() {
    let store = InMemoryExecutionStore::default();
    store.start("exec-1", "wf-1", "a", "manual");
    store.start("exec-2", "wf-2", "b", "manual");
    assert_eq!(store.list(Some("wf-1")).len(), 1);
  }

  #[test]
  fn delete_removes_a_record() {
    let store = InMemoryExecutionStore::default();
    store.start("exec-1", "wf-1", "a", "manual");
    assert!(store.delete("exec-1"));
    assert!(store.get("exec-1").is_none());
    assert!(!store.delete("exec-1"));
  }
}
