//! Evaluation context built by the runner before each node invocation.

use std::collections::BTreeMap;

use fuschia_value::{Item, Value};

/// A prior node's recorded output, as seen from `$node["Name"]`: a map with
/// `json` (first item's json, for dot-traversal) and `data` (full item
/// list) — resolved per the open question in the design notes.
#[derive(Debug, Clone)]
pub struct NodeDataRef {
  pub json: Value,
  pub data: Vec<Value>,
}

impl NodeDataRef {
  pub fn from_items(items: &[Item]) -> Self {
    let json = items.first().map(|i| Value::from_json(&i.json)).unwrap_or(Value::Null);
    let data = items.iter().map(|i| Value::from_json(&i.json)).collect();
    Self { json, data }
  }

  pub fn as_value(&self) -> Value {
    Value::Map(BTreeMap::from([
      ("json".to_string(), self.json.clone()),
      ("data".to_string(), Value::List(self.data.clone())),
    ]))
  }
}

/// Everything an expression can see (§4.1).
#[derive(Debug, Clone)]
pub struct ExpressionContext {
  pub json_data: Value,
  pub input_data: Vec<Value>,
  pub node_data: BTreeMap<String, NodeDataRef>,
  pub env: BTreeMap<String, String>,
  pub execution_id: String,
  pub mode: String,
  pub item_index: usize,
}

impl ExpressionContext {
  pub fn new(input_data: &[Item], node_states: &BTreeMap<String, Vec<Item>>, execution_id: impl Into<String>, mode: impl Into<String>, item_index: usize) -> Self {
    let json_data = input_data.get(item_index).map(|i| Value::from_json(&i.json)).unwrap_or(Value::Null);
    let input_values = input_data.iter().map(|i| Value::from_json(&i.json)).collect();
    let node_data = node_states.iter().map(|(name, items)| (name.clone(), NodeDataRef::from_items(items))).collect();
    let env = std::env::vars().collect();
    Self { json_data, input_data: input_values, node_data, env, execution_id: execution_id.into(), mode: mode.into(), item_index }
  }
}
