//! Transform nodes (§4.2). Grounded on `nodes/data/set_node.py`,
//! `nodes/filter.py`, `nodes/core/item_lists.py`,
//! `nodes/integrations/http_request.py`. `Code` is deliberately scoped down
//! to an expression-only variant (SPEC_FULL.md §C) rather than a general
//! scripting runtime.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use fuschia_node::{InputCount, Node, NodeContext, NodeDescriptionMetadata, NodeError, NodeExecutionResult};
use fuschia_value::Item;
use fuschia_workflow::NodeDefinition;

use crate::flow::evaluate_rule;
use crate::params::{array_param, resolved, str_param};

fn get_nested<'a>(obj: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
  if path.is_empty() {
    return Some(obj);
  }
  let mut current = obj;
  for key in path.split('.') {
    current = current.get(key)?;
  }
  Some(current)
}

fn set_nested(obj: &mut serde_json::Value, path: &str, value: serde_json::Value) {
  let parts: Vec<&str> = path.split('.').collect();
  let mut current = obj;
  for key in &parts[..parts.len() - 1] {
    if !current.get(*key).map(serde_json::Value::is_object).unwrap_or(false) {
      if let serde_json::Value::Object(m) = current {
        m.insert(key.to_string(), serde_json::json!({}));
      }
    }
    current = current.get_mut(*key).unwrap();
  }
  if let serde_json::Value::Object(m) = current {
    m.insert(parts[parts.len() - 1].to_string(), value);
  }
}

fn delete_nested(obj: &mut serde_json::Value, path: &str) {
  let parts: Vec<&str> = path.split('.').collect();
  let mut current = obj;
  for key in &parts[..parts.len() - 1] {
    match current.get_mut(*key) {
      Some(next) => current = next,
      None => return,
    }
  }
  if let serde_json::Value::Object(m) = current {
    m.remove(parts[parts.len() - 1]);
  }
}

/// Set, rename, or delete fields on each item.
pub struct Set;

#[async_trait]
impl Node for Set {
  fn node_type(&self) -> &'static str {
    "Set"
  }
  fn input_count(&self) -> InputCount {
    InputCount::Fixed(1)
  }
  fn description_metadata(&self) -> NodeDescriptionMetadata {
    NodeDescriptionMetadata { display_name: "Set".into(), category: "Transform".into(), properties: vec![] }
  }
  async fn execute(&self, ctx: &dyn NodeContext, def: &NodeDefinition, input_items: &[Item]) -> Result<NodeExecutionResult, NodeError> {
    let items: Vec<Item> = if input_items.is_empty() { vec![Item::new(serde_json::json!({}))] } else { input_items.to_vec() };
    let mut results = Vec::with_capacity(items.len());

    for (idx, item) in items.iter().enumerate() {
      let params = ctx.resolve_at(&def.parameters, idx);
      let mode = str_param(&params, "mode", "manual");
      let keep_only_set = params.get("keepOnlySet").and_then(serde_json::Value::as_bool).unwrap_or(false);

      let mut new_json = if keep_only_set { serde_json::json!({}) } else { item.json.clone() };

      if mode == "manual" {
        for field in array_param(&params, "fields") {
          if let Some(name) = field.get("name").and_then(serde_json::Value::as_str) {
            if !name.is_empty() {
              let value = field.get("value").cloned().unwrap_or(serde_json::Value::String(String::new()));
              set_nested(&mut new_json, name, value);
            }
          }
        }
      } else if mode == "json" {
        if let Some(json_data) = params.get("jsonData") {
          if let serde_json::Value::Object(incoming) = json_data {
            if let serde_json::Value::Object(target) = &mut new_json {
              for (k, v) in incoming {
                target.insert(k.clone(), v.clone());
              }
            }
          }
        }
      }

      for field in array_param(&params, "deleteFields") {
        let path = field.get("path").and_then(serde_json::Value::as_str).or_else(|| field.as_str());
        if let Some(path) = path {
          if !path.is_empty() {
            delete_nested(&mut new_json, path);
          }
        }
      }

      for rename in array_param(&params, "renameFields") {
        let from = rename.get("from").and_then(serde_json::Value::as_str).unwrap_or("");
        let to = rename.get("to").and_then(serde_json::Value::as_str).unwrap_or("");
        if !from.is_empty() && !to.is_empty() {
          if let Some(value) = get_nested(&new_json, from).cloned() {
            delete_nested(&mut new_json, from);
            set_nested(&mut new_json, to, value);
          }
        }
      }

      results.push(Item { json: new_json, binary: item.binary.clone() });
    }

    Ok(NodeExecutionResult::with_main(results))
  }
}

/// Passes through only items matching a rule or expression condition
/// (single output, no branching — unlike `If`/`Switch`).
pub struct Filter;

#[async_trait]
impl Node for Filter {
  fn node_type(&self) -> &'static str {
    "Filter"
  }
  fn input_count(&self) -> InputCount {
    InputCount::Fixed(1)
  }
  fn description_metadata(&self) -> NodeDescriptionMetadata {
    NodeDescriptionMetadata { display_name: "Filter".into(), category: "Transform".into(), properties: vec![] }
  }
  async fn execute(&self, ctx: &dyn NodeContext, def: &NodeDefinition, input_items: &[Item]) -> Result<NodeExecutionResult, NodeError> {
    let mut kept = Vec::new();
    for (idx, item) in input_items.iter().enumerate() {
      let params = ctx.resolve_at(&def.parameters, idx);
      let mode = str_param(&params, "mode", "rules");
      let matches = if mode == "expression" {
        json_truthy(params.get("condition").unwrap_or(&serde_json::Value::Null))
      } else {
        let field = str_param(&params, "field", "");
        let operation = str_param(&params, "operation", "isNotEmpty");
        let compare = params.get("value").cloned().unwrap_or(serde_json::Value::Null);
        let field_value = get_nested(&item.json, &field).cloned().unwrap_or(serde_json::Value::Null);
        evaluate_rule(&field_value, &operation, &compare)
      };
      if matches {
        kept.push(item.clone());
      }
    }
    Ok(NodeExecutionResult::with_main(kept))
  }
}

/// `condition` has already been evaluated by `ctx.resolve_at` — a pure
/// `{{ }}` template preserves its evaluated type, so a boolean condition
/// arrives as a JSON boolean rather than the string `"true"`/`"false"`.
fn json_truthy(v: &serde_json::Value) -> bool {
  match v {
    serde_json::Value::Bool(b) => *b,
    serde_json::Value::Null => false,
    serde_json::Value::String(s) => !s.is_empty() && s != "false" && s != "0",
    serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
    serde_json::Value::Array(a) => !a.is_empty(),
    serde_json::Value::Object(o) => !o.is_empty(),
  }
}

/// List-shaping operations: sort, limit, removeDuplicates, splitOut,
/// concatenate. `aggregate`/`summarize` are left for a future addition —
/// they require a grouping key model this port-per-output shape doesn't
/// need yet.
pub struct ItemLists;

#[async_trait]
impl Node for ItemLists {
  fn node_type(&self) -> &'static str {
    "ItemLists"
  }
  fn input_count(&self) -> InputCount {
    InputCount::Fixed(1)
  }
  fn description_metadata(&self) -> NodeDescriptionMetadata {
    NodeDescriptionMetadata { display_name: "Item Lists".into(), category: "Transform".into(), properties: vec![] }
  }
  async fn execute(&self, ctx: &dyn NodeContext, def: &NodeDefinition, input_items: &[Item]) -> Result<NodeExecutionResult, NodeError> {
    let params = resolved(ctx, &def.parameters);
    let operation = str_param(&params, "operation", "sort");
    let items = input_items.to_vec();

    let out = match operation.as_str() {
      "sort" => {
        let field = str_param(&params, "field", "");
        let descending = str_param(&params, "order", "ascending") == "descending";
        let mut sorted = items;
        sorted.sort_by(|a, b| {
          let av = get_nested(&a.json, &field).cloned().unwrap_or(serde_json::Value::Null);
          let bv = get_nested(&b.json, &field).cloned().unwrap_or(serde_json::Value::Null);
          compare_json(&av, &bv)
        });
        if descending {
          sorted.reverse();
        }
        sorted
      }
      "limit" => {
        let max_items = params.get("maxItems").and_then(serde_json::Value::as_u64).unwrap_or(1) as usize;
        items.into_iter().take(max_items).collect()
      }
      "removeDuplicates" => {
        let field = str_param(&params, "field", "");
        let mut seen = HashSet::new();
        items
          .into_iter()
          .filter(|i| {
            let key = if field.is_empty() { i.json.to_string() } else { get_nested(&i.json, &field).cloned().unwrap_or(serde_json::Value::Null).to_string() };
            seen.insert(key)
          })
          .collect()
      }
      "splitOut" => {
        let field = str_param(&params, "field", "");
        items
          .into_iter()
          .flat_map(|i| match get_nested(&i.json, &field) {
            Some(serde_json::Value::Array(arr)) => arr.iter().cloned().map(Item::new).collect::<Vec<_>>(),
            _ => vec![],
          })
          .collect()
      }
      "concatenate" => {
        let field = str_param(&params, "field", "");
        let combined: Vec<serde_json::Value> = items.iter().filter_map(|i| get_nested(&i.json, &field).cloned()).collect();
        vec![Item::new(serde_json::Value::Array(combined))]
      }
      _ => items,
    };

    Ok(NodeExecutionResult::with_main(out))
  }
}

fn compare_json(a: &serde_json::Value, b: &serde_json::Value) -> std::cmp::Ordering {
  match (a, b) {
    (serde_json::Value::Number(x), serde_json::Value::Number(y)) => {
      x.as_f64().unwrap_or(0.0).partial_cmp(&y.as_f64().unwrap_or(0.0)).unwrap_or(std::cmp::Ordering::Equal)
    }
    (serde_json::Value::String(x), serde_json::Value::String(y)) => x.cmp(y),
    _ => a.to_string().cmp(&b.to_string()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn set_nested_creates_intermediate_objects() {
    let mut obj = serde_json::json!({});
    set_nested(&mut obj, "user.name", serde_json::json!("ada"));
    assert_eq!(obj, serde_json::json!({"user": {"name": "ada"}}));
  }

  #[test]
  fn delete_nested_removes_leaf_only() {
    let mut obj = serde_json::json!({"user": {"name": "ada", "age": 30}});
    delete_nested(&mut obj, "user.age");
    assert_eq!(obj, serde_json::json!({"user": {"name": "ada"}}));
  }

  #[test]
  fn delete_nested_missing_path_is_a_noop() {
    let mut obj = serde_json::json!({"user": {"name": "ada"}});
    delete_nested(&mut obj, "user.missing.deeper");
    assert_eq!(obj, serde_json::json!({"user": {"name": "ada"}}));
  }

  #[test]
  fn json_truthy_matches_falsy_strings() {
    assert!(!json_truthy(&serde_json::json!("false")));
    assert!(!json_truthy(&serde_json::json!("0")));
    assert!(json_truthy(&serde_json::json!("no")));
    assert!(!json_truthy(&serde_json::Value::Null));
  }

  #[test]
  fn compare_json_orders_numbers_numerically() {
    assert_eq!(compare_json(&serde_json::json!(2), &serde_json::json!(10)), std::cmp::Ordering::Less);
  }
}

/// Makes an outbound HTTP request per item using the context's shared
/// client (§5 "one HTTP client per run").
pub struct HttpRequest;

#[async_trait]
impl Node for HttpRequest {
  fn node_type(&self) -> &'static str {
    "HttpRequest"
  }
  fn input_count(&self) -> InputCount {
    InputCount::Fixed(1)
  }
  fn description_metadata(&self) -> NodeDescriptionMetadata {
    NodeDescriptionMetadata { display_name: "HTTP Request".into(), category: "Transform".into(), properties: vec![] }
  }
  async fn execute(&self, ctx: &dyn NodeContext, def: &NodeDefinition, input_items: &[Item]) -> Result<NodeExecutionResult, NodeError> {
    let items: Vec<Item> = if input_items.is_empty() { vec![Item::new(serde_json::json!({}))] } else { input_items.to_vec() };
    let client = ctx.http_client();
    let mut results = Vec::with_capacity(items.len());

    for (idx, _item) in items.iter().enumerate() {
      let params = ctx.resolve_at(&def.parameters, idx);
      let method = str_param(&params, "method", "GET");
      let url = str_param(&params, "url", "");
      let response_type = str_param(&params, "responseType", "json");

      let mut builder = client
        .request(method.parse().map_err(|_| NodeError::Execution(format!("invalid HTTP method: {method}")))?, &url)
        .timeout(Duration::from_secs(30));

      for header in array_param(&params, "headers") {
        let name = header.get("name").and_then(serde_json::Value::as_str).unwrap_or("");
        let value = header.get("value").and_then(serde_json::Value::as_str).unwrap_or("");
        if !name.is_empty() {
          builder = builder.header(name, value);
        }
      }

      if matches!(method.as_str(), "POST" | "PUT" | "PATCH") {
        if let Some(body) = params.get("body") {
          builder = builder.json(body);
        }
      }

      let response = builder.send().await.map_err(|e| NodeError::Execution(format!("HTTP request failed: {e}")))?;
      let status_code = response.status().as_u16();
      let headers: serde_json::Map<String, serde_json::Value> =
        response.headers().iter().map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_str().unwrap_or("").to_string()))).collect();

      let body = if response_type == "text" {
        serde_json::Value::String(response.text().await.unwrap_or_default())
      } else {
        let text = response.text().await.unwrap_or_default();
        serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
      };

      results.push(Item::new(serde_json::json!({
        "statusCode": status_code,
        "headers": headers,
        "body": body,
      })));
    }

    Ok(NodeExecutionResult::with_main(results))
  }
}

/// Scoped-down `Code` node: evaluates one expression per item against
/// `$json`, rather than hosting a general scripting runtime (SPEC_FULL.md
/// §C explains the scoping rationale).
pub struct Code;

#[async_trait]
impl Node for Code {
  fn node_type(&self) -> &'static str {
    "Code"
  }
  fn input_count(&self) -> InputCount {
    InputCount::Fixed(1)
  }
  fn description_metadata(&self) -> NodeDescriptionMetadata {
    NodeDescriptionMetadata { display_name: "Code".into(), category: "Transform".into(), properties: vec![] }
  }
  async fn execute(&self, ctx: &dyn NodeContext, def: &NodeDefinition, input_items: &[Item]) -> Result<NodeExecutionResult, NodeError> {
    let mut results = Vec::with_capacity(input_items.len());
    for (idx, item) in input_items.iter().enumerate() {
      let params = ctx.resolve_at(&def.parameters, idx);
      let expression = str_param(&params, "expression", "{{ $json }}");
      let resolved_value = ctx.resolve_at(&serde_json::Value::String(expression), idx);
      results.push(Item { json: resolved_value, binary: item.binary.clone() });
    }
    Ok(NodeExecutionResult::with_main(results))
  }
}
