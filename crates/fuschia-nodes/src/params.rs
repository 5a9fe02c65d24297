//! Small helpers for reading resolved node parameters out of the raw
//! `serde_json::Value` a [`fuschia_workflow::NodeDefinition`] carries.

use fuschia_node::NodeContext;
use serde_json::Value;

pub fn resolved(ctx: &dyn NodeContext, parameters: &Value) -> Value {
  ctx.resolve(parameters)
}

pub fn str_param(params: &Value, name: &str, default: &str) -> String {
  params.get(name).and_then(Value::as_str).map(str::to_string).unwrap_or_else(|| default.to_string())
}

pub fn bool_param(params: &Value, name: &str, default: bool) -> bool {
  params.get(name).and_then(Value::as_bool).unwrap_or(default)
}

pub fn u64_param(params: &Value, name: &str, default: u64) -> u64 {
  params.get(name).and_then(Value::as_u64).unwrap_or(default)
}

pub fn array_param<'a>(params: &'a Value, name: &str) -> &'a [Value] {
  params.get(name).and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}
