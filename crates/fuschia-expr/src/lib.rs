//! Safe, sandboxed expression engine (C2).
//!
//! Resolves `{{ ... }}` templates embedded in workflow node parameters
//! against the current item, prior node outputs, environment, and execution
//! metadata. The grammar and function surface are closed by construction
//! (see [`ast`]) — there is no escape hatch to host-language code, dynamic
//! attribute lookup, or I/O.

mod ast;
mod context;
mod eval;
mod functions;
mod lexer;

pub use ast::{BinOp, Expr, ParseError};
pub use context::{ExpressionContext, NodeDataRef};
pub use eval::EvalError;

use fuschia_value::Value;

/// One `{{ ... }}` occurrence found in a template string.
struct Match {
  start: usize,
  end: usize,
  source: String,
}

fn find_matches(template: &str) -> Vec<Match> {
  let mut matches = Vec::new();
  let bytes = template.as_bytes();
  let mut i = 0;
  while i + 1 < bytes.len() {
    if bytes[i] == b'{' && bytes[i + 1] == b'{' {
      if let Some(close) = template[i + 2..].find("}}") {
        let end = i + 2 + close + 2;
        let source = template[i + 2..i + 2 + close].trim().to_string();
        matches.push(Match { start: i, end, source });
        i = end;
        continue;
      }
    }
    i += 1;
  }
  matches
}

fn is_pure_template(template: &str, matches: &[Match]) -> bool {
  matches.len() == 1 && matches[0].start == 0 && matches[0].end == template.len()
}

fn try_evaluate_source(source: &str, ctx: &ExpressionContext) -> Result<Value, EvalError> {
  let expr = ast::parse(source)?;
  eval::eval(&expr, ctx)
}

fn evaluate_source(source: &str, ctx: &ExpressionContext) -> Value {
  match try_evaluate_source(source, ctx) {
    Ok(value) => value,
    Err(err) => Value::String(format!("[Expression Error: {err}]")),
  }
}

/// Resolve every `{{ ... }}` occurrence in `value`, recursing into arrays
/// and objects. Non-string values are returned unchanged. If `skip_json` is
/// set, expressions that reference `$json` or `$itemIndex` are left as
/// literal text — used for per-item templates that must be re-resolved
/// later, once an item index is known.
pub fn resolve(value: &serde_json::Value, ctx: &ExpressionContext, skip_json: bool) -> serde_json::Value {
  match value {
    serde_json::Value::String(s) => resolve_template(s, ctx, skip_json),
    serde_json::Value::Array(items) => serde_json::Value::Array(items.iter().map(|v| resolve(v, ctx, skip_json)).collect()),
    serde_json::Value::Object(map) => {
      serde_json::Value::Object(map.iter().map(|(k, v)| (k.clone(), resolve(v, ctx, skip_json))).collect())
    }
    other => other.clone(),
  }
}

/// Resolve a single template string. If the whole string is one `{{ ... }}`
/// expression, the result keeps its evaluated type; otherwise each match is
/// stringified and substituted in place, returning a `String` value.
pub fn resolve_template(template: &str, ctx: &ExpressionContext, skip_json: bool) -> serde_json::Value {
  let matches = find_matches(template);
  if matches.is_empty() {
    return serde_json::Value::String(template.to_string());
  }

  if skip_json && matches.iter().any(|m| m.source.contains("$json") || m.source.contains("$itemIndex")) {
    return serde_json::Value::String(template.to_string());
  }

  if is_pure_template(template, &matches) {
    return evaluate_source(&matches[0].source, ctx).to_json();
  }

  let mut out = String::new();
  let mut cursor = 0;
  for m in &matches {
    out.push_str(&template[cursor..m.start]);
    out.push_str(&evaluate_source(&m.source, ctx).to_interpolated_string());
    cursor = m.end;
  }
  out.push_str(&template[cursor..]);
  serde_json::Value::String(out)
}

/// Parse `template` as JSON if, after resolution, it forms a complete JSON
/// document; otherwise returns the resolved string/value unchanged. Used
/// where a parameter's raw text is itself meant to be a JSON literal
/// (e.g. a `RespondToWebhook` custom body).
pub fn resolve_json_template(template: &str, ctx: &ExpressionContext) -> serde_json::Value {
  let resolved = resolve_template(template, ctx, false);
  if let serde_json::Value::String(s) = &resolved {
    if let Ok(parsed) = serde_json::from_str(s) {
      return parsed;
    }
  }
  resolved
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeMap;

  fn ctx() -> ExpressionContext {
    ExpressionContext {
      json_data: Value::Map(BTreeMap::from([("score".to_string(), Value::Int(85)), ("name".to_string(), Value::String("Ada".into()))])),
      input_data: vec![],
      node_data: BTreeMap::new(),
      env: BTreeMap::from([("STAGE".to_string(), "prod".to_string())]),
      execution_id: "exec-1".to_string(),
      mode: "manual".to_string(),
      item_index: 0,
    }
  }

  #[test]
  fn pure_template_preserves_type() {
    let v = resolve_template("{{ $json.score >= 70 }}", &ctx(), false);
    assert_eq!(v, serde_json::json!(true));
  }

  #[test]
  fn pure_template_preserves_int_type() {
    let v = resolve_template("{{ $json.score }}", &ctx(), false);
    assert_eq!(v, serde_json::json!(85));
  }

  #[test]
  fn mixed_template_stringifies() {
    let v = resolve_template("Hello {{ $json.name }}, score {{ $json.score }}", &ctx(), false);
    assert_eq!(v, serde_json::json!("Hello Ada, score 85"));
  }

  #[test]
  fn non_template_value_is_identity() {
    let v = resolve_template("just text", &ctx(), false);
    assert_eq!(v, serde_json::json!("just text"));
  }

  #[test]
  fn function_calls_resolve() {
    let v = resolve_template("{{ upper($json.name) }}", &ctx(), false);
    assert_eq!(v, serde_json::json!("ADA"));
  }

  #[test]
  fn env_access() {
    let v = resolve_template("{{ $env.STAGE }}", &ctx(), false);
    assert_eq!(v, serde_json::json!("prod"));
  }

  #[test]
  fn unknown_function_becomes_diagnostic_string() {
    let v = resolve_template("{{ exec('rm -rf /') }}", &ctx(), false);
    assert_eq!(v, serde_json::json!("[Expression Error: unknown function: exec]"));
  }

  #[test]
  fn skip_json_leaves_json_templates_untouched() {
    let v = resolve_template("{{ $json.score }}", &ctx(), true);
    assert_eq!(v, serde_json::json!("{{ $json.score }}"));
  }

  #[test]
  fn ternary_and_comparison() {
    let v = resolve_template("{{ $json.score >= 70 ? 'pass' : 'fail' }}", &ctx(), false);
    assert_eq!(v, serde_json::json!("pass"));
  }

  #[test]
  fn recurses_into_nested_objects() {
    let input = serde_json::json!({"greeting": "{{ $json.name }}", "nested": ["{{ $json.score }}"]});
    let resolved = resolve(&input, &ctx(), false);
    assert_eq!(resolved["greeting"], "Ada");
    assert_eq!(resolved["nested"][0], 85);
  }
}
