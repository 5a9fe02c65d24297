//! The allow-listed function table (§4.1). Only names registered here are
//! callable from an expression; `eval::eval_call` rejects everything else
//! with [`crate::EvalError::UnknownFunction`].

use std::collections::BTreeMap;

use fuschia_value::Value;

use crate::EvalError;

pub fn call(name: &str, args: &[Value]) -> Result<Value, EvalError> {
  match name {
    "str" => Ok(Value::String(arg(args, 0)?.to_interpolated_string())),
    "int" => Ok(Value::Int(as_f64(arg(args, 0)?)? as i64)),
    "float" => Ok(Value::Float(as_f64(arg(args, 0)?)?)),
    "bool" => Ok(Value::Bool(arg(args, 0)?.truthy())),
    "list" => match arg(args, 0)? {
      Value::List(l) => Ok(Value::List(l.clone())),
      other => Ok(Value::List(vec![other.clone()])),
    },
    "dict" => match arg(args, 0)? {
      Value::Map(m) => Ok(Value::Map(m.clone())),
      _ => Ok(Value::Map(BTreeMap::new())),
    },

    "lower" => Ok(Value::String(as_str(arg(args, 0)?).to_lowercase())),
    "upper" => Ok(Value::String(as_str(arg(args, 0)?).to_uppercase())),
    "trim" => Ok(Value::String(as_str(arg(args, 0)?).trim().to_string())),
    "split" => {
      let s = as_str(arg(args, 0)?);
      let sep = as_str(arg(args, 1)?);
      Ok(Value::List(s.split(sep.as_str()).map(|p| Value::String(p.to_string())).collect()))
    }
    "join" => {
      let list = as_list(arg(args, 0)?)?;
      let sep = args.get(1).map(as_str).unwrap_or_default();
      Ok(Value::String(list.iter().map(Value::to_interpolated_string).collect::<Vec<_>>().join(&sep)))
    }
    "includes" => {
      let haystack = arg(args, 0)?;
      let needle = arg(args, 1)?;
      Ok(Value::Bool(match haystack {
        Value::List(l) => l.contains(needle),
        Value::String(s) => s.contains(&needle.to_interpolated_string()),
        _ => false,
      }))
    }
    "replace" => {
      let s = as_str(arg(args, 0)?);
      let from = as_str(arg(args, 1)?);
      let to = as_str(arg(args, 2)?);
      Ok(Value::String(s.replace(from.as_str(), &to)))
    }
    "substring" => {
      let s = as_str(arg(args, 0)?);
      let chars: Vec<char> = s.chars().collect();
      let start = as_f64(arg(args, 1)?)? as usize;
      let end = args.get(2).map(as_f64).transpose()?.map(|f| f as usize).unwrap_or(chars.len());
      let start = start.min(chars.len());
      let end = end.min(chars.len()).max(start);
      Ok(Value::String(chars[start..end].iter().collect()))
    }
    "length" => Ok(Value::Int(match arg(args, 0)? {
      Value::String(s) => s.chars().count() as i64,
      Value::List(l) => l.len() as i64,
      Value::Map(m) => m.len() as i64,
      Value::Null => 0,
      _ => return Err(EvalError::TypeError("length() expects a string, list, or map".into())),
    })),
    "startswith" => Ok(Value::Bool(as_str(arg(args, 0)?).starts_with(as_str(arg(args, 1)?).as_str()))),
    "endswith" => Ok(Value::Bool(as_str(arg(args, 0)?).ends_with(as_str(arg(args, 1)?).as_str()))),

    "first" => as_list(arg(args, 0)?)?.first().cloned().ok_or(EvalError::IndexOutOfRange),
    "last" => as_list(arg(args, 0)?)?.last().cloned().ok_or(EvalError::IndexOutOfRange),
    "at" => {
      let list = as_list(arg(args, 0)?)?;
      let idx = as_f64(arg(args, 1)?)? as i64;
      let resolved = if idx < 0 { list.len() as i64 + idx } else { idx };
      list.get(resolved as usize).cloned().ok_or(EvalError::IndexOutOfRange)
    }
    "slice" => {
      let list = as_list(arg(args, 0)?)?;
      let start = as_f64(arg(args, 1)?)? as usize;
      let end = args.get(2).map(as_f64).transpose()?.map(|f| f as usize).unwrap_or(list.len());
      let start = start.min(list.len());
      let end = end.min(list.len()).max(start);
      Ok(Value::List(list[start..end].to_vec()))
    }
    "reverse" => {
      let mut list = as_list(arg(args, 0)?)?.clone();
      list.reverse();
      Ok(Value::List(list))
    }
    "sort" => {
      let mut list = as_list(arg(args, 0)?)?.clone();
      list.sort_by(|a, b| value_cmp(a, b));
      Ok(Value::List(list))
    }
    "unique" => {
      let list = as_list(arg(args, 0)?)?;
      let mut out: Vec<Value> = Vec::new();
      for v in list {
        if !out.contains(v) {
          out.push(v.clone());
        }
      }
      Ok(Value::List(out))
    }
    "flatten" => {
      let list = as_list(arg(args, 0)?)?;
      let mut out = Vec::new();
      for v in list {
        match v {
          Value::List(inner) => out.extend(inner.clone()),
          other => out.push(other.clone()),
        }
      }
      Ok(Value::List(out))
    }

    "abs" => Ok(Value::Float(as_f64(arg(args, 0)?)?.abs())),
    "min" => {
      let values = numeric_args(args)?;
      values.into_iter().reduce(f64::min).map(Value::Float).ok_or(EvalError::TypeError("min() expects at least one argument".into()))
    }
    "max" => {
      let values = numeric_args(args)?;
      values.into_iter().reduce(f64::max).map(Value::Float).ok_or(EvalError::TypeError("max() expects at least one argument".into()))
    }
    "sum" => {
      let list = as_list(arg(args, 0)?)?;
      let mut total = 0.0;
      for v in list {
        total += as_f64(v)?;
      }
      Ok(Value::Float(total))
    }
    "round" => {
      let n = as_f64(arg(args, 0)?)?;
      let digits = args.get(1).map(as_f64).transpose()?.unwrap_or(0.0) as i32;
      let factor = 10f64.powi(digits);
      Ok(Value::Float((n * factor).round() / factor))
    }
    "floor" => Ok(Value::Float(as_f64(arg(args, 0)?)?.floor())),
    "ceil" => Ok(Value::Float(as_f64(arg(args, 0)?)?.ceil())),

    "now" => Ok(Value::Int(now_millis())),
    "date_now" => Ok(Value::String(now_iso8601())),
    "timestamp" => Ok(Value::Int(now_millis() / 1000)),

    "json_stringify" => Ok(Value::String(serde_json::to_string(&arg(args, 0)?.to_json()).unwrap_or_default())),
    "json_parse" => {
      let s = as_str(arg(args, 0)?);
      let parsed: serde_json::Value = serde_json::from_str(&s).map_err(|e| EvalError::TypeError(format!("json_parse: {e}")))?;
      Ok(Value::from_json(&parsed))
    }

    "typeof" => Ok(Value::String(arg(args, 0)?.type_name().to_string())),
    "is_array" => Ok(Value::Bool(matches!(arg(args, 0)?, Value::List(_)))),
    "is_empty" => Ok(Value::Bool(!arg(args, 0)?.truthy())),
    "is_none" => Ok(Value::Bool(matches!(arg(args, 0)?, Value::Null))),

    "keys" => match arg(args, 0)? {
      Value::Map(m) => Ok(Value::List(m.keys().map(|k| Value::String(k.clone())).collect())),
      _ => Err(EvalError::TypeError("keys() expects a map".into())),
    },
    "values" => match arg(args, 0)? {
      Value::Map(m) => Ok(Value::List(m.values().cloned().collect())),
      _ => Err(EvalError::TypeError("values() expects a map".into())),
    },
    "get" => match arg(args, 0)? {
      Value::Map(m) => Ok(m.get(as_str(arg(args, 1)?).as_str()).cloned().unwrap_or(args.get(2).cloned().unwrap_or(Value::Null))),
      _ => Err(EvalError::TypeError("get() expects a map".into())),
    },

    other => Err(EvalError::UnknownFunction(other.to_string())),
  }
}

fn arg(args: &[Value], i: usize) -> Result<&Value, EvalError> {
  args.get(i).ok_or(EvalError::ArityError(i + 1))
}

fn as_f64(v: &Value) -> Result<f64, EvalError> {
  match v {
    Value::Int(i) => Ok(*i as f64),
    Value::Float(f) => Ok(*f),
    Value::String(s) => s.trim().parse().map_err(|_| EvalError::TypeError(format!("cannot convert '{s}' to a number"))),
    Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
    _ => Err(EvalError::TypeError("expected a number".into())),
  }
}

fn as_str(v: &Value) -> String {
  v.to_interpolated_string()
}

fn as_list(v: &Value) -> Result<&Vec<Value>, EvalError> {
  match v {
    Value::List(l) => Ok(l),
    _ => Err(EvalError::TypeError("expected a list".into())),
  }
}

fn numeric_args(args: &[Value]) -> Result<Vec<f64>, EvalError> {
  if args.len() == 1 {
    if let Value::List(l) = &args[0] {
      return l.iter().map(as_f64).collect();
    }
  }
  args.iter().map(as_f64).collect()
}

fn value_cmp(a: &Value, b: &Value) -> std::cmp::Ordering {
  match (a, b) {
    (Value::Int(x), Value::Int(y)) => x.cmp(y),
    (Value::String(x), Value::String(y)) => x.cmp(y),
    _ => as_f64(a).unwrap_or(0.0).partial_cmp(&as_f64(b).unwrap_or(0.0)).unwrap_or(std::cmp::Ordering::Equal),
  }
}

/// Milliseconds since the Unix epoch. Routed through a single function so a
/// future durable-clock requirement has one call site to change.
fn now_millis() -> i64 {
  std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

fn now_iso8601() -> String {
  chrono::Utc::now().to_rfc3339()
}
