//! AST evaluation against an [`ExpressionContext`].

use fuschia_value::Value;

use crate::ast::{BinOp, Expr};
use crate::context::ExpressionContext;
use crate::functions;

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
  #[error("unknown variable: ${0}")]
  UnknownVariable(String),
  #[error("unknown function: {0}")]
  UnknownFunction(String),
  #[error("wrong number of arguments (expected at least {0})")]
  ArityError(usize),
  #[error("type error: {0}")]
  TypeError(String),
  #[error("index out of range")]
  IndexOutOfRange,
  #[error("no such field: {0}")]
  NoSuchField(String),
  #[error("parse error: {0}")]
  Parse(#[from] crate::ast::ParseError),
}

pub fn eval(expr: &Expr, ctx: &ExpressionContext) -> Result<Value, EvalError> {
  match expr {
    Expr::Null => Ok(Value::Null),
    Expr::Bool(b) => Ok(Value::Bool(*b)),
    Expr::Int(i) => Ok(Value::Int(*i)),
    Expr::Float(f) => Ok(Value::Float(*f)),
    Expr::Str(s) => Ok(Value::String(s.clone())),
    Expr::Var(name) => eval_var(name, ctx),
    Expr::Field(base, name) => {
      let base_val = eval(base, ctx)?;
      field_access(&base_val, name)
    }
    Expr::Index(base, index) => {
      let base_val = eval(base, ctx)?;
      let index_val = eval(index, ctx)?;
      index_access(&base_val, &index_val)
    }
    Expr::Call(name, args) => {
      let arg_values: Vec<Value> = args.iter().map(|a| eval(a, ctx)).collect::<Result<_, _>>()?;
      functions::call(name, &arg_values)
    }
    Expr::Not(inner) => Ok(Value::Bool(!eval(inner, ctx)?.truthy())),
    Expr::Neg(inner) => match eval(inner, ctx)? {
      Value::Int(i) => Ok(Value::Int(-i)),
      Value::Float(f) => Ok(Value::Float(-f)),
      other => Err(EvalError::TypeError(format!("cannot negate {}", other.type_name()))),
    },
    Expr::Binary(op, lhs, rhs) => eval_binary(op, lhs, rhs, ctx),
    Expr::Ternary(cond, then_branch, else_branch) => {
      if eval(cond, ctx)?.truthy() { eval(then_branch, ctx) } else { eval(else_branch, ctx) }
    }
  }
}

fn eval_var(name: &str, ctx: &ExpressionContext) -> Result<Value, EvalError> {
  match name {
    "$json" => Ok(ctx.json_data.clone()),
    "$input" => Ok(Value::List(ctx.input_data.clone())),
    "$env" => Ok(Value::Map(ctx.env.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect())),
    "$execution" => Ok(Value::Map(std::collections::BTreeMap::from([
      ("id".to_string(), Value::String(ctx.execution_id.clone())),
      ("mode".to_string(), Value::String(ctx.mode.clone())),
    ]))),
    "$itemIndex" => Ok(Value::Int(ctx.item_index as i64)),
    "$node" => {
      // `$node` alone resolves to a map of every prior node's {json, data};
      // the common case is immediately indexing it: `$node["Name"]`.
      Ok(Value::Map(ctx.node_data.iter().map(|(k, v)| (k.clone(), v.as_value())).collect()))
    }
    other => Err(EvalError::UnknownVariable(other.trim_start_matches('$').to_string())),
  }
}

fn field_access(base: &Value, name: &str) -> Result<Value, EvalError> {
  match base {
    Value::Map(m) => Ok(m.get(name).cloned().unwrap_or(Value::Null)),
    Value::Null => Ok(Value::Null),
    _ => Err(EvalError::NoSuchField(name.to_string())),
  }
}

fn index_access(base: &Value, index: &Value) -> Result<Value, EvalError> {
  match (base, index) {
    (Value::Map(m), Value::String(key)) => Ok(m.get(key).cloned().unwrap_or(Value::Null)),
    (Value::List(l), Value::Int(i)) => {
      let resolved = if *i < 0 { l.len() as i64 + i } else { *i };
      Ok(l.get(resolved as usize).cloned().unwrap_or(Value::Null))
    }
    (Value::List(l), Value::Float(f)) => Ok(l.get(*f as usize).cloned().unwrap_or(Value::Null)),
    _ => Err(EvalError::TypeError("cannot index this value".into())),
  }
}

fn eval_binary(op: &BinOp, lhs: &Expr, rhs: &Expr, ctx: &ExpressionContext) -> Result<Value, EvalError> {
  match op {
    BinOp::And => {
      let l = eval(lhs, ctx)?;
      if !l.truthy() { Ok(l) } else { eval(rhs, ctx) }
    }
    BinOp::Or => {
      let l = eval(lhs, ctx)?;
      if l.truthy() { Ok(l) } else { eval(rhs, ctx) }
    }
    BinOp::Eq => Ok(Value::Bool(values_equal(&eval(lhs, ctx)?, &eval(rhs, ctx)?))),
    BinOp::Ne => Ok(Value::Bool(!values_equal(&eval(lhs, ctx)?, &eval(rhs, ctx)?))),
    BinOp::Add => arith(eval(lhs, ctx)?, eval(rhs, ctx)?, |a, b| a + b, |a, b| Some(format!("{a}{b}")))
      .map_err(EvalError::TypeError),
    BinOp::Sub => numeric_arith(eval(lhs, ctx)?, eval(rhs, ctx)?, |a, b| a - b),
    BinOp::Mul => numeric_arith(eval(lhs, ctx)?, eval(rhs, ctx)?, |a, b| a * b),
    BinOp::Div => numeric_arith(eval(lhs, ctx)?, eval(rhs, ctx)?, |a, b| a / b),
    BinOp::Mod => numeric_arith(eval(lhs, ctx)?, eval(rhs, ctx)?, |a, b| a % b),
    BinOp::Lt => Ok(Value::Bool(compare(&eval(lhs, ctx)?, &eval(rhs, ctx)?)? == std::cmp::Ordering::Less)),
    BinOp::Le => Ok(Value::Bool(compare(&eval(lhs, ctx)?, &eval(rhs, ctx)?)? != std::cmp::Ordering::Greater)),
    BinOp::Gt => Ok(Value::Bool(compare(&eval(lhs, ctx)?, &eval(rhs, ctx)?)? == std::cmp::Ordering::Greater)),
    BinOp::Ge => Ok(Value::Bool(compare(&eval(lhs, ctx)?, &eval(rhs, ctx)?)? != std::cmp::Ordering::Less)),
  }
}

fn values_equal(a: &Value, b: &Value) -> bool {
  match (a, b) {
    (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => (*x as f64) == *y,
    _ => a == b,
  }
}

fn numeric_value(v: &Value) -> Result<f64, String> {
  match v {
    Value::Int(i) => Ok(*i as f64),
    Value::Float(f) => Ok(*f),
    Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
    Value::String(s) => s.trim().parse().map_err(|_| format!("cannot convert '{s}' to a number")),
    other => Err(format!("expected a number, got {}", other.type_name())),
  }
}

fn numeric_arith(a: Value, b: Value, f: impl Fn(f64, f64) -> f64) -> Result<Value, EvalError> {
  let x = numeric_value(&a).map_err(EvalError::TypeError)?;
  let y = numeric_value(&b).map_err(EvalError::TypeError)?;
  let result = f(x, y);
  if matches!(a, Value::Int(_)) && matches!(b, Value::Int(_)) && result.fract() == 0.0 {
    Ok(Value::Int(result as i64))
  } else {
    Ok(Value::Float(result))
  }
}

fn arith(a: Value, b: Value, numeric: impl Fn(f64, f64) -> f64, string: impl Fn(&str, &str) -> Option<String>) -> Result<Value, String> {
  if matches!(a, Value::String(_)) || matches!(b, Value::String(_)) {
    let s = string(&a.to_interpolated_string(), &b.to_interpolated_string()).unwrap_or_default();
    return Ok(Value::String(s));
  }
  let x = numeric_value(&a)?;
  let y = numeric_value(&b)?;
  let result = numeric(x, y);
  if matches!(a, Value::Int(_)) && matches!(b, Value::Int(_)) && result.fract() == 0.0 {
    Ok(Value::Int(result as i64))
  } else {
    Ok(Value::Float(result))
  }
}

fn compare(a: &Value, b: &Value) -> Result<std::cmp::Ordering, EvalError> {
  match (a, b) {
    (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
    _ => {
      let x = numeric_value(a).map_err(EvalError::TypeError)?;
      let y = numeric_value(b).map_err(EvalError::TypeError)?;
      x.partial_cmp(&y).ok_or_else(|| EvalError::TypeError("cannot compare NaN".into()))
    }
  }
}
