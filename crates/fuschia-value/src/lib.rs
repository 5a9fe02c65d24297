//! Item and typed Value model (C1).
//!
//! [`Item`] is the unit of data flow between nodes: a JSON tree plus an
//! optional map of named binary blobs. [`Value`] is the tagged-variant type
//! the expression engine evaluates to — `Null | Bool | Int | Float | String |
//! List | Map | Bytes` — kept distinct from `serde_json::Value` so that
//! binary blobs and integer/float distinctions survive expression
//! evaluation without round-tripping through JSON.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A single datum flowing on a connection: JSON payload plus optional binary
/// attachments. Items are immutable once emitted — a node that "modifies"
/// an item produces a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
  pub json: serde_json::Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub binary: Option<BTreeMap<String, Binary>>,
}

impl Item {
  pub fn new(json: serde_json::Value) -> Self {
    Self { json, binary: None }
  }

  pub fn with_binary(json: serde_json::Value, binary: BTreeMap<String, Binary>) -> Self {
    Self { json, binary: Some(binary) }
  }
}

impl From<serde_json::Value> for Item {
  fn from(json: serde_json::Value) -> Self {
    Item::new(json)
  }
}

/// A named binary blob attached to an item. `data` is reference-counted so
/// cloning an `Item` (which happens whenever it fans out to multiple
/// downstream branches) never copies the bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binary {
  pub mime_type: String,
  #[serde(with = "bytes_as_base64")]
  pub data: Arc<Vec<u8>>,
}

mod bytes_as_base64 {
  use super::*;
  use base64::Engine as _;
  use base64::engine::general_purpose::STANDARD;
  use serde::{Deserializer, Serializer};

  pub fn serialize<S: Serializer>(bytes: &Arc<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&STANDARD.encode(bytes.as_slice()))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Arc<Vec<u8>>, D::Error> {
    use serde::de::Error;
    let s = String::deserialize(d)?;
    STANDARD.decode(s.as_bytes()).map(Arc::new).map_err(D::Error::custom)
  }
}

/// Tagged-variant value type produced by the expression engine (§9 Design
/// Notes). Distinct from `serde_json::Value` so that the evaluator can keep
/// an `Int`/`Float` distinction and carry raw `Bytes` through expressions
/// without a JSON round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Null,
  Bool(bool),
  Int(i64),
  Float(f64),
  String(String),
  List(Vec<Value>),
  Map(BTreeMap<String, Value>),
  Bytes(Arc<Vec<u8>>),
}

impl Value {
  pub fn truthy(&self) -> bool {
    match self {
      Value::Null => false,
      Value::Bool(b) => *b,
      Value::Int(i) => *i != 0,
      Value::Float(f) => *f != 0.0,
      Value::String(s) => !s.is_empty(),
      Value::List(l) => !l.is_empty(),
      Value::Map(m) => !m.is_empty(),
      Value::Bytes(b) => !b.is_empty(),
    }
  }

  pub fn type_name(&self) -> &'static str {
    match self {
      Value::Null => "null",
      Value::Bool(_) => "bool",
      Value::Int(_) => "int",
      Value::Float(_) => "float",
      Value::String(_) => "string",
      Value::List(_) => "list",
      Value::Map(_) => "map",
      Value::Bytes(_) => "bytes",
    }
  }

  /// Stringifies the way the expression engine does for non-pure-template
  /// interpolation: `null` becomes `""`, collections become JSON text.
  pub fn to_interpolated_string(&self) -> String {
    match self {
      Value::Null => String::new(),
      Value::Bool(b) => b.to_string(),
      Value::Int(i) => i.to_string(),
      Value::Float(f) => format_float(*f),
      Value::String(s) => s.clone(),
      Value::List(_) | Value::Map(_) => serde_json::to_string(&self.to_json()).unwrap_or_default(),
      Value::Bytes(b) => format!("<{} bytes>", b.len()),
    }
  }

  pub fn to_json(&self) -> serde_json::Value {
    match self {
      Value::Null => serde_json::Value::Null,
      Value::Bool(b) => serde_json::Value::Bool(*b),
      Value::Int(i) => serde_json::Value::from(*i),
      Value::Float(f) => serde_json::Number::from_f64(*f).map(serde_json::Value::Number).unwrap_or(serde_json::Value::Null),
      Value::String(s) => serde_json::Value::String(s.clone()),
      Value::List(l) => serde_json::Value::Array(l.iter().map(Value::to_json).collect()),
      Value::Map(m) => serde_json::Value::Object(m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
      Value::Bytes(b) => serde_json::Value::String(format!("<{} bytes>", b.len())),
    }
  }

  pub fn from_json(value: &serde_json::Value) -> Value {
    match value {
      serde_json::Value::Null => Value::Null,
      serde_json::Value::Bool(b) => Value::Bool(*b),
      serde_json::Value::Number(n) => {
        if let Some(i) = n.as_i64() {
          Value::Int(i)
        } else {
          Value::Float(n.as_f64().unwrap_or(0.0))
        }
      }
      serde_json::Value::String(s) => Value::String(s.clone()),
      serde_json::Value::Array(a) => Value::List(a.iter().map(Value::from_json).collect()),
      serde_json::Value::Object(o) => Value::Map(o.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect()),
    }
  }
}

fn format_float(f: f64) -> String {
  if f.fract() == 0.0 && f.abs() < 1e15 {
    format!("{}", f as i64)
  } else {
    f.to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn item_from_json_roundtrip() {
    let item: Item = serde_json::json!({"a": 1}).into();
    assert_eq!(item.json["a"], 1);
    assert!(item.binary.is_none());
  }

  #[test]
  fn value_truthiness_matches_reference_semantics() {
    assert!(!Value::Null.truthy());
    assert!(!Value::List(vec![]).truthy());
    assert!(Value::List(vec![Value::Int(0)]).truthy());
    assert!(!Value::String(String::new()).truthy());
  }

  #[test]
  fn value_interpolation_stringifies_null_as_empty() {
    assert_eq!(Value::Null.to_interpolated_string(), "");
    assert_eq!(Value::Int(42).to_interpolated_string(), "42");
  }

  #[test]
  fn value_interpolation_stringifies_collections_as_json() {
    let v = Value::List(vec![Value::Int(1), Value::Int(2)]);
    assert_eq!(v.to_interpolated_string(), "[1,2]");
  }

  #[test]
  fn from_json_distinguishes_int_and_float() {
    assert_eq!(Value::from_json(&serde_json::json!(3)), Value::Int(3));
    assert_eq!(Value::from_json(&serde_json::json!(3.5)), Value::Float(3.5));
  }

  #[test]
  fn binary_base64_roundtrip() {
    let item = Item::with_binary(
      serde_json::json!({}),
      BTreeMap::from([(
        "file".to_string(),
        Binary { mime_type: "text/plain".into(), data: Arc::new(b"hello world".to_vec()) },
      )]),
    );
    let encoded = serde_json::to_string(&item).unwrap();
    let decoded: Item = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded.binary.unwrap()["file"].data.as_slice(), b"hello world");
  }
}
