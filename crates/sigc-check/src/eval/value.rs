//! Runtime value representation for contract evaluation.
//!
//! [`Value`] is the dynamic counterpart of the signature type vocabulary.
//! Inputs built by the test synthesizer, results returned by an
//! implementation under test and record values checked against invariants
//! are all `Value`s.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Text(String),
    Seq(Vec<Value>),
    /// Record fields in declaration order.
    Record(IndexMap<String, Value>),
    /// An optional value in its absent branch.
    Absent,
    /// An optional value in its present branch.
    Present(Box<Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "Int",
            Value::Bool(_) => "Bool",
            Value::Text(_) => "Text",
            Value::Seq(_) => "Sequence",
            Value::Record(_) => "Record",
            Value::Absent | Value::Present(_) => "Optional",
        }
    }

    pub fn seq_of_ints(items: impl IntoIterator<Item = i64>) -> Value {
        Value::Seq(items.into_iter().map(Value::Int).collect())
    }

    /// Wire form shared with external executables: scalars and sequences
    /// map to their JSON counterparts, records to objects, `Absent` to
    /// `null` and `Present(v)` to the JSON of `v`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Int(v) => serde_json::Value::from(*v),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Seq(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Record(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect(),
            ),
            Value::Absent => serde_json::Value::Null,
            Value::Present(inner) => inner.to_json(),
        }
    }

    /// Reads a wire value back. Without a type to guide it, `null` becomes
    /// `Absent` and every other value is taken at face value.
    pub fn from_json(json: &serde_json::Value) -> Option<Value> {
        Some(match json {
            serde_json::Value::Null => Value::Absent,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Int(n.as_i64()?),
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Array(items) => Value::Seq(
                items
                    .iter()
                    .map(Value::from_json)
                    .collect::<Option<Vec<_>>>()?,
            ),
            serde_json::Value::Object(fields) => {
                let mut record = IndexMap::new();
                for (name, value) in fields {
                    record.insert(name.clone(), Value::from_json(value)?);
                }
                Value::Record(record)
            }
        })
    }
}
