//! Schemaless documents as they come out of a collection store.
//!
//! Field values are narrowed to a closed set of scalar kinds at the store
//! boundary, so nothing downstream ever sees nested JSON.

use serde_json::{Map, Value};
use std::fmt;

/// A scalar field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Missing,
}

impl FieldValue {
    /// Narrow a JSON value. Nested values are kept as their compact JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Missing,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n.as_f64().map(Self::Number).unwrap_or(Self::Missing),
            Value::String(s) => Self::Text(s.clone()),
            // Extended-JSON object ids ({"$oid": "..."}) collapse to their string.
            Value::Object(map) => match map.get("$oid") {
                Some(Value::String(oid)) if map.len() == 1 => Self::Text(oid.clone()),
                _ => Self::Text(value.to_string()),
            },
            Value::Array(_) => Self::Text(value.to_string()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(s) => Value::String(s.clone()),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Bool(b) => Value::Bool(*b),
            Self::Missing => Value::Null,
        }
    }

    /// Parse a CSV cell. Empty cells are missing; numbers and the literals
    /// `true`/`false` are recognised, everything else stays text.
    pub fn parse_cell(cell: &str) -> Self {
        let cell = cell.trim();
        if cell.is_empty() {
            return Self::Missing;
        }
        if let Ok(n) = cell.parse::<f64>() {
            if n.is_finite() {
                return Self::Number(n);
            }
        }
        match cell {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => Self::Text(cell.to_string()),
        }
    }

    /// A CSV cell of a categorical column: kept verbatim unless empty.
    pub fn text_cell(cell: &str) -> Self {
        let cell = cell.trim();
        if cell.is_empty() {
            Self::Missing
        } else {
            Self::Text(cell.to_string())
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Numeric view: numbers as-is, booleans as 0/1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Kind name used in validation messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Number(_) => "number",
            Self::Bool(_) => "bool",
            Self::Missing => "missing",
        }
    }
}

/// CSV rendering: missing is the empty string.
impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Missing => Ok(()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// An ordered set of named fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    fields: Vec<(String, FieldValue)>,
}

impl Document {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value.into());
        self
    }

    /// Insert or replace a field, keeping the original position on replace.
    pub fn insert(&mut self, key: &str, value: FieldValue) {
        match self.fields.iter_mut().find(|(k, _)| k == key) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn from_json_object(map: &Map<String, Value>) -> Self {
        map.iter()
            .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
            .collect()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl FromIterator<(String, FieldValue)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (k, v) in iter {
            doc.insert(&k, v);
        }
        doc
    }
}
