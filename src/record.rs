//! Domain records and identity keys
//!
//! A [`Record`] is a flat JSON object produced by an extractor (a player, a
//! match line, a stat row). Records are merged across runs by an
//! [`IdentityKey`], which decides whether two records describe the same
//! real-world entity.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single extracted entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert, handy for extractors and tests
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Returns the field as a string slice if it holds a JSON string
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// True when the field is missing, null, or an empty/whitespace string
    pub fn is_blank(&self, field: &str) -> bool {
        is_blank_value(self.0.get(field))
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Blank means: absent, `null`, or a string with no non-whitespace content
pub fn is_blank_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Decides which records describe the same entity
///
/// Returning `None` means the record cannot be identified; the consolidator
/// drops such incoming records and leaves existing ones as they are.
pub trait IdentityKey: Send + Sync {
    fn key(&self, record: &Record) -> Option<String>;
}

impl<F> IdentityKey for F
where
    F: Fn(&Record) -> Option<String> + Send + Sync,
{
    fn key(&self, record: &Record) -> Option<String> {
        self(record)
    }
}

/// Identity built from one or more record fields
///
/// Every field must be non-blank; values are trimmed and joined with a unit
/// separator so `("a b", "c")` and `("a", "b c")` stay distinct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIdentity {
    fields: Vec<String>,
}

impl FieldIdentity {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

impl IdentityKey for FieldIdentity {
    fn key(&self, record: &Record) -> Option<String> {
        if self.fields.is_empty() {
            return None;
        }

        let mut parts = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let value = record.get(field);
            if is_blank_value(value) {
                return None;
            }
            parts.push(match value {
                Some(Value::String(s)) => s.trim().to_string(),
                Some(other) => other.to_string(),
                None => return None,
            });
        }

        Some(parts.join("\u{1f}"))
    }
}
