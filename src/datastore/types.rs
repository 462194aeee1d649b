//! Entity model shared by every datastore backend
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use super::error::DatastoreError;

/// Key of a root entity: a kind plus an integer id.
///
/// An incomplete key has no id yet; the datastore assigns one on insert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    pub kind: String,
    pub id: Option<i64>,
}

impl Key {
    pub fn incomplete(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: None,
        }
    }

    pub fn with_id(kind: impl Into<String>, id: i64) -> Self {
        Self {
            kind: kind.into(),
            id: Some(id),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.id.is_some()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "{}({})", self.kind, id),
            None => write!(f, "{}(incomplete)", self.kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    String(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Integer(_) => 1,
            Value::Timestamp(_) => 2,
            Value::Boolean(_) => 3,
            Value::String(_) => 4,
        }
    }

    /// Ordering used by queries: values of different types sort by type.
    pub fn index_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub key: Key,
    pub properties: BTreeMap<String, Value>,
}

impl Entity {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            properties: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.properties.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn string(&self, name: &str) -> Result<&str, DatastoreError> {
        match self.get(name) {
            Some(Value::String(s)) => Ok(s),
            other => Err(self.type_mismatch(name, "string", other)),
        }
    }

    /// Missing boolean properties read as `false`, matching how the
    /// managed client loads zero values.
    pub fn boolean(&self, name: &str) -> Result<bool, DatastoreError> {
        match self.get(name) {
            Some(Value::Boolean(b)) => Ok(*b),
            None | Some(Value::Null) => Ok(false),
            other => Err(self.type_mismatch(name, "boolean", other)),
        }
    }

    pub fn timestamp(&self, name: &str) -> Result<DateTime<Utc>, DatastoreError> {
        match self.get(name) {
            Some(Value::Timestamp(t)) => Ok(*t),
            other => Err(self.type_mismatch(name, "timestamp", other)),
        }
    }

    fn type_mismatch(&self, name: &str, expected: &str, found: Option<&Value>) -> DatastoreError {
        DatastoreError::Decode(format!(
            "{}: property '{}' expected {}, found {:?}",
            self.key, name, expected, found
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub kind: String,
    pub order: Vec<(String, Direction)>,
}

impl Query {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            order: Vec::new(),
        }
    }

    /// Adds a sort order; a leading `-` sorts descending.
    pub fn order(mut self, field: &str) -> Self {
        match field.strip_prefix('-') {
            Some(name) => self.order.push((name.to_string(), Direction::Descending)),
            None => self.order.push((field.to_string(), Direction::Ascending)),
        }
        self
    }
}

/// Opaque handle returned by `begin_transaction`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionId(pub String);

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Fails if the key already exists; incomplete keys get an id.
    Insert(Entity),
    Upsert(Entity),
    Delete(Key),
}
