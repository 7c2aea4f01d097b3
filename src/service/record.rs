use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Backing-store entity collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    Items,
    Users,
}

impl Entity {
    pub const ALL: [Entity; 2] = [Entity::Items, Entity::Users];

    /// Path segment on the backing store.
    pub fn path(self) -> &'static str {
        match self {
            Entity::Items => "items",
            Entity::Users => "users",
        }
    }

    pub fn singular(self) -> &'static str {
        match self {
            Entity::Items => "item",
            Entity::Users => "user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "items" | "item" => Some(Entity::Items),
            "users" | "user" => Some(Entity::Users),
            _ => None,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Record identifier. Stores assign numbers; string ids are accepted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Number(u64),
    Text(String),
}

impl RecordId {
    pub fn is_empty(&self) -> bool {
        match self {
            RecordId::Number(_) => false,
            RecordId::Text(s) => s.trim().is_empty(),
        }
    }

    /// Same id regardless of representation, so `1` matches `"1"`.
    pub fn matches(&self, other: &RecordId) -> bool {
        match (self, other) {
            (RecordId::Number(a), RecordId::Number(b)) => a == b,
            _ => self.to_string() == other.to_string(),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Number(n) => write!(f, "{}", n),
            RecordId::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for RecordId {
    fn from(n: u64) -> Self {
        RecordId::Number(n)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        match s.trim().parse::<u64>() {
            Ok(n) => RecordId::Number(n),
            Err(_) => RecordId::Text(s.to_string()),
        }
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId::from(s.as_str())
    }
}

/// An item or user as stored by the backing store.
///
/// Only `id` and `name` are interpreted; every other field round-trips
/// through `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<RecordId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            extra: Map::new(),
        }
    }

    /// Case-insensitive substring match over `name` and string-valued extras.
    pub fn matches_query(&self, query: &str) -> bool {
        let needle = query.to_lowercase();
        if self.name.to_lowercase().contains(&needle) {
            return true;
        }
        self.extra
            .values()
            .filter_map(Value::as_str)
            .any(|v| v.to_lowercase().contains(&needle))
    }
}

/// Payload for creating a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Draft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extra: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.trim().is_empty()
    }
}

impl From<&str> for Draft {
    fn from(name: &str) -> Self {
        Draft::new(name)
    }
}

impl From<String> for Draft {
    fn from(name: String) -> Self {
        Draft::new(name)
    }
}
