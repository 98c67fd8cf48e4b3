use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which document store implementation backs the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Postgres => "postgres",
            Self::Memory => "memory",
        };
        f.write_str(s)
    }
}

impl FromStr for StoreBackend {
    type Err = StoreBackendParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(StoreBackendParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`StoreBackend`] string.
#[derive(Debug, Clone)]
pub struct StoreBackendParseError(pub String);

impl fmt::Display for StoreBackendParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid store backend: {:?}", self.0)
    }
}

impl std::error::Error for StoreBackendParseError {}

// ---------------------------------------------------------------------------
// Addressing
// ---------------------------------------------------------------------------

/// Slash-separated path of a collection, e.g. `users/abc/plans`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

impl CollectionPath {
    /// A top-level collection.
    pub fn root(name: &str) -> Self {
        Self(name.to_owned())
    }

    /// The full path as stored.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Address a document inside this collection.
    pub fn doc(&self, id: impl Into<String>) -> DocumentRef {
        DocumentRef {
            collection: self.clone(),
            id: id.into(),
        }
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Address of a single document: its parent collection plus its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentRef {
    pub collection: CollectionPath,
    pub id: String,
}

impl DocumentRef {
    /// A sub-collection nested under this document.
    pub fn collection(&self, name: &str) -> CollectionPath {
        CollectionPath(format!("{}/{}/{name}", self.collection, self.id))
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

// ---------------------------------------------------------------------------
// Write payloads
// ---------------------------------------------------------------------------

/// A single field in a write payload.
///
/// `ServerTimestamp` is a marker: the store replaces it with its own clock
/// reading at write time. Callers never compute the timestamp themselves.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteValue {
    Value(Value),
    ServerTimestamp,
}

impl From<Value> for WriteValue {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for WriteValue {
    fn from(value: &str) -> Self {
        Self::Value(Value::String(value.to_owned()))
    }
}

impl From<String> for WriteValue {
    fn from(value: String) -> Self {
        Self::Value(Value::String(value))
    }
}

impl From<Map<String, Value>> for WriteValue {
    fn from(value: Map<String, Value>) -> Self {
        Self::Value(Value::Object(value))
    }
}

/// Field-name keyed write payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteFields(BTreeMap<String, WriteValue>);

impl WriteFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<WriteValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Builder-style insert of a server timestamp marker.
    pub fn with_server_timestamp(mut self, name: impl Into<String>) -> Self {
        self.0.insert(name.into(), WriteValue::ServerTimestamp);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &WriteValue)> {
        self.0.iter()
    }

    /// Split the payload into plain JSON fields and timestamp fields,
    /// resolving every server timestamp marker to `now`.
    pub fn resolve(&self, now: DateTime<Utc>) -> ResolvedWrite {
        let mut values = Map::new();
        let mut timestamps = BTreeMap::new();
        for (name, value) in &self.0 {
            match value {
                WriteValue::Value(v) => {
                    values.insert(name.clone(), v.clone());
                }
                WriteValue::ServerTimestamp => {
                    timestamps.insert(name.clone(), now);
                }
            }
        }
        ResolvedWrite { values, timestamps }
    }
}

/// Every value of a JSON object becomes a plain field.
impl From<Map<String, Value>> for WriteFields {
    fn from(map: Map<String, Value>) -> Self {
        Self(
            map.into_iter()
                .map(|(k, v)| (k, WriteValue::Value(v)))
                .collect(),
        )
    }
}

/// A write payload after server timestamps have been resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedWrite {
    pub values: Map<String, Value>,
    pub timestamps: BTreeMap<String, DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Read values
// ---------------------------------------------------------------------------

/// A stored field as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Value(Value),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// Render the field as JSON. Timestamps become RFC 3339 strings.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Value(v) => v.clone(),
            Self::Timestamp(ts) => Value::String(ts.to_rfc3339()),
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            Self::Value(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Value(Value::String(s)) => Some(s),
            _ => None,
        }
    }
}

/// A document snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Document {
    /// Rebuild a snapshot from the two stored halves of a document.
    pub fn from_parts(
        id: impl Into<String>,
        values: Map<String, Value>,
        timestamps: BTreeMap<String, DateTime<Utc>>,
    ) -> Self {
        let mut fields: BTreeMap<String, FieldValue> = values
            .into_iter()
            .map(|(k, v)| (k, FieldValue::Value(v)))
            .collect();
        for (k, ts) in timestamps {
            fields.insert(k, FieldValue::Timestamp(ts));
        }
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// All fields rendered as a JSON object.
    pub fn to_json_map(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }
}
