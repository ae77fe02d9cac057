use indexmap::IndexMap;
use serde_json::Value;

/// A single attribute value of an external record.
///
/// Records coming from a system of record are loosely typed trees. Values are
/// kept as text, a list of text, or a nested map so that dotted paths such as
/// `"location.value"` can be resolved without inspecting JSON at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    /// Explicit `null` from the source system.
    Null,
    /// A scalar. Numbers and booleans are kept in their JSON rendering.
    Text(String),
    /// A list of scalars.
    List(Vec<String>),
    /// A nested object, e.g. a reference field `{ "link": ..., "value": ... }`.
    Map(IndexMap<String, AttributeValue>),
}

impl AttributeValue {
    /// Returns the text of a scalar value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<Value> for AttributeValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => AttributeValue::Null,
            Value::String(s) => AttributeValue::Text(s),
            Value::Bool(b) => AttributeValue::Text(b.to_string()),
            Value::Number(n) => AttributeValue::Text(n.to_string()),
            Value::Array(items) => AttributeValue::List(
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            Value::Object(map) => AttributeValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, AttributeValue::from(v)))
                    .collect(),
            ),
        }
    }
}

/// An item fetched from the external system of record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRecord {
    /// Stable unique id of the record (e.g. a ServiceNow `sys_id`).
    pub id: String,
    /// Attribute tree, in the order the source returned it.
    pub attributes: IndexMap<String, AttributeValue>,
}

impl ExternalRecord {
    /// Creates a record with no attributes.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: IndexMap::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Builds a record from a decoded JSON object.
    pub fn from_json(id: impl Into<String>, object: serde_json::Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            attributes: object
                .into_iter()
                .map(|(k, v)| (k, AttributeValue::from(v)))
                .collect(),
        }
    }

    /// Resolves a dot-separated path through nested maps.
    ///
    /// Every segment but the last must land on a [`AttributeValue::Map`].
    pub fn lookup(&self, path: &str) -> Option<&AttributeValue> {
        let mut segments = path.split('.');
        let mut current = self.attributes.get(segments.next()?)?;

        for segment in segments {
            match current {
                AttributeValue::Map(map) => current = map.get(segment)?,
                _ => return None,
            }
        }

        Some(current)
    }

    /// Resolves `path` to a non-empty scalar.
    ///
    /// Lists, maps, nulls and empty strings all count as "no value".
    pub fn text(&self, path: &str) -> Option<&str> {
        self.lookup(path)
            .and_then(AttributeValue::as_text)
            .filter(|s| !s.is_empty())
    }
}
