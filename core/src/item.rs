//! The logical items a caller hands to the writer.

use serde::Deserialize;

/// An ordered collection of entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Feed {
    pub id: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    /// Total number of entries on the server. Only valid in responses.
    pub count: Option<u64>,
    /// Locator of the next page. Only valid in responses.
    pub next_link: Option<String>,
}

/// One structured business object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entry {
    pub id: Option<String>,
    /// Qualified name of the entity type, used for metadata validation.
    pub type_name: Option<String>,
    pub title: Option<String>,
    pub edit_link: Option<String>,
    pub etag: Option<String>,
    pub properties: Vec<Property>,
}

impl Entry {
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.push(Property::new(name, value));
        self
    }
}

/// A named relationship from an entry to another entry or feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NavigationLink {
    pub name: String,
    pub url: Option<String>,
    /// Whether the link targets a feed. Must be known before content is
    /// written in requests.
    pub is_collection: Option<bool>,
}

impl NavigationLink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn collection(mut self, is_collection: bool) -> Self {
        self.is_collection = Some(is_collection);
        self
    }
}

/// A bare locator to a related entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EntityReferenceLink {
    pub url: String,
}

impl EntityReferenceLink {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub value: Value,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    String(String),
    Complex(ComplexValue),
    Collection(CollectionValue),
}

impl Value {
    /// The EDM name of a primitive value, `None` for null and structured values.
    pub fn edm_type_name(&self) -> Option<&'static str> {
        match self {
            Value::Boolean(_) => Some("Edm.Boolean"),
            Value::Int32(_) => Some("Edm.Int32"),
            Value::Int64(_) => Some("Edm.Int64"),
            Value::Double(_) => Some("Edm.Double"),
            Value::String(_) => Some("Edm.String"),
            Value::Null | Value::Complex(_) | Value::Collection(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self, Value::Null | Value::Complex(_) | Value::Collection(_))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int32(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<ComplexValue> for Value {
    fn from(value: ComplexValue) -> Self {
        Value::Complex(value)
    }
}

impl From<CollectionValue> for Value {
    fn from(value: CollectionValue) -> Self {
        Value::Collection(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// A structured value without identity, nested inside an entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComplexValue {
    pub type_name: Option<String>,
    pub properties: Vec<Property>,
}

impl ComplexValue {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.push(Property::new(name, value));
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionValue {
    pub type_name: Option<String>,
    pub items: Vec<Value>,
}

impl CollectionValue {
    pub fn new(items: impl IntoIterator<Item = Value>) -> Self {
        Self {
            type_name: None,
            items: items.into_iter().collect(),
        }
    }
}
