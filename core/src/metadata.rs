//! The read-only type oracle the writer consults while validating items.

use std::collections::{BTreeMap, HashMap};

use crate::item::Value;

/// Supplies declared types for structured values. The writer never mutates it.
pub trait MetadataProvider {
    fn structured_type(&self, name: &str) -> Option<&StructuredType>;
}

/// The declared shape of a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Primitive,
    Complex,
    Collection,
}

impl PropertyKind {
    /// Whether `value` has this shape. Null is admitted by every kind.
    pub fn admits(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (PropertyKind::Complex, Value::Complex(_)) => true,
            (PropertyKind::Collection, Value::Collection(_)) => true,
            (PropertyKind::Primitive, value) => value.is_primitive(),
            _ => false,
        }
    }
}

/// An entity or complex type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuredType {
    pub name: String,
    /// Open types accept properties beyond the declared ones.
    pub open: bool,
    pub properties: BTreeMap<String, PropertyKind>,
    /// Navigation property name to whether it targets a collection.
    pub navigation: BTreeMap<String, bool>,
}

impl StructuredType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn open(mut self) -> Self {
        self.open = true;
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, kind: PropertyKind) -> Self {
        self.properties.insert(name.into(), kind);
        self
    }

    pub fn with_navigation(mut self, name: impl Into<String>, is_collection: bool) -> Self {
        self.navigation.insert(name.into(), is_collection);
        self
    }

    pub fn property_kind(&self, name: &str) -> Option<PropertyKind> {
        self.properties.get(name).copied()
    }

    pub fn navigation_is_collection(&self, name: &str) -> Option<bool> {
        self.navigation.get(name).copied()
    }
}

/// An in-memory set of types keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Model {
    types: HashMap<String, StructuredType>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, structured_type: StructuredType) -> Self {
        self.insert(structured_type);
        self
    }

    pub fn insert(&mut self, structured_type: StructuredType) {
        self.types
            .insert(structured_type.name.clone(), structured_type);
    }
}

impl MetadataProvider for Model {
    fn structured_type(&self, name: &str) -> Option<&StructuredType> {
        self.types.get(name)
    }
}
