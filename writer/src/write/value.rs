use odata_writer_core::{
    CollectionValue, ComplexValue, MetadataProvider, Property, PropertyKind, StructuredType, Value,
};

use super::duplicate::DuplicatePropertyNamesChecker;
use super::recursion::RecursionGuard;
use crate::error::{Error, Result};

/// Format-specific emission of property values, driven by [`ValueWriter`].
///
/// Every `begin_*` is matched by the corresponding `end_*` unless an error
/// interrupts the walk.
pub trait ValueSink {
    fn begin_property(&mut self, index: usize, property: &Property) -> Result<()>;
    fn end_property(&mut self, property: &Property) -> Result<()>;
    fn begin_item(&mut self, index: usize, item: &Value) -> Result<()>;
    fn end_item(&mut self, item: &Value) -> Result<()>;
    /// Called for null and every primitive value.
    fn primitive(&mut self, value: &Value) -> Result<()>;
    fn begin_complex(&mut self, value: &ComplexValue) -> Result<()>;
    fn end_complex(&mut self, value: &ComplexValue) -> Result<()>;
    fn begin_collection(&mut self, value: &CollectionValue) -> Result<()>;
    fn end_collection(&mut self, value: &CollectionValue) -> Result<()>;
}

/// A sink that emits nothing, for validating values that are not written.
#[derive(Debug, Default)]
pub(crate) struct DiscardSink;

impl ValueSink for DiscardSink {
    fn begin_property(&mut self, _: usize, _: &Property) -> Result<()> {
        Ok(())
    }

    fn end_property(&mut self, _: &Property) -> Result<()> {
        Ok(())
    }

    fn begin_item(&mut self, _: usize, _: &Value) -> Result<()> {
        Ok(())
    }

    fn end_item(&mut self, _: &Value) -> Result<()> {
        Ok(())
    }

    fn primitive(&mut self, _: &Value) -> Result<()> {
        Ok(())
    }

    fn begin_complex(&mut self, _: &ComplexValue) -> Result<()> {
        Ok(())
    }

    fn end_complex(&mut self, _: &ComplexValue) -> Result<()> {
        Ok(())
    }

    fn begin_collection(&mut self, _: &CollectionValue) -> Result<()> {
        Ok(())
    }

    fn end_collection(&mut self, _: &CollectionValue) -> Result<()> {
        Ok(())
    }
}

/// Walks property values for a backend.
///
/// Each complex value gets a fresh [`DuplicatePropertyNamesChecker`], and
/// each complex or collection value occupies one level of the writer's
/// [`RecursionGuard`] while its children are written.
pub struct ValueWriter<'c> {
    guard: &'c mut RecursionGuard,
    metadata: Option<&'c dyn MetadataProvider>,
}

impl<'c> ValueWriter<'c> {
    pub(crate) fn new(
        guard: &'c mut RecursionGuard,
        metadata: Option<&'c dyn MetadataProvider>,
    ) -> Self {
        Self { guard, metadata }
    }

    /// Writes a property of an entry. The entry's own property names are
    /// checked by the writer before any hook runs.
    pub fn write_property<S: ValueSink + ?Sized>(
        &mut self,
        sink: &mut S,
        index: usize,
        property: &Property,
    ) -> Result<()> {
        sink.begin_property(index, property)?;
        write_value(self.guard, self.metadata, sink, &property.value)?;
        sink.end_property(property)
    }

    pub fn write_value<S: ValueSink + ?Sized>(&mut self, sink: &mut S, value: &Value) -> Result<()> {
        write_value(self.guard, self.metadata, sink, value)
    }

    pub(crate) fn validate(&mut self, value: &Value) -> Result<()> {
        self.write_value(&mut DiscardSink, value)
    }
}

fn write_value<S: ValueSink + ?Sized>(
    guard: &mut RecursionGuard,
    metadata: Option<&dyn MetadataProvider>,
    sink: &mut S,
    value: &Value,
) -> Result<()> {
    match value {
        Value::Complex(complex) => {
            let mut guard = guard.scoped()?;
            let declared = declared_type(metadata, complex.type_name.as_deref());
            let mut names = DuplicatePropertyNamesChecker::new();
            sink.begin_complex(complex)?;
            for (index, property) in complex.properties.iter().enumerate() {
                names.check(&property.name)?;
                if let Some(declared) = declared {
                    validate_property(declared, property)?;
                }
                sink.begin_property(index, property)?;
                write_value(&mut guard, metadata, sink, &property.value)?;
                sink.end_property(property)?;
            }
            sink.end_complex(complex)
        }
        Value::Collection(collection) => {
            let mut guard = guard.scoped()?;
            sink.begin_collection(collection)?;
            for (index, item) in collection.items.iter().enumerate() {
                sink.begin_item(index, item)?;
                write_value(&mut guard, metadata, sink, item)?;
                sink.end_item(item)?;
            }
            sink.end_collection(collection)
        }
        _ => sink.primitive(value),
    }
}

pub(crate) fn declared_type<'m>(
    metadata: Option<&'m dyn MetadataProvider>,
    type_name: Option<&str>,
) -> Option<&'m StructuredType> {
    metadata?.structured_type(type_name?)
}

/// Checks `property` against its declaring type.
pub(crate) fn validate_property(declared: &StructuredType, property: &Property) -> Result<()> {
    match declared.property_kind(&property.name) {
        Some(kind) if !kind.admits(&property.value) => Err(Error::PropertyKindMismatch {
            name: property.name.clone(),
            expected: match kind {
                PropertyKind::Primitive => "a primitive value",
                PropertyKind::Complex => "a complex value",
                PropertyKind::Collection => "a collection value",
            },
        }),
        Some(_) => Ok(()),
        None if declared.open => Ok(()),
        None => Err(Error::UndeclaredProperty {
            type_name: declared.name.clone(),
            name: property.name.clone(),
        }),
    }
}
