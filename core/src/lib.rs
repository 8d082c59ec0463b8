//! Low-level primitives of the OData payload writer.
//!
//! Nothing in this crate knows about a concrete wire format. It holds the
//! logical items a caller hands to the writer, the writer's state and error
//! taxonomy, the read-only metadata oracle consulted for validation, and the
//! projection tree used to drop unselected properties and links.

pub mod item;
pub mod metadata;
pub mod projection;
pub mod write;

pub use item::{
    CollectionValue, ComplexValue, EntityReferenceLink, Entry, Feed, NavigationLink, Property,
    Value,
};
pub use metadata::{MetadataProvider, Model, PropertyKind, StructuredType};
pub use projection::Projection;
pub use write::{ErrorKind, Mode, WriterState};
