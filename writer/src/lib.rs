//! A format-agnostic OData payload writer.
//!
//! [`Writer`] enforces the legal order of calls for feeds, entries,
//! navigation links and entity reference links, in request or response
//! mode, and hands every legal transition to a [`FormatBackend`]. The
//! [`atom`] and [`json`] modules provide the two wire formats.
//!
//! ```
//! use odata_writer::{json::JsonBackend, Entry, Output, Writer, WriterSettings};
//!
//! let mut out = Vec::new();
//! {
//!     let mut writer = Writer::new(JsonBackend::default(), Output::sync(&mut out), WriterSettings::request());
//!     writer.write_start_entry(Some(Entry::default().with_property("Name", "Alice"))).unwrap();
//!     writer.write_end().unwrap();
//!     writer.dispose().unwrap();
//! }
//! assert_eq!(out, br#"{"Name":"Alice"}"#);
//! ```

pub mod atom;
pub mod backend;
mod error;
pub mod json;
mod output;
mod settings;
pub mod write;

pub use backend::{FormatBackend, HookContext, PayloadContext, Position, ScopeKind};
pub use error::{BackendError, Error, Result};
pub use output::Output;
pub use settings::{WriterSettings, DEFAULT_MAX_NESTING_DEPTH};
pub use write::{ValueSink, ValueWriter, Writer};

pub use odata_writer_core::{
    CollectionValue, ComplexValue, EntityReferenceLink, Entry, ErrorKind, Feed, MetadataProvider,
    Mode, Model, NavigationLink, Projection, Property, PropertyKind, StructuredType, Value,
    WriterState,
};
