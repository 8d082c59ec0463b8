//! The hooks a wire format implements.
//!
//! The writer decides legality; a backend only turns each legal transition
//! into bytes. Every hook is called exactly once per transition, never for
//! scopes excluded by a projection.

use odata_writer_core::{EntityReferenceLink, Entry, Feed, NavigationLink, Property};

use crate::error::Result;
use crate::settings::WriterSettings;
use crate::write::ValueWriter;

/// The kind of scope a backend is asked to create bookkeeping for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Feed,
    Entry,
    NavigationLink,
}

/// Where the current scope sits in the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Number of enclosing scopes; 0 for the top-level feed or entry.
    pub depth: usize,
    /// Number of siblings written before this scope within its parent.
    pub index: usize,
}

impl Position {
    pub fn is_top_level(&self) -> bool {
        self.depth == 0
    }
}

/// What the payload-level hooks see.
pub struct PayloadContext<'c> {
    pub out: &'c mut Vec<u8>,
    pub settings: &'c WriterSettings,
}

/// What a scope-level hook sees.
pub struct HookContext<'c, S> {
    /// Buffered output, drained into the sink on flush.
    pub out: &'c mut Vec<u8>,
    pub settings: &'c WriterSettings,
    /// Backend bookkeeping of the scope the hook is about. For link hooks
    /// this is the link's scope.
    pub scope: &'c mut S,
    /// Backend bookkeeping of the enclosing scope.
    pub parent: Option<&'c mut S>,
    /// The navigation link whose content is being written, if any.
    pub parent_link: Option<&'c NavigationLink>,
    pub position: Position,
    pub values: ValueWriter<'c>,
}

pub trait FormatBackend {
    /// Per-scope fields the backend keeps, opaque to the writer.
    type Scope;

    fn create_scope(&mut self, kind: ScopeKind) -> Self::Scope;

    fn start_payload(&mut self, cx: &mut PayloadContext<'_>) -> Result<()>;
    fn end_payload(&mut self, cx: &mut PayloadContext<'_>) -> Result<()>;

    fn start_feed(&mut self, cx: &mut HookContext<'_, Self::Scope>, feed: &Feed) -> Result<()>;
    fn end_feed(&mut self, cx: &mut HookContext<'_, Self::Scope>, feed: &Feed) -> Result<()>;

    /// `None` is an expanded but absent entry of a single-valued link.
    fn start_entry(
        &mut self,
        cx: &mut HookContext<'_, Self::Scope>,
        entry: Option<&Entry>,
    ) -> Result<()>;
    fn end_entry(
        &mut self,
        cx: &mut HookContext<'_, Self::Scope>,
        entry: Option<&Entry>,
    ) -> Result<()>;

    /// A property written after its entry has started.
    fn write_property(
        &mut self,
        cx: &mut HookContext<'_, Self::Scope>,
        property: &Property,
    ) -> Result<()>;

    fn write_deferred_navigation_link(
        &mut self,
        cx: &mut HookContext<'_, Self::Scope>,
        link: &NavigationLink,
    ) -> Result<()>;
    fn start_navigation_link_with_content(
        &mut self,
        cx: &mut HookContext<'_, Self::Scope>,
        link: &NavigationLink,
    ) -> Result<()>;
    fn end_navigation_link_with_content(
        &mut self,
        cx: &mut HookContext<'_, Self::Scope>,
        link: &NavigationLink,
    ) -> Result<()>;

    fn write_entity_reference_in_navigation_link_content(
        &mut self,
        cx: &mut HookContext<'_, Self::Scope>,
        link: &NavigationLink,
        reference: &EntityReferenceLink,
    ) -> Result<()>;
}
