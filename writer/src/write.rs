//! The format-agnostic writer state machine.
//!
//! [`Writer`] accepts calls in the order of a depth-first walk over a
//! feed/entry/navigation-link tree, rejects any call the current state does
//! not permit, and forwards each legal transition to its [`FormatBackend`].
//! The first error moves the writer into [`WriterState::Error`] for good.

mod duplicate;
mod recursion;
mod state;
mod value;

pub use duplicate::DuplicatePropertyNamesChecker;
pub use recursion::{DepthScope, RecursionGuard};
pub use value::{ValueSink, ValueWriter};

use odata_writer_core::{
    EntityReferenceLink, Entry, Feed, MetadataProvider, Mode, NavigationLink, Projection,
    Property, WriterState,
};
use state::{Content, LinkContent, Scope, ScopeItem, ScopeStack};
use value::{declared_type, validate_property};

use crate::backend::{FormatBackend, HookContext, PayloadContext, Position, ScopeKind};
use crate::error::{Error, Result};
use crate::output::Output;
use crate::settings::WriterSettings;

pub struct Writer<'a, B: FormatBackend> {
    backend: B,
    output: Output<'a>,
    /// Bytes produced by the backend and not yet flushed.
    buffer: Vec<u8>,
    settings: WriterSettings,
    metadata: Option<&'a dyn MetadataProvider>,
    scopes: ScopeStack<B::Scope>,
    guard: RecursionGuard,
    failed: bool,
    writing_property: bool,
    disposed: bool,
}

impl<'a, B: FormatBackend> Writer<'a, B> {
    pub fn new(backend: B, output: Output<'a>, settings: WriterSettings) -> Self {
        Self {
            backend,
            output,
            buffer: Vec::new(),
            guard: RecursionGuard::new(settings.max_nesting_depth),
            settings,
            metadata: None,
            scopes: ScopeStack::default(),
            failed: false,
            writing_property: false,
            disposed: false,
        }
    }

    /// Validates properties and navigation links against `metadata`.
    pub fn with_metadata(mut self, metadata: &'a dyn MetadataProvider) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn state(&self) -> WriterState {
        if self.failed {
            WriterState::Error
        } else if self.writing_property {
            WriterState::Property
        } else {
            self.scopes.state()
        }
    }

    pub fn mode(&self) -> Mode {
        self.settings.mode
    }

    pub fn settings(&self) -> &WriterSettings {
        &self.settings
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Current recursion depth.
    pub fn depth(&self) -> usize {
        self.guard.depth()
    }

    pub fn is_async(&self) -> bool {
        self.output.is_async()
    }

    pub fn write_start_feed(&mut self, feed: Feed) -> Result<()> {
        self.run("write_start_feed", |writer| writer.start_feed(feed))
    }

    /// Starts an entry. `None` writes an expanded but absent entry and is
    /// only valid as the content of a single-valued navigation link.
    pub fn write_start_entry(&mut self, entry: Option<Entry>) -> Result<()> {
        self.run("write_start_entry", |writer| writer.start_entry(entry))
    }

    pub fn write_property(&mut self, property: Property) -> Result<()> {
        self.run("write_property", |writer| writer.property(property))
    }

    pub fn write_start_navigation_link(&mut self, link: NavigationLink) -> Result<()> {
        self.run("write_start_navigation_link", |writer| {
            writer.start_navigation_link(link)
        })
    }

    pub fn write_entity_reference_link(&mut self, reference: EntityReferenceLink) -> Result<()> {
        self.run("write_entity_reference_link", |writer| {
            writer.entity_reference_link(reference)
        })
    }

    /// Closes the current feed, entry or navigation link.
    pub fn write_end(&mut self) -> Result<()> {
        self.run("write_end", |writer| writer.end())
    }

    /// Moves buffered bytes to a synchronous sink. Not valid once the
    /// payload is completed; [`Writer::dispose`] drains the remaining bytes.
    pub fn flush(&mut self) -> Result<()> {
        if let Err(err) = self.verify_writable("flush") {
            return Err(self.fail("flush", err));
        }
        log::trace!("[writer] flushing {} bytes", self.buffer.len());
        match self.output.flush(&mut self.buffer) {
            Ok(true) => Ok(()),
            Ok(false) => {
                let err = Error::usage(
                    self.state(),
                    "synchronous flush on an asynchronous writer",
                );
                Err(self.fail("flush", err))
            }
            Err(err) => Err(self.fail("flush", err.into())),
        }
    }

    /// Moves buffered bytes to an asynchronous sink.
    pub async fn flush_async(&mut self) -> Result<()> {
        if let Err(err) = self.verify_writable("flush_async") {
            return Err(self.fail("flush_async", err));
        }
        log::trace!("[writer] flushing {} bytes asynchronously", self.buffer.len());
        match self.output.flush_async(&mut self.buffer).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                let err = Error::usage(
                    self.state(),
                    "asynchronous flush on a synchronous writer",
                );
                Err(self.fail("flush_async", err))
            }
            Err(err) => Err(self.fail("flush_async", err.into())),
        }
    }

    /// Releases the writer. Bytes already produced reach the sink, but no
    /// structural bytes are added, so a failed payload stays truncated.
    /// Calling it again does nothing.
    pub fn dispose(&mut self) -> Result<()> {
        if !self.begin_dispose() {
            return Ok(());
        }
        if !self.output.flush(&mut self.buffer)? {
            log::warn!(
                "[writer] dropping {} unflushed bytes of an asynchronous writer",
                self.buffer.len()
            );
            self.buffer.clear();
        }
        Ok(())
    }

    pub async fn dispose_async(&mut self) -> Result<()> {
        if !self.begin_dispose() {
            return Ok(());
        }
        if !self.output.flush_async(&mut self.buffer).await? {
            self.output.flush(&mut self.buffer)?;
        }
        Ok(())
    }

    fn begin_dispose(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        self.disposed = true;
        log::trace!(
            "[writer] disposing in state {} with {} bytes pending",
            self.state(),
            self.buffer.len()
        );
        !self.buffer.is_empty()
    }

    fn run<R>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        if let Err(err) = self.verify_writable(operation) {
            return Err(self.fail(operation, err));
        }
        let result = f(self);
        self.writing_property = false;
        result.map_err(|err| self.fail(operation, err))
    }

    /// Rejects every call on a disposed or failed writer.
    fn verify_usable(&self, operation: &str) -> Result<()> {
        let state = self.state();
        if self.disposed {
            return Err(Error::usage(
                state,
                format!("{operation} called on a disposed writer"),
            ));
        }
        if state == WriterState::Error {
            return Err(Error::usage(
                state,
                format!("{operation} called after an earlier failure"),
            ));
        }
        Ok(())
    }

    fn verify_writable(&self, operation: &str) -> Result<()> {
        self.verify_usable(operation)?;
        let state = self.state();
        if state == WriterState::Completed {
            return Err(Error::usage(
                state,
                format!("{operation} called after the payload was completed"),
            ));
        }
        Ok(())
    }

    fn fail(&mut self, operation: &str, err: Error) -> Error {
        if !self.failed {
            log::warn!(
                "[writer] {operation} failed in state {}: {err}",
                self.state()
            );
            self.failed = true;
        }
        err
    }

    fn start_feed(&mut self, feed: Feed) -> Result<()> {
        let state = self.state();
        if self.settings.mode.is_request() {
            if feed.count.is_some() {
                return Err(Error::usage(
                    state,
                    "a feed count is only valid in responses",
                ));
            }
            if feed.next_link.is_some() {
                return Err(Error::usage(
                    state,
                    "a next page link is only valid in responses",
                ));
            }
        }
        match state {
            WriterState::Start => self.start_payload()?,
            WriterState::NavigationLink | WriterState::NavigationLinkWithContent => {
                self.begin_link_content(Content::Feed)?
            }
            _ => {
                return Err(Error::usage(
                    state,
                    "a feed can only be written at the top level or as navigation link content",
                ))
            }
        }
        log::debug!("[writer] start feed {:?}", feed.id);
        self.push(ScopeItem::Feed(feed))?;
        self.hook(|backend, cx, item| backend.start_feed(cx, item.as_feed()?))
    }

    fn start_entry(&mut self, entry: Option<Entry>) -> Result<()> {
        let state = self.state();
        match (state, entry.is_some()) {
            (WriterState::Start, true) => self.start_payload()?,
            (WriterState::Feed, true) => {}
            (WriterState::NavigationLink | WriterState::NavigationLinkWithContent, present) => {
                self.begin_link_content(if present {
                    Content::Entry
                } else {
                    Content::NullEntry
                })?
            }
            (WriterState::Start | WriterState::Feed, false) => {
                return Err(Error::usage(
                    state,
                    "a null entry is only valid as content of a single-valued navigation link",
                ))
            }
            _ => {
                return Err(Error::usage(
                    state,
                    "an entry can only be written at the top level, in a feed or as navigation link content",
                ))
            }
        }
        log::debug!(
            "[writer] start entry {:?}",
            entry.as_ref().map(|entry| entry.id.as_deref())
        );
        self.push(ScopeItem::Entry {
            entry,
            names: DuplicatePropertyNamesChecker::new(),
        })?;
        self.prepare_entry()?;
        self.hook(|backend, cx, item| backend.start_entry(cx, item.as_entry()?))
    }

    /// Checks the entry's own properties and drops the unselected ones.
    fn prepare_entry(&mut self) -> Result<()> {
        let metadata = self.metadata;
        let Some(Scope {
            item:
                ScopeItem::Entry {
                    entry: Some(entry),
                    names,
                },
            projection,
            skip_writing,
            ..
        }) = self.scopes.top_mut()
        else {
            return Ok(());
        };

        let declared = declared_type(metadata, entry.type_name.as_deref());
        let mut values = ValueWriter::new(&mut self.guard, metadata);
        for property in &entry.properties {
            names.check(&property.name)?;
            if let Some(declared) = declared {
                validate_property(declared, property)?;
            }
            // Values that never reach a backend are walked here so they get
            // the same nested checks as written ones.
            if *skip_writing || !projection.selects_property(&property.name) {
                values.validate(&property.value)?;
            }
        }
        entry
            .properties
            .retain(|property| projection.selects_property(&property.name));
        Ok(())
    }

    fn property(&mut self, property: Property) -> Result<()> {
        let state = self.state();
        let metadata = self.metadata;
        let Some(Scope {
            item:
                ScopeItem::Entry {
                    entry: Some(entry),
                    names,
                },
            projection,
            skip_writing,
            ..
        }) = self.scopes.top_mut()
        else {
            return Err(Error::usage(
                state,
                "a property can only be written inside a non-null entry",
            ));
        };

        names.check(&property.name)?;
        if let Some(declared) = declared_type(metadata, entry.type_name.as_deref()) {
            validate_property(declared, &property)?;
        }
        if *skip_writing || !projection.selects_property(&property.name) {
            return ValueWriter::new(&mut self.guard, metadata).validate(&property.value);
        }

        log::debug!("[writer] write property {}", property.name);
        self.writing_property = true;
        self.hook(|backend, cx, _| backend.write_property(cx, &property))
    }

    fn start_navigation_link(&mut self, mut link: NavigationLink) -> Result<()> {
        let state = self.state();
        let metadata = self.metadata;
        let Some(Scope {
            item:
                ScopeItem::Entry {
                    entry: Some(entry),
                    names,
                },
            ..
        }) = self.scopes.top_mut()
        else {
            return Err(Error::usage(
                state,
                "a navigation link can only be written inside a non-null entry",
            ));
        };

        if link.name.is_empty() {
            return Err(Error::MissingMetadata {
                link: link.name,
                message: "a navigation link needs a name",
            });
        }
        names.check(&link.name)?;

        if let Some(declared) = declared_type(metadata, entry.type_name.as_deref()) {
            match (declared.navigation_is_collection(&link.name), link.is_collection) {
                (Some(is_collection), None) => link.is_collection = Some(is_collection),
                (Some(is_collection), Some(declared_by_link)) if is_collection != declared_by_link => {
                    return Err(Error::PropertyKindMismatch {
                        name: link.name,
                        expected: if is_collection {
                            "a collection navigation link"
                        } else {
                            "a single-valued navigation link"
                        },
                    })
                }
                (Some(_), Some(_)) => {}
                (None, _) if declared.open => {}
                (None, _) => {
                    return Err(Error::UndeclaredProperty {
                        type_name: declared.name.clone(),
                        name: link.name,
                    })
                }
            }
        }

        log::debug!("[writer] start navigation link {}", link.name);
        self.push(ScopeItem::NavigationLink {
            link,
            content: LinkContent::default(),
        })
    }

    fn entity_reference_link(&mut self, reference: EntityReferenceLink) -> Result<()> {
        let state = self.state();
        let Some(link) = self.scopes.top().and_then(|scope| scope.item.link()) else {
            return Err(Error::usage(
                state,
                "entity reference links can only be written inside a navigation link",
            ));
        };
        if self.settings.mode.is_request() && reference.url.is_empty() {
            return Err(Error::MissingMetadata {
                link: link.name.clone(),
                message: "an entity reference link needs a url",
            });
        }

        self.begin_link_content(Content::Reference)?;
        log::debug!("[writer] write entity reference link {}", reference.url);
        self.hook(|backend, cx, item| {
            backend.write_entity_reference_in_navigation_link_content(
                cx,
                item.as_link()?,
                &reference,
            )
        })
    }

    fn end(&mut self) -> Result<()> {
        let state = self.state();
        match state {
            WriterState::Feed => {
                self.hook(|backend, cx, item| backend.end_feed(cx, item.as_feed()?))?
            }
            WriterState::Entry => {
                self.hook(|backend, cx, item| backend.end_entry(cx, item.as_entry()?))?
            }
            WriterState::NavigationLink => {
                if self.settings.mode.is_request() {
                    return Err(Error::usage(
                        state,
                        "a navigation link in a request needs content, deferred links are only valid in responses",
                    ));
                }
                self.hook(|backend, cx, item| {
                    backend.write_deferred_navigation_link(cx, item.as_link()?)
                })?
            }
            WriterState::NavigationLinkWithContent => self.hook(|backend, cx, item| {
                backend.end_navigation_link_with_content(cx, item.as_link()?)
            })?,
            _ => return Err(Error::usage(state, "there is no open scope to end")),
        }
        self.pop()
    }

    /// Accepts one content item for the current navigation link, announcing
    /// the content to the backend on the first one.
    fn begin_link_content(&mut self, content: Content) -> Result<()> {
        let state = self.state();
        let mode = self.settings.mode;
        let Some(Scope {
            item:
                ScopeItem::NavigationLink {
                    link,
                    content: written,
                },
            ..
        }) = self.scopes.top_mut()
        else {
            return Err(Error::usage(
                state,
                "navigation link content outside a navigation link",
            ));
        };

        written.admit(link, mode, content)?;
        if written.started {
            return Ok(());
        }
        written.started = true;
        log::debug!("[writer] start content of navigation link {}", link.name);
        self.hook(|backend, cx, item| {
            backend.start_navigation_link_with_content(cx, item.as_link()?)
        })
    }

    fn push(&mut self, item: ScopeItem) -> Result<()> {
        let kind = item.kind();
        let (skip_writing, projection, index) = match self.scopes.top_mut() {
            None => (
                false,
                self.settings.projection.clone().unwrap_or_default(),
                0,
            ),
            Some(parent) => {
                let index = parent.item_count;
                parent.item_count += 1;
                match item.link() {
                    Some(link) => match parent.projection.link(&link.name) {
                        Some(projection) => (parent.skip_writing, projection, index),
                        None => {
                            log::debug!("[writer] navigation link {} is not selected", link.name);
                            (true, Projection::all(), index)
                        }
                    },
                    None => (parent.skip_writing, parent.projection.clone(), index),
                }
            }
        };

        let depth_at_start = self.guard.depth();
        if kind != ScopeKind::NavigationLink {
            self.guard.enter()?;
        }
        let ext = self.backend.create_scope(kind);
        self.scopes.push(Scope {
            item,
            skip_writing,
            item_count: 0,
            index,
            projection,
            depth_at_start,
            ext,
        });
        Ok(())
    }

    fn pop(&mut self) -> Result<()> {
        let state = self.state();
        let Some(scope) = self.scopes.pop() else {
            return Err(Error::usage(state, "there is no open scope to end"));
        };
        if scope.item.kind() != ScopeKind::NavigationLink {
            self.guard.exit();
        }
        debug_assert_eq!(
            self.guard.depth(),
            scope.depth_at_start,
            "recursion depth must match the start of the scope"
        );
        log::debug!("[writer] end {:?}", scope.item.kind());

        if self.scopes.is_empty() {
            self.end_payload()?;
            log::debug!("[writer] payload completed");
        }
        Ok(())
    }

    fn start_payload(&mut self) -> Result<()> {
        log::debug!("[writer] start {} payload", self.settings.mode);
        let mut cx = PayloadContext {
            out: &mut self.buffer,
            settings: &self.settings,
        };
        self.backend.start_payload(&mut cx)
    }

    fn end_payload(&mut self) -> Result<()> {
        let mut cx = PayloadContext {
            out: &mut self.buffer,
            settings: &self.settings,
        };
        self.backend.end_payload(&mut cx)
    }

    /// Calls a backend hook for the current scope unless it is skipped.
    fn hook(
        &mut self,
        f: impl FnOnce(&mut B, &mut HookContext<'_, B::Scope>, &ScopeItem) -> Result<()>,
    ) -> Result<()> {
        let state = self.state();
        let depth = self.scopes.len().saturating_sub(1);
        let Some((current, parent)) = self.scopes.split_current_mut() else {
            return Err(Error::usage(state, "there is no open scope"));
        };
        if current.skip_writing {
            return Ok(());
        }

        let (parent, parent_link) = match parent {
            Some(Scope { ext, item, .. }) => (Some(ext), item.link()),
            None => (None, None),
        };
        let Scope {
            item, ext, index, ..
        } = current;
        let mut cx = HookContext {
            out: &mut self.buffer,
            settings: &self.settings,
            scope: ext,
            parent,
            parent_link,
            position: Position {
                depth,
                index: *index,
            },
            values: ValueWriter::new(&mut self.guard, self.metadata),
        };
        f(&mut self.backend, &mut cx, item)
    }
}

impl<B: FormatBackend> Drop for Writer<'_, B> {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            log::warn!("[writer] dispose on drop failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::AtomBackend;
    use crate::json::JsonBackend;
    use crate::Output;
    use odata_writer_core::{
        ComplexValue, EntityReferenceLink, ErrorKind, Model, PropertyKind, StructuredType,
    };

    fn new_writer<B: FormatBackend + Default>(
        out: &mut Vec<u8>,
        settings: WriterSettings,
    ) -> Writer<'_, B> {
        Writer::new(B::default(), Output::sync(out), settings)
    }

    fn entry() -> Entry {
        Entry::default().with_property("Name", "Alice")
    }

    fn state_transitions<B: FormatBackend + Default>() {
        let mut out = Vec::new();
        let mut writer = new_writer::<B>(&mut out, WriterSettings::request());
        assert_eq!(writer.state(), WriterState::Start);

        writer.write_start_entry(Some(entry())).unwrap();
        assert_eq!(writer.state(), WriterState::Entry);
        assert_eq!(writer.depth(), 1);

        writer
            .write_start_navigation_link(NavigationLink::new("Orders").collection(true))
            .unwrap();
        assert_eq!(writer.state(), WriterState::NavigationLink);
        assert_eq!(writer.depth(), 1);

        writer
            .write_entity_reference_link(EntityReferenceLink::new("Orders(1)"))
            .unwrap();
        assert_eq!(writer.state(), WriterState::NavigationLinkWithContent);

        writer.write_start_feed(Feed::default()).unwrap();
        assert_eq!(writer.state(), WriterState::Feed);
        assert_eq!(writer.depth(), 2);
        writer.write_end().unwrap();
        assert_eq!(writer.state(), WriterState::NavigationLinkWithContent);

        writer.write_end().unwrap();
        assert_eq!(writer.state(), WriterState::Entry);
        writer.write_end().unwrap();
        assert_eq!(writer.state(), WriterState::Completed);
        assert_eq!(writer.depth(), 0);
    }

    fn duplicate_property_fails<B: FormatBackend + Default>() {
        let mut out = Vec::new();
        let mut writer = new_writer::<B>(&mut out, WriterSettings::response());
        writer.write_start_entry(Some(entry())).unwrap();
        let err = writer
            .write_property(Property::new("Name", "Bob"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateProperty);
        assert_eq!(writer.state(), WriterState::Error);

        let err = writer.write_end().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(writer.state(), WriterState::Error);
    }

    fn link_name_shares_checker<B: FormatBackend + Default>() {
        let mut out = Vec::new();
        let mut writer = new_writer::<B>(&mut out, WriterSettings::response());
        writer.write_start_entry(Some(entry())).unwrap();
        let err = writer
            .write_start_navigation_link(NavigationLink::new("Name").with_url("x"))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateProperty { name } if name == "Name"));
    }

    fn deferred_link_in_request_fails<B: FormatBackend + Default>() {
        let mut out = Vec::new();
        let mut writer = new_writer::<B>(&mut out, WriterSettings::request());
        writer.write_start_entry(Some(entry())).unwrap();
        writer
            .write_start_navigation_link(NavigationLink::new("Orders").with_url("x"))
            .unwrap();
        let err = writer.write_end().unwrap_err();
        assert!(matches!(
            err,
            Error::Usage {
                state: WriterState::NavigationLink,
                ..
            }
        ));
    }

    fn reference_in_response_fails<B: FormatBackend + Default>() {
        let mut out = Vec::new();
        let mut writer = new_writer::<B>(&mut out, WriterSettings::response());
        writer.write_start_entry(Some(entry())).unwrap();
        writer
            .write_start_navigation_link(NavigationLink::new("Orders").with_url("x"))
            .unwrap();
        let err = writer
            .write_entity_reference_link(EntityReferenceLink::new("Orders(1)"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    fn request_feed_rejects_count<B: FormatBackend + Default>() {
        let mut out = Vec::new();
        let mut writer = new_writer::<B>(&mut out, WriterSettings::request());
        let feed = Feed {
            count: Some(1),
            ..Default::default()
        };
        assert_eq!(
            writer.write_start_feed(feed).unwrap_err().kind(),
            ErrorKind::Usage
        );
        assert!(out_is_empty(&writer));
    }

    fn out_is_empty<B: FormatBackend>(writer: &Writer<'_, B>) -> bool {
        writer.buffer.is_empty()
    }

    fn completed_writer_rejects_writes<B: FormatBackend + Default>() {
        let mut out = Vec::new();
        let mut writer = new_writer::<B>(&mut out, WriterSettings::response());
        writer.write_start_entry(Some(entry())).unwrap();
        writer.write_end().unwrap();
        let err = writer.write_start_entry(Some(entry())).unwrap_err();
        assert!(matches!(
            err,
            Error::Usage {
                state: WriterState::Completed,
                ..
            }
        ));
    }

    fn completed_writer_rejects_flush<B: FormatBackend + Default>() {
        let mut out = Vec::new();
        {
            let mut writer = new_writer::<B>(&mut out, WriterSettings::response());
            writer.write_start_entry(Some(entry())).unwrap();
            writer.flush().unwrap();
            writer.write_end().unwrap();
            assert_eq!(writer.state(), WriterState::Completed);

            let err = writer.flush().unwrap_err();
            assert!(matches!(
                err,
                Error::Usage {
                    state: WriterState::Completed,
                    ..
                }
            ));
            assert_eq!(writer.state(), WriterState::Error);
            // Disposing still drains the closing bytes.
            writer.dispose().unwrap();
        }
        assert!(!out.is_empty());
        let rendered = String::from_utf8(out).unwrap();
        assert!(rendered.ends_with('}') || rendered.ends_with("</entry>"));
    }

    fn nesting_limit<B: FormatBackend + Default>() {
        let mut out = Vec::new();
        let mut writer = new_writer::<B>(
            &mut out,
            WriterSettings::response().with_max_nesting_depth(2),
        );
        writer.write_start_entry(Some(entry())).unwrap();
        writer
            .write_start_navigation_link(NavigationLink::new("Manager").with_url("m"))
            .unwrap();
        writer.write_start_entry(Some(entry())).unwrap();
        assert_eq!(writer.depth(), 2);
        writer
            .write_start_navigation_link(NavigationLink::new("Manager").with_url("m"))
            .unwrap();
        let err = writer.write_start_entry(Some(entry())).unwrap_err();
        assert!(matches!(err, Error::NestingTooDeep { max_depth: 2 }));
        assert_eq!(writer.depth(), 2);
    }

    fn property_outside_entry_fails<B: FormatBackend + Default>() {
        let mut out = Vec::new();
        let mut writer = new_writer::<B>(&mut out, WriterSettings::response());
        writer.write_start_feed(Feed::default()).unwrap();
        let err = writer
            .write_property(Property::new("Name", "x"))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Usage {
                state: WriterState::Feed,
                ..
            }
        ));
    }

    fn metadata_validation<B: FormatBackend + Default>() {
        let model = Model::new().with_type(
            StructuredType::new("NS.Customer")
                .with_property("Name", PropertyKind::Primitive)
                .with_navigation("Orders", true),
        );
        let typed = || Entry::default().with_type_name("NS.Customer");

        let mut out = Vec::new();
        let mut writer = new_writer::<B>(&mut out, WriterSettings::request()).with_metadata(&model);
        writer.write_start_entry(Some(typed())).unwrap();
        // Collection-ness comes from the declared navigation property.
        writer
            .write_start_navigation_link(NavigationLink::new("Orders"))
            .unwrap();
        writer
            .write_entity_reference_link(EntityReferenceLink::new("Orders(1)"))
            .unwrap();
        writer.write_end().unwrap();
        let err = writer
            .write_property(Property::new("Age", 3))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Metadata);
        drop(writer);

        let mut out = Vec::new();
        let mut writer = new_writer::<B>(&mut out, WriterSettings::request()).with_metadata(&model);
        let err = writer
            .write_start_entry(Some(
                typed().with_property("Name", ComplexValue::default().with_property("Inner", 1)),
            ))
            .unwrap_err();
        assert!(matches!(err, Error::PropertyKindMismatch { .. }));
    }

    macro_rules! test_each_format {
        ($($scenario:ident),* $(,)?) => {
            $(
                paste::paste! {
                    #[test]
                    fn [<test_ $scenario _atom>]() {
                        $scenario::<AtomBackend>();
                    }

                    #[test]
                    fn [<test_ $scenario _json>]() {
                        $scenario::<JsonBackend>();
                    }
                }
            )*
        };
    }

    test_each_format!(
        state_transitions,
        duplicate_property_fails,
        link_name_shares_checker,
        deferred_link_in_request_fails,
        reference_in_response_fails,
        request_feed_rejects_count,
        completed_writer_rejects_writes,
        completed_writer_rejects_flush,
        nesting_limit,
        property_outside_entry_fails,
        metadata_validation,
    );

    #[test]
    fn test_projection_skips_unselected_content() {
        let projection = Projection::all()
            .with_properties(["Name"])
            .with_link("Orders", Projection::all().with_properties(["ID"]));
        let mut out = Vec::new();
        {
            let mut writer = new_writer::<JsonBackend>(
                &mut out,
                WriterSettings::request().with_projection(projection),
            );
            writer
                .write_start_entry(Some(entry().with_property("Age", 3)))
                .unwrap();
            writer.write_property(Property::new("Phone", "555")).unwrap();
            writer
                .write_start_navigation_link(NavigationLink::new("Manager").collection(false))
                .unwrap();
            writer
                .write_start_entry(Some(entry().with_property("Age", 50)))
                .unwrap();
            writer.write_end().unwrap();
            writer.write_end().unwrap();
            writer
                .write_start_navigation_link(NavigationLink::new("Orders").collection(true))
                .unwrap();
            writer.write_start_feed(Feed::default()).unwrap();
            writer
                .write_start_entry(Some(Entry::default().with_property("ID", 1).with_property("Total", 2)))
                .unwrap();
            writer.write_end().unwrap();
            writer.write_end().unwrap();
            writer.write_end().unwrap();
            writer.write_end().unwrap();
            writer.dispose().unwrap();
        }
        assert_eq!(out, br#"{"Name":"Alice","Orders":[{"ID":1}]}"#);
    }

    #[test]
    fn test_skipped_content_is_still_checked() {
        let projection = Projection::all().with_link("Orders", Projection::all());
        let mut out = Vec::new();
        let mut writer = new_writer::<JsonBackend>(
            &mut out,
            WriterSettings::response().with_projection(projection),
        );
        writer.write_start_entry(Some(entry())).unwrap();
        writer
            .write_start_navigation_link(NavigationLink::new("Manager").with_url("m"))
            .unwrap();
        writer
            .write_start_entry(Some(entry().with_property("Name", "Bob")))
            .unwrap_err();
        assert_eq!(writer.state(), WriterState::Error);
    }

    #[test]
    fn test_open_entity_type_accepts_undeclared_members() {
        let model = Model::new().with_type(
            StructuredType::new("NS.Customer")
                .open()
                .with_property("Name", PropertyKind::Primitive)
                .with_navigation("Orders", true),
        );
        let mut out = Vec::new();
        {
            let mut writer = new_writer::<JsonBackend>(&mut out, WriterSettings::request())
                .with_metadata(&model);
            writer
                .write_start_entry(Some(
                    entry()
                        .with_type_name("NS.Customer")
                        .with_property("Nickname", "Al"),
                ))
                .unwrap();
            writer.write_property(Property::new("Score", 7)).unwrap();
            writer
                .write_start_navigation_link(NavigationLink::new("Referrer").collection(false))
                .unwrap();
            writer
                .write_entity_reference_link(EntityReferenceLink::new("Customers(9)"))
                .unwrap();
            writer.write_end().unwrap();

            // Declared members keep their declared shape on an open type.
            let err = writer
                .write_start_navigation_link(NavigationLink::new("Orders").collection(false))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Metadata);
        }
        assert_eq!(
            out,
            br#"{"__metadata":{"type":"NS.Customer"},"Name":"Alice","Nickname":"Al","Score":7,"Referrer":{"__metadata":{"uri":"Customers(9)"}}"#
        );
    }

    #[test]
    fn test_unselected_properties_are_still_checked() {
        let repeated = || {
            ComplexValue::default()
                .with_property("X", 1)
                .with_property("X", 2)
        };
        let projection = || Projection::all().with_properties(["Name"]);

        let mut out = Vec::new();
        let mut writer = new_writer::<JsonBackend>(
            &mut out,
            WriterSettings::response().with_projection(projection()),
        );
        let err = writer
            .write_start_entry(Some(entry().with_property("Addr", repeated())))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateProperty { ref name } if name == "X"));
        assert_eq!(writer.state(), WriterState::Error);
        drop(writer);

        let mut out = Vec::new();
        let mut writer = new_writer::<JsonBackend>(
            &mut out,
            WriterSettings::response().with_projection(projection()),
        );
        writer.write_start_entry(Some(entry())).unwrap();
        let err = writer
            .write_property(Property::new("Addr", repeated()))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateProperty { ref name } if name == "X"));
    }

    #[test]
    fn test_flush_mode_must_match_output() {
        let mut sink = futures::io::Cursor::new(Vec::new());
        let mut writer = Writer::new(
            JsonBackend,
            Output::asynchronous(&mut sink),
            WriterSettings::request(),
        );
        assert!(writer.is_async());
        writer.write_start_entry(Some(entry())).unwrap();
        let err = writer.flush().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(writer.state(), WriterState::Error);
    }

    #[test]
    fn test_async_flush_and_dispose() {
        let mut sink = futures::io::Cursor::new(Vec::new());
        {
            let mut writer = Writer::new(
                JsonBackend,
                Output::asynchronous(&mut sink),
                WriterSettings::request(),
            );
            writer.write_start_entry(Some(entry())).unwrap();
            futures::executor::block_on(writer.flush_async()).unwrap();
            writer.write_end().unwrap();
            futures::executor::block_on(writer.dispose_async()).unwrap();
            futures::executor::block_on(writer.dispose_async()).unwrap();
            let err = writer.write_end().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Usage);
        }
        assert_eq!(sink.into_inner(), br#"{"Name":"Alice"}"#);
    }

    #[test]
    fn test_dispose_keeps_truncated_payload() {
        let mut out = Vec::new();
        {
            let mut writer = new_writer::<JsonBackend>(&mut out, WriterSettings::request());
            writer.write_start_entry(Some(entry())).unwrap();
            writer.dispose().unwrap();
            writer.dispose().unwrap();
            assert!(writer.write_end().is_err());
        }
        assert_eq!(out, br#"{"Name":"Alice""#);
    }
}
