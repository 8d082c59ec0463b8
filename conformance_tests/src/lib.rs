use std::fmt::Display;

use odata_writer::{
    CollectionValue, ComplexValue, EntityReferenceLink, Entry, ErrorKind, Feed, FormatBackend,
    HookContext, NavigationLink, Output, PayloadContext, Property, Result, ScopeKind, Value,
    ValueSink, Writer, WriterSettings, WriterState,
};
use serde::Deserialize;

/// One backend hook invocation, in the order the writer made it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hook {
    StartPayload,
    EndPayload,
    StartFeed,
    EndFeed,
    StartEntry(Option<String>),
    StartNullEntry,
    EndEntry,
    Property(String),
    DeferredLink(String),
    StartLinkContent(String),
    EndLinkContent(String),
    Reference(String),
}

impl Hook {
    fn name(&self) -> &'static str {
        match self {
            Hook::StartPayload => "start_payload",
            Hook::EndPayload => "end_payload",
            Hook::StartFeed => "start_feed",
            Hook::EndFeed => "end_feed",
            Hook::StartEntry(_) | Hook::StartNullEntry => "start_entry",
            Hook::EndEntry => "end_entry",
            Hook::Property(_) => "property",
            Hook::DeferredLink(_) => "deferred",
            Hook::StartLinkContent(_) => "start_link",
            Hook::EndLinkContent(_) => "end_link",
            Hook::Reference(_) => "reference",
        }
    }

    /// Whether this hook opens a level that a later hook closes.
    pub fn opens(&self) -> bool {
        matches!(
            self,
            Hook::StartPayload
                | Hook::StartFeed
                | Hook::StartEntry(_)
                | Hook::StartNullEntry
                | Hook::StartLinkContent(_)
        )
    }

    pub fn closes(&self) -> bool {
        matches!(
            self,
            Hook::EndPayload | Hook::EndFeed | Hook::EndEntry | Hook::EndLinkContent(_)
        )
    }
}

impl Display for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Hook::StartEntry(None) => f.write_str(self.name()),
            Hook::StartEntry(Some(arg))
            | Hook::Property(arg)
            | Hook::DeferredLink(arg)
            | Hook::StartLinkContent(arg)
            | Hook::EndLinkContent(arg)
            | Hook::Reference(arg) => write!(f, "{}({arg})", self.name()),
            Hook::StartNullEntry => write!(f, "{}(null)", self.name()),
            _ => f.write_str(self.name()),
        }
    }
}

/// A backend that records every hook, and echoes it to the output one per
/// line, instead of producing a wire format.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    hooks: Vec<Hook>,
    /// Name of a hook that fails with an I/O error instead of recording.
    fail_on: Option<&'static str>,
}

impl RecordingBackend {
    pub fn failing_on(hook: &'static str) -> Self {
        Self {
            fail_on: Some(hook),
            ..Default::default()
        }
    }

    pub fn hooks(&self) -> &[Hook] {
        &self.hooks
    }

    fn record(&mut self, out: &mut Vec<u8>, hook: Hook) -> Result<()> {
        if self.fail_on == Some(hook.name()) {
            return Err(std::io::Error::other(format!("{hook} failed")).into());
        }
        out.extend_from_slice(format!("{hook}\n").as_bytes());
        self.hooks.push(hook);
        Ok(())
    }
}

/// Walks values so nested checks run, without recording them.
struct IgnoreValues;

impl ValueSink for IgnoreValues {
    fn begin_property(&mut self, _index: usize, _property: &Property) -> Result<()> {
        Ok(())
    }

    fn end_property(&mut self, _property: &Property) -> Result<()> {
        Ok(())
    }

    fn begin_item(&mut self, _index: usize, _item: &Value) -> Result<()> {
        Ok(())
    }

    fn end_item(&mut self, _item: &Value) -> Result<()> {
        Ok(())
    }

    fn primitive(&mut self, _value: &Value) -> Result<()> {
        Ok(())
    }

    fn begin_complex(&mut self, _value: &ComplexValue) -> Result<()> {
        Ok(())
    }

    fn end_complex(&mut self, _value: &ComplexValue) -> Result<()> {
        Ok(())
    }

    fn begin_collection(&mut self, _value: &CollectionValue) -> Result<()> {
        Ok(())
    }

    fn end_collection(&mut self, _value: &CollectionValue) -> Result<()> {
        Ok(())
    }
}

impl FormatBackend for RecordingBackend {
    type Scope = ScopeKind;

    fn create_scope(&mut self, kind: ScopeKind) -> ScopeKind {
        kind
    }

    fn start_payload(&mut self, cx: &mut PayloadContext<'_>) -> Result<()> {
        self.record(cx.out, Hook::StartPayload)
    }

    fn end_payload(&mut self, cx: &mut PayloadContext<'_>) -> Result<()> {
        self.record(cx.out, Hook::EndPayload)
    }

    fn start_feed(&mut self, cx: &mut HookContext<'_, ScopeKind>, _feed: &Feed) -> Result<()> {
        assert_eq!(*cx.scope, ScopeKind::Feed);
        self.record(cx.out, Hook::StartFeed)
    }

    fn end_feed(&mut self, cx: &mut HookContext<'_, ScopeKind>, _feed: &Feed) -> Result<()> {
        assert_eq!(*cx.scope, ScopeKind::Feed);
        self.record(cx.out, Hook::EndFeed)
    }

    fn start_entry(
        &mut self,
        cx: &mut HookContext<'_, ScopeKind>,
        entry: Option<&Entry>,
    ) -> Result<()> {
        assert_eq!(*cx.scope, ScopeKind::Entry);
        let Some(entry) = entry else {
            return self.record(cx.out, Hook::StartNullEntry);
        };
        self.record(cx.out, Hook::StartEntry(entry.id.clone()))?;
        for (index, property) in entry.properties.iter().enumerate() {
            cx.values.write_property(&mut IgnoreValues, index, property)?;
            self.record(cx.out, Hook::Property(property.name.clone()))?;
        }
        Ok(())
    }

    fn end_entry(
        &mut self,
        cx: &mut HookContext<'_, ScopeKind>,
        _entry: Option<&Entry>,
    ) -> Result<()> {
        assert_eq!(*cx.scope, ScopeKind::Entry);
        self.record(cx.out, Hook::EndEntry)
    }

    fn write_property(
        &mut self,
        cx: &mut HookContext<'_, ScopeKind>,
        property: &Property,
    ) -> Result<()> {
        cx.values.write_property(&mut IgnoreValues, 0, property)?;
        self.record(cx.out, Hook::Property(property.name.clone()))
    }

    fn write_deferred_navigation_link(
        &mut self,
        cx: &mut HookContext<'_, ScopeKind>,
        link: &NavigationLink,
    ) -> Result<()> {
        self.record(cx.out, Hook::DeferredLink(link.name.clone()))
    }

    fn start_navigation_link_with_content(
        &mut self,
        cx: &mut HookContext<'_, ScopeKind>,
        link: &NavigationLink,
    ) -> Result<()> {
        assert_eq!(*cx.scope, ScopeKind::NavigationLink);
        self.record(cx.out, Hook::StartLinkContent(link.name.clone()))
    }

    fn end_navigation_link_with_content(
        &mut self,
        cx: &mut HookContext<'_, ScopeKind>,
        link: &NavigationLink,
    ) -> Result<()> {
        self.record(cx.out, Hook::EndLinkContent(link.name.clone()))
    }

    fn write_entity_reference_in_navigation_link_content(
        &mut self,
        cx: &mut HookContext<'_, ScopeKind>,
        _link: &NavigationLink,
        reference: &EntityReferenceLink,
    ) -> Result<()> {
        self.record(cx.out, Hook::Reference(reference.url.clone()))
    }
}

/// One writer call of a scripted test case.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum Call {
    StartFeed(Feed),
    StartEntry {
        #[serde(default)]
        id: Option<String>,
        /// Names of Int32 properties carried by the entry.
        #[serde(default)]
        properties: Vec<String>,
        #[serde(default)]
        null: bool,
    },
    Property {
        name: String,
    },
    StartLink(NavigationLink),
    Reference(EntityReferenceLink),
    End,
}

impl Call {
    pub fn apply<B: FormatBackend>(&self, writer: &mut Writer<'_, B>) -> Result<()> {
        match self {
            Call::StartFeed(feed) => writer.write_start_feed(feed.clone()),
            Call::StartEntry { null: true, .. } => writer.write_start_entry(None),
            Call::StartEntry { id, properties, .. } => {
                let entry = properties.iter().zip(0..).fold(
                    Entry {
                        id: id.clone(),
                        ..Default::default()
                    },
                    |entry, (name, value)| entry.with_property(name.as_str(), value),
                );
                writer.write_start_entry(Some(entry))
            }
            Call::Property { name } => writer.write_property(Property::new(name.as_str(), 0)),
            Call::StartLink(link) => writer.write_start_navigation_link(link.clone()),
            Call::Reference(reference) => writer.write_entity_reference_link(reference.clone()),
            Call::End => writer.write_end(),
        }
    }
}

/// What a scripted run left behind.
#[derive(Debug)]
pub struct Replay {
    pub hooks: Vec<Hook>,
    /// Kind of the first error; the script stops there.
    pub error: Option<ErrorKind>,
    pub state: WriterState,
    /// Everything the backend wrote, flushed or disposed into the sink.
    pub output: String,
}

/// Runs `calls` against a fresh synchronous writer.
pub fn replay(settings: WriterSettings, calls: &[Call]) -> Replay {
    let mut out = Vec::new();
    let (hooks, error, state) = {
        let mut writer = Writer::new(RecordingBackend::default(), Output::sync(&mut out), settings);
        let error = calls
            .iter()
            .find_map(|call| call.apply(&mut writer).err())
            .map(|err| err.kind());
        // Disposing keeps whatever was produced before a failure.
        let state = writer.state();
        let hooks = writer.backend().hooks().to_vec();
        if let Err(err) = writer.dispose() {
            panic!("dispose failed: {err}");
        }
        (hooks, error, state)
    };
    Replay {
        hooks,
        error,
        state,
        output: String::from_utf8_lossy(&out).into_owned(),
    }
}
