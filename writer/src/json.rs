//! Verbose JSON rendering.
//!
//! Responses are wrapped in `{"d": ...}` and write feeds as objects holding
//! `results`; requests write feeds as bare arrays. In a request, the content
//! of a collection navigation link is a single array shared by reference
//! links and the entries of the expanded feed.

use odata_writer_core::{
    CollectionValue, ComplexValue, EntityReferenceLink, Entry, Feed, NavigationLink, Property,
    Value,
};

use crate::backend::{FormatBackend, HookContext, PayloadContext, ScopeKind};
use crate::error::{BackendError, Result};
use crate::write::ValueSink;

#[derive(Debug, Default)]
pub struct JsonBackend;

#[derive(Debug, Default)]
pub struct JsonScope {
    /// Members of an entry object or elements of a feed or link array.
    written: usize,
    /// A request collection link has opened its array.
    array_open: bool,
    /// A request feed writing into its navigation link's array.
    shared: bool,
}

impl FormatBackend for JsonBackend {
    type Scope = JsonScope;

    fn create_scope(&mut self, _kind: ScopeKind) -> JsonScope {
        JsonScope::default()
    }

    fn start_payload(&mut self, cx: &mut PayloadContext<'_>) -> Result<()> {
        if cx.settings.mode.is_response() {
            cx.out.extend_from_slice(br#"{"d":"#);
        }
        Ok(())
    }

    fn end_payload(&mut self, cx: &mut PayloadContext<'_>) -> Result<()> {
        if cx.settings.mode.is_response() {
            cx.out.push(b'}');
        }
        Ok(())
    }

    fn start_feed(&mut self, cx: &mut HookContext<'_, JsonScope>, feed: &Feed) -> Result<()> {
        if cx.settings.mode.is_request() {
            match (cx.parent_link, cx.parent.as_deref_mut()) {
                (Some(_), Some(link)) => {
                    cx.scope.shared = true;
                    cx.scope.written = link.written;
                }
                _ => cx.out.push(b'['),
            }
            return Ok(());
        }

        cx.out.push(b'{');
        if let Some(count) = feed.count {
            cx.out.extend_from_slice(br#""__count":"#);
            write_string(cx.out, &count.to_string())?;
            cx.out.push(b',');
        }
        cx.out.extend_from_slice(br#""results":["#);
        Ok(())
    }

    fn end_feed(&mut self, cx: &mut HookContext<'_, JsonScope>, feed: &Feed) -> Result<()> {
        if cx.scope.shared {
            if let Some(link) = cx.parent.as_deref_mut() {
                link.written = cx.scope.written;
            }
            return Ok(());
        }

        cx.out.push(b']');
        if cx.settings.mode.is_response() {
            if let Some(next_link) = &feed.next_link {
                cx.out.extend_from_slice(br#","__next":"#);
                write_string(cx.out, next_link)?;
            }
            cx.out.push(b'}');
        }
        Ok(())
    }

    fn start_entry(
        &mut self,
        cx: &mut HookContext<'_, JsonScope>,
        entry: Option<&Entry>,
    ) -> Result<()> {
        if cx.parent_link.is_none() {
            if let Some(feed) = cx.parent.as_deref_mut() {
                separator(cx.out, &mut feed.written);
            }
        }
        let Some(entry) = entry else {
            cx.out.extend_from_slice(b"null");
            return Ok(());
        };

        cx.out.push(b'{');
        let metadata: Vec<(&str, &str)> = [
            ("uri", entry.edit_link.as_ref().or(entry.id.as_ref())),
            ("type", entry.type_name.as_ref()),
            ("etag", entry.etag.as_ref()),
        ]
        .into_iter()
        .filter_map(|(key, value)| Some((key, value?.as_str())))
        .collect();
        if !metadata.is_empty() {
            write_key(cx.out, &mut cx.scope.written, "__metadata")?;
            write_object(cx.out, &metadata)?;
        }

        let mut sink = JsonSink::new(cx.out, cx.scope.written);
        for (index, property) in entry.properties.iter().enumerate() {
            cx.values.write_property(&mut sink, index, property)?;
        }
        cx.scope.written = sink.written();
        Ok(())
    }

    fn end_entry(
        &mut self,
        cx: &mut HookContext<'_, JsonScope>,
        entry: Option<&Entry>,
    ) -> Result<()> {
        if entry.is_some() {
            cx.out.push(b'}');
        }
        Ok(())
    }

    fn write_property(
        &mut self,
        cx: &mut HookContext<'_, JsonScope>,
        property: &Property,
    ) -> Result<()> {
        let index = cx.scope.written;
        let mut sink = JsonSink::new(cx.out, cx.scope.written);
        cx.values.write_property(&mut sink, index, property)?;
        cx.scope.written = sink.written();
        Ok(())
    }

    fn write_deferred_navigation_link(
        &mut self,
        cx: &mut HookContext<'_, JsonScope>,
        link: &NavigationLink,
    ) -> Result<()> {
        let url = link.url.as_deref().ok_or_else(|| BackendError::MissingUrl {
            format: "json",
            link: link.name.clone(),
        })?;
        write_link_key(cx, link)?;
        cx.out.extend_from_slice(br#"{"__deferred":"#);
        write_object(cx.out, &[("uri", url)])?;
        cx.out.push(b'}');
        Ok(())
    }

    fn start_navigation_link_with_content(
        &mut self,
        cx: &mut HookContext<'_, JsonScope>,
        link: &NavigationLink,
    ) -> Result<()> {
        write_link_key(cx, link)?;
        if cx.settings.mode.is_request() && link.is_collection == Some(true) {
            cx.out.push(b'[');
            cx.scope.array_open = true;
        }
        Ok(())
    }

    fn end_navigation_link_with_content(
        &mut self,
        cx: &mut HookContext<'_, JsonScope>,
        _link: &NavigationLink,
    ) -> Result<()> {
        if cx.scope.array_open {
            cx.out.push(b']');
        }
        Ok(())
    }

    fn write_entity_reference_in_navigation_link_content(
        &mut self,
        cx: &mut HookContext<'_, JsonScope>,
        _link: &NavigationLink,
        reference: &EntityReferenceLink,
    ) -> Result<()> {
        if cx.scope.array_open {
            separator(cx.out, &mut cx.scope.written);
        }
        cx.out.extend_from_slice(br#"{"__metadata":"#);
        write_object(cx.out, &[("uri", reference.url.as_str())])?;
        cx.out.push(b'}');
        Ok(())
    }
}

/// Writes the link's member name into the enclosing entry object.
fn write_link_key(cx: &mut HookContext<'_, JsonScope>, link: &NavigationLink) -> Result<()> {
    let mut detached = 0;
    let written = match cx.parent.as_deref_mut() {
        Some(entry) => &mut entry.written,
        None => &mut detached,
    };
    write_key(cx.out, written, &link.name)
}

fn separator(out: &mut Vec<u8>, written: &mut usize) {
    if *written > 0 {
        out.push(b',');
    }
    *written += 1;
}

fn write_string(out: &mut Vec<u8>, value: &str) -> Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    Ok(())
}

fn write_key(out: &mut Vec<u8>, written: &mut usize, key: &str) -> Result<()> {
    separator(out, written);
    write_string(out, key)?;
    out.push(b':');
    Ok(())
}

/// Writes a flat object of string members in the given order.
fn write_object(out: &mut Vec<u8>, members: &[(&str, &str)]) -> Result<()> {
    out.push(b'{');
    let mut written = 0;
    for (key, value) in members {
        write_key(out, &mut written, key)?;
        write_string(out, value)?;
    }
    out.push(b'}');
    Ok(())
}

/// Writes values as JSON, tracking separators per open container.
struct JsonSink<'b> {
    out: &'b mut Vec<u8>,
    written: Vec<usize>,
}

impl<'b> JsonSink<'b> {
    /// Continues an object that already holds `written` members.
    fn new(out: &'b mut Vec<u8>, written: usize) -> Self {
        Self {
            out,
            written: vec![written],
        }
    }

    fn written(&self) -> usize {
        self.written.first().copied().unwrap_or_default()
    }

    fn separator(&mut self) {
        if let Some(written) = self.written.last_mut() {
            separator(self.out, written);
        }
    }
}

impl ValueSink for JsonSink<'_> {
    fn begin_property(&mut self, _index: usize, property: &Property) -> Result<()> {
        self.separator();
        write_string(self.out, &property.name)?;
        self.out.push(b':');
        Ok(())
    }

    fn end_property(&mut self, _property: &Property) -> Result<()> {
        Ok(())
    }

    fn begin_item(&mut self, _index: usize, _item: &Value) -> Result<()> {
        self.separator();
        Ok(())
    }

    fn end_item(&mut self, _item: &Value) -> Result<()> {
        Ok(())
    }

    fn primitive(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => self.out.extend_from_slice(b"null"),
            Value::Boolean(value) => serde_json::to_writer(&mut *self.out, value)?,
            Value::Int32(value) => serde_json::to_writer(&mut *self.out, value)?,
            // Int64 does not survive a round trip through a JSON number.
            Value::Int64(value) => write_string(self.out, &value.to_string())?,
            Value::Double(value) if value.is_finite() => {
                serde_json::to_writer(&mut *self.out, value)?
            }
            Value::Double(value) if value.is_nan() => write_string(self.out, "NaN")?,
            Value::Double(value) if value.is_sign_positive() => write_string(self.out, "INF")?,
            Value::Double(_) => write_string(self.out, "-INF")?,
            Value::String(value) => write_string(self.out, value)?,
            Value::Complex(_) | Value::Collection(_) => {}
        }
        Ok(())
    }

    fn begin_complex(&mut self, value: &ComplexValue) -> Result<()> {
        self.out.push(b'{');
        let mut written = 0;
        if let Some(type_name) = &value.type_name {
            write_key(self.out, &mut written, "__metadata")?;
            write_object(self.out, &[("type", type_name.as_str())])?;
        }
        self.written.push(written);
        Ok(())
    }

    fn end_complex(&mut self, _value: &ComplexValue) -> Result<()> {
        self.written.pop();
        self.out.push(b'}');
        Ok(())
    }

    fn begin_collection(&mut self, _value: &CollectionValue) -> Result<()> {
        self.out.push(b'[');
        self.written.push(0);
        Ok(())
    }

    fn end_collection(&mut self, _value: &CollectionValue) -> Result<()> {
        self.written.pop();
        self.out.push(b']');
        Ok(())
    }
}
