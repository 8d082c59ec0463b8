//! ATOM rendering of feeds, entries and navigation links.
//!
//! Entry properties are collected in the entry's scope while the entry is
//! open and emitted inside `content/m:properties` when it ends, after the
//! navigation links. Expanded link content is wrapped in `m:inline`, opened
//! lazily so that request reference links can be written as plain `link`
//! elements around it.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use odata_writer_core::{
    CollectionValue, ComplexValue, EntityReferenceLink, Entry, Feed, NavigationLink, Property,
    Value,
};

use crate::backend::{FormatBackend, HookContext, PayloadContext, Position, ScopeKind};
use crate::error::{BackendError, Result};
use crate::settings::WriterSettings;
use crate::write::ValueSink;

pub const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";
pub const DATA_NAMESPACE: &str = "http://schemas.microsoft.com/ado/2007/08/dataservices";
pub const METADATA_NAMESPACE: &str =
    "http://schemas.microsoft.com/ado/2007/08/dataservices/metadata";
pub const SCHEME_NAMESPACE: &str = "http://schemas.microsoft.com/ado/2007/08/dataservices/scheme";
const RELATED_REL_PREFIX: &str = "http://schemas.microsoft.com/ado/2007/08/dataservices/related/";

pub type XmlWriter<'b> = quick_xml::Writer<&'b mut Vec<u8>>;

/// Extra content attached to every written entry.
pub trait EntryCustomization {
    /// Called after `id`, `title`, `category` and the edit link.
    fn after_entry_metadata(&mut self, _xml: &mut XmlWriter<'_>, _entry: &Entry) -> Result<()> {
        Ok(())
    }

    /// Called after `content`, right before the entry element closes.
    fn after_entry_properties(&mut self, _xml: &mut XmlWriter<'_>, _entry: &Entry) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct AtomBackend {
    customizations: Vec<Box<dyn EntryCustomization>>,
}

impl AtomBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_customization(mut self, customization: impl EntryCustomization + 'static) -> Self {
        self.customizations.push(Box::new(customization));
        self
    }
}

#[derive(Debug, Default)]
pub struct AtomScope {
    /// Serialized `d:` property elements of an entry.
    properties: Vec<u8>,
    property_count: usize,
    /// Feed only.
    author_written: bool,
    entries: usize,
    /// Navigation link only: `<link><m:inline>` has been opened.
    inline_open: bool,
}

impl FormatBackend for AtomBackend {
    type Scope = AtomScope;

    fn create_scope(&mut self, _kind: ScopeKind) -> AtomScope {
        AtomScope::default()
    }

    fn start_payload(&mut self, cx: &mut PayloadContext<'_>) -> Result<()> {
        let mut xml = XmlWriter::new(&mut *cx.out);
        xml.write_event(Event::Decl(BytesDecl::new(
            "1.0",
            Some("utf-8"),
            Some("yes"),
        )))?;
        Ok(())
    }

    fn end_payload(&mut self, _cx: &mut PayloadContext<'_>) -> Result<()> {
        Ok(())
    }

    fn start_feed(&mut self, cx: &mut HookContext<'_, AtomScope>, feed: &Feed) -> Result<()> {
        open_parent_inline(cx)?;

        let mut xml = XmlWriter::new(&mut *cx.out);
        xml.write_event(Event::Start(root_element("feed", cx.position, cx.settings)))?;
        if let (true, Some(count)) = (cx.settings.mode.is_response(), feed.count) {
            text_element(&mut xml, BytesStart::new("m:count"), &count.to_string())?;
        }
        if let Some(id) = &feed.id {
            text_element(&mut xml, BytesStart::new("id"), id)?;
        }
        write_title(&mut xml, feed.title.as_deref())?;
        if let Some(author) = &feed.author {
            write_author(&mut xml, author)?;
            cx.scope.author_written = true;
        }
        Ok(())
    }

    fn end_feed(&mut self, cx: &mut HookContext<'_, AtomScope>, feed: &Feed) -> Result<()> {
        let mut xml = XmlWriter::new(&mut *cx.out);
        if !cx.scope.author_written && cx.scope.entries == 0 && cx.settings.write_default_author {
            write_author(&mut xml, "")?;
        }
        if let Some(next_link) = &feed.next_link {
            let mut link = BytesStart::new("link");
            link.push_attribute(("rel", "next"));
            link.push_attribute(("href", next_link.as_str()));
            xml.write_event(Event::Empty(link))?;
        }
        xml.write_event(Event::End(BytesEnd::new("feed")))?;
        Ok(())
    }

    fn start_entry(
        &mut self,
        cx: &mut HookContext<'_, AtomScope>,
        entry: Option<&Entry>,
    ) -> Result<()> {
        open_parent_inline(cx)?;
        // A null entry is the empty inline itself.
        let Some(entry) = entry else {
            return Ok(());
        };
        if cx.parent_link.is_none() {
            if let Some(feed) = cx.parent.as_deref_mut() {
                feed.entries += 1;
            }
        }

        let mut xml = XmlWriter::new(&mut *cx.out);
        let mut element = root_element("entry", cx.position, cx.settings);
        if let Some(etag) = &entry.etag {
            element.push_attribute(("m:etag", etag.as_str()));
        }
        xml.write_event(Event::Start(element))?;
        if let Some(id) = &entry.id {
            text_element(&mut xml, BytesStart::new("id"), id)?;
        }
        write_title(&mut xml, entry.title.as_deref())?;
        if let Some(type_name) = &entry.type_name {
            let mut category = BytesStart::new("category");
            category.push_attribute(("term", type_name.as_str()));
            category.push_attribute(("scheme", SCHEME_NAMESPACE));
            xml.write_event(Event::Empty(category))?;
        }
        if let Some(edit_link) = &entry.edit_link {
            let mut link = BytesStart::new("link");
            link.push_attribute(("rel", "edit"));
            link.push_attribute(("href", edit_link.as_str()));
            xml.write_event(Event::Empty(link))?;
        }
        for customization in &mut self.customizations {
            customization.after_entry_metadata(&mut xml, entry)?;
        }

        let mut sink = AtomSink::new(&mut cx.scope.properties);
        for (index, property) in entry.properties.iter().enumerate() {
            cx.values.write_property(&mut sink, index, property)?;
        }
        cx.scope.property_count = entry.properties.len();
        Ok(())
    }

    fn end_entry(
        &mut self,
        cx: &mut HookContext<'_, AtomScope>,
        entry: Option<&Entry>,
    ) -> Result<()> {
        let Some(entry) = entry else {
            return Ok(());
        };

        let mut xml = XmlWriter::new(&mut *cx.out);
        let mut content = BytesStart::new("content");
        content.push_attribute(("type", "application/xml"));
        if cx.scope.properties.is_empty() {
            xml.write_event(Event::Empty(content))?;
        } else {
            xml.write_event(Event::Start(content))?;
            xml.write_event(Event::Start(BytesStart::new("m:properties")))?;
            xml.get_mut().extend_from_slice(&cx.scope.properties);
            xml.write_event(Event::End(BytesEnd::new("m:properties")))?;
            xml.write_event(Event::End(BytesEnd::new("content")))?;
        }
        for customization in &mut self.customizations {
            customization.after_entry_properties(&mut xml, entry)?;
        }
        xml.write_event(Event::End(BytesEnd::new("entry")))?;
        Ok(())
    }

    fn write_property(
        &mut self,
        cx: &mut HookContext<'_, AtomScope>,
        property: &Property,
    ) -> Result<()> {
        let index = cx.scope.property_count;
        let mut sink = AtomSink::new(&mut cx.scope.properties);
        cx.values.write_property(&mut sink, index, property)?;
        cx.scope.property_count += 1;
        Ok(())
    }

    fn write_deferred_navigation_link(
        &mut self,
        cx: &mut HookContext<'_, AtomScope>,
        link: &NavigationLink,
    ) -> Result<()> {
        let href = required_url(link)?;
        let mut xml = XmlWriter::new(&mut *cx.out);
        xml.write_event(Event::Empty(link_element(link, Some(href))))?;
        Ok(())
    }

    fn start_navigation_link_with_content(
        &mut self,
        cx: &mut HookContext<'_, AtomScope>,
        link: &NavigationLink,
    ) -> Result<()> {
        if cx.settings.mode.is_response() {
            required_url(link)?;
        }
        Ok(())
    }

    fn end_navigation_link_with_content(
        &mut self,
        cx: &mut HookContext<'_, AtomScope>,
        _link: &NavigationLink,
    ) -> Result<()> {
        close_inline(cx)
    }

    fn write_entity_reference_in_navigation_link_content(
        &mut self,
        cx: &mut HookContext<'_, AtomScope>,
        link: &NavigationLink,
        reference: &EntityReferenceLink,
    ) -> Result<()> {
        close_inline(cx)?;
        let mut xml = XmlWriter::new(&mut *cx.out);
        xml.write_event(Event::Empty(link_element(link, Some(&reference.url))))?;
        Ok(())
    }
}

/// Opens `<link><m:inline>` on the enclosing navigation link, if any.
fn open_parent_inline(cx: &mut HookContext<'_, AtomScope>) -> Result<()> {
    let (Some(link), Some(parent)) = (cx.parent_link, cx.parent.as_deref_mut()) else {
        return Ok(());
    };
    if parent.inline_open {
        return Ok(());
    }

    let mut xml = XmlWriter::new(&mut *cx.out);
    xml.write_event(Event::Start(link_element(link, link.url.as_deref())))?;
    xml.write_event(Event::Start(BytesStart::new("m:inline")))?;
    parent.inline_open = true;
    Ok(())
}

fn close_inline(cx: &mut HookContext<'_, AtomScope>) -> Result<()> {
    if !cx.scope.inline_open {
        return Ok(());
    }

    let mut xml = XmlWriter::new(&mut *cx.out);
    xml.write_event(Event::End(BytesEnd::new("m:inline")))?;
    xml.write_event(Event::End(BytesEnd::new("link")))?;
    cx.scope.inline_open = false;
    Ok(())
}

fn required_url(link: &NavigationLink) -> Result<&str> {
    link.url.as_deref().ok_or_else(|| {
        BackendError::MissingUrl {
            format: "atom",
            link: link.name.clone(),
        }
        .into()
    })
}

/// Starts `name`, declaring the namespaces when it is the payload's root.
fn root_element<'n>(name: &'n str, position: Position, settings: &WriterSettings) -> BytesStart<'n> {
    let mut element = BytesStart::new(name);
    if position.is_top_level() {
        if let Some(base_uri) = &settings.base_uri {
            element.push_attribute(("xml:base", base_uri.as_str()));
        }
        element.push_attribute(("xmlns", ATOM_NAMESPACE));
        element.push_attribute(("xmlns:d", DATA_NAMESPACE));
        element.push_attribute(("xmlns:m", METADATA_NAMESPACE));
    }
    element
}

fn link_element(link: &NavigationLink, href: Option<&str>) -> BytesStart<'static> {
    let mut element = BytesStart::new("link");
    let rel = format!("{RELATED_REL_PREFIX}{}", link.name);
    element.push_attribute(("rel", rel.as_str()));
    // Undeclared collection-ness leaves the media type out.
    match link.is_collection {
        Some(true) => element.push_attribute(("type", "application/atom+xml;type=feed")),
        Some(false) => element.push_attribute(("type", "application/atom+xml;type=entry")),
        None => {}
    }
    element.push_attribute(("title", link.name.as_str()));
    if let Some(href) = href {
        element.push_attribute(("href", href));
    }
    element
}

fn text_element(xml: &mut XmlWriter<'_>, element: BytesStart<'_>, text: &str) -> Result<()> {
    let end = element.to_end().into_owned();
    xml.write_event(Event::Start(element))?;
    xml.write_event(Event::Text(BytesText::new(text)))?;
    xml.write_event(Event::End(end))?;
    Ok(())
}

fn write_title(xml: &mut XmlWriter<'_>, title: Option<&str>) -> Result<()> {
    let mut element = BytesStart::new("title");
    element.push_attribute(("type", "text"));
    match title {
        Some(title) => text_element(xml, element, title),
        None => {
            xml.write_event(Event::Empty(element))?;
            Ok(())
        }
    }
}

fn write_author(xml: &mut XmlWriter<'_>, name: &str) -> Result<()> {
    xml.write_event(Event::Start(BytesStart::new("author")))?;
    if name.is_empty() {
        xml.write_event(Event::Empty(BytesStart::new("name")))?;
    } else {
        text_element(xml, BytesStart::new("name"), name)?;
    }
    xml.write_event(Event::End(BytesEnd::new("author")))?;
    Ok(())
}

/// Text of a primitive value, `None` for null and structured values.
fn literal(value: &Value) -> Option<String> {
    match value {
        Value::Boolean(value) => Some(value.to_string()),
        Value::Int32(value) => Some(value.to_string()),
        Value::Int64(value) => Some(value.to_string()),
        Value::Double(value) if value.is_infinite() => {
            let text = if value.is_sign_positive() { "INF" } else { "-INF" };
            Some(text.to_string())
        }
        Value::Double(value) => Some(value.to_string()),
        Value::String(value) => Some(value.clone()),
        Value::Null | Value::Complex(_) | Value::Collection(_) => None,
    }
}

/// Writes values as `d:` elements.
struct AtomSink<'b> {
    xml: XmlWriter<'b>,
}

impl<'b> AtomSink<'b> {
    fn new(out: &'b mut Vec<u8>) -> Self {
        Self {
            xml: XmlWriter::new(out),
        }
    }

    fn start(&mut self, name: &str, value: &Value) -> Result<()> {
        let mut element = BytesStart::new(name);
        match value {
            Value::Null => {
                element.push_attribute(("m:null", "true"));
                self.xml.write_event(Event::Empty(element))?;
                return Ok(());
            }
            Value::Complex(ComplexValue {
                type_name: Some(type_name),
                ..
            }) => element.push_attribute(("m:type", type_name.as_str())),
            Value::Collection(CollectionValue {
                type_name: Some(type_name),
                ..
            }) => element.push_attribute(("m:type", format!("Collection({type_name})").as_str())),
            // Edm.String is the default and goes unannotated.
            Value::String(_) | Value::Complex(_) | Value::Collection(_) => {}
            primitive => {
                if let Some(type_name) = primitive.edm_type_name() {
                    element.push_attribute(("m:type", type_name));
                }
            }
        }
        self.xml.write_event(Event::Start(element))?;
        Ok(())
    }

    fn end(&mut self, name: &str, value: &Value) -> Result<()> {
        if !value.is_null() {
            self.xml.write_event(Event::End(BytesEnd::new(name)))?;
        }
        Ok(())
    }
}

impl ValueSink for AtomSink<'_> {
    fn begin_property(&mut self, _index: usize, property: &Property) -> Result<()> {
        self.start(&format!("d:{}", property.name), &property.value)
    }

    fn end_property(&mut self, property: &Property) -> Result<()> {
        self.end(&format!("d:{}", property.name), &property.value)
    }

    fn begin_item(&mut self, _index: usize, item: &Value) -> Result<()> {
        self.start("d:element", item)
    }

    fn end_item(&mut self, item: &Value) -> Result<()> {
        self.end("d:element", item)
    }

    fn primitive(&mut self, value: &Value) -> Result<()> {
        if let Some(text) = literal(value) {
            self.xml.write_event(Event::Text(BytesText::new(&text)))?;
        }
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
