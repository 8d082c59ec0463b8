use odata_writer::{
    atom::AtomBackend, json::JsonBackend, CollectionValue, ComplexValue, EntityReferenceLink,
    Entry, Feed, FormatBackend, NavigationLink, Output, Property, Result, Value, Writer,
    WriterSettings,
};
use serde::Deserialize;

/// Key of a JSON object that names the type of a complex value.
pub const TYPE_KEY: &str = "__type";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Atom,
    Json,
}

/// The item tree to write: a top-level feed or a top-level entry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Document {
    Feed(FeedNode),
    Entry(EntryNode),
}

#[derive(Debug, Deserialize)]
pub struct FeedNode {
    #[serde(flatten)]
    pub feed: Feed,
    #[serde(default)]
    pub entries: Vec<EntryNode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EntryNode {
    pub id: Option<String>,
    pub type_name: Option<String>,
    pub title: Option<String>,
    pub edit_link: Option<String>,
    pub etag: Option<String>,
    pub properties: Vec<PropertyNode>,
    pub links: Vec<LinkNode>,
}

#[derive(Debug, Deserialize)]
pub struct PropertyNode {
    pub name: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct LinkNode {
    #[serde(flatten)]
    pub link: NavigationLink,
    #[serde(default)]
    pub references: Vec<String>,
    pub feed: Option<FeedNode>,
    pub entry: Option<EntryNode>,
    #[serde(default)]
    pub null_entry: bool,
}

/// Maps a JSON value onto a property value. Integers that fit 32 bits are
/// Int32, other integers Int64; objects are complex values whose type is
/// taken from [`TYPE_KEY`].
pub fn to_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(value) => Value::Boolean(*value),
        serde_json::Value::Number(number) => match number.as_i64() {
            Some(value) => i32::try_from(value).map_or(Value::Int64(value), Value::Int32),
            None => Value::Double(number.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(value) => Value::String(value.clone()),
        serde_json::Value::Array(items) => {
            Value::Collection(CollectionValue::new(items.iter().map(to_value)))
        }
        serde_json::Value::Object(members) => {
            let mut complex = ComplexValue::default();
            for (name, member) in members {
                match (name.as_str(), member) {
                    (TYPE_KEY, serde_json::Value::String(type_name)) => {
                        complex.type_name = Some(type_name.clone())
                    }
                    _ => complex.properties.push(Property::new(name.as_str(), to_value(member))),
                }
            }
            Value::Complex(complex)
        }
    }
}

impl EntryNode {
    fn to_entry(&self) -> Entry {
        Entry {
            id: self.id.clone(),
            type_name: self.type_name.clone(),
            title: self.title.clone(),
            edit_link: self.edit_link.clone(),
            etag: self.etag.clone(),
            properties: self
                .properties
                .iter()
                .map(|property| Property::new(property.name.as_str(), to_value(&property.value)))
                .collect(),
        }
    }
}

/// Replays `document` on `writer` in depth-first order.
pub fn write_document<B: FormatBackend>(writer: &mut Writer<'_, B>, document: &Document) -> Result<()> {
    match document {
        Document::Feed(feed) => write_feed(writer, feed),
        Document::Entry(entry) => write_entry(writer, entry),
    }
}

fn write_feed<B: FormatBackend>(writer: &mut Writer<'_, B>, node: &FeedNode) -> Result<()> {
    writer.write_start_feed(node.feed.clone())?;
    for entry in &node.entries {
        write_entry(writer, entry)?;
    }
    writer.write_end()
}

fn write_entry<B: FormatBackend>(writer: &mut Writer<'_, B>, node: &EntryNode) -> Result<()> {
    writer.write_start_entry(Some(node.to_entry()))?;
    for link in &node.links {
        write_link(writer, link)?;
    }
    writer.write_end()
}

fn write_link<B: FormatBackend>(writer: &mut Writer<'_, B>, node: &LinkNode) -> Result<()> {
    writer.write_start_navigation_link(node.link.clone())?;
    for url in &node.references {
        writer.write_entity_reference_link(EntityReferenceLink::new(url.as_str()))?;
    }
    if let Some(feed) = &node.feed {
        write_feed(writer, feed)?;
    }
    if let Some(entry) = &node.entry {
        write_entry(writer, entry)?;
    }
    if node.null_entry {
        writer.write_start_entry(None)?;
        writer.write_end()?;
    }
    writer.write_end()
}

/// Writes `document` in `format` and returns the complete payload.
pub fn render(document: &Document, format: Format, settings: WriterSettings) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match format {
        Format::Atom => render_with(AtomBackend::new(), &mut out, settings, document)?,
        Format::Json => render_with(JsonBackend, &mut out, settings, document)?,
    }
    Ok(out)
}

fn render_with<B: FormatBackend>(
    backend: B,
    out: &mut Vec<u8>,
    settings: WriterSettings,
    document: &Document,
) -> Result<()> {
    let mut writer = Writer::new(backend, Output::sync(out), settings);
    write_document(&mut writer, document)?;
    writer.dispose()
}
