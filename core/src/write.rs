/// Which side of a protocol exchange is being serialized.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString, serde::Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// A payload sent by a client to a service.
    Request,
    /// A payload produced by a service.
    #[default]
    Response,
}

impl Mode {
    pub fn is_request(self) -> bool {
        self == Mode::Request
    }

    pub fn is_response(self) -> bool {
        self == Mode::Response
    }
}

/// The phase a writer is in.
///
/// Every state except the terminal ones corresponds to the kind of the
/// innermost open scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumIter)]
pub enum WriterState {
    /// Nothing has been written yet.
    Start,
    /// A feed is open and accepts entries.
    Feed,
    /// An entry is open and accepts properties and navigation links.
    Entry,
    /// A navigation link is open but no content has been written for it.
    NavigationLink,
    /// A navigation link is open and its content has started.
    NavigationLinkWithContent,
    /// A property of the current entry is being written.
    Property,
    /// The top-level item has been closed.
    Completed,
    /// A write failed. The writer only accepts disposal from here on.
    Error,
}

impl WriterState {
    pub fn is_terminal(self) -> bool {
        matches!(self, WriterState::Completed | WriterState::Error)
    }
}

/// Stable classification of writer errors.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::FromRepr, strum::EnumIter)]
pub enum ErrorKind {
    /// An operation was called in a state that does not permit it.
    Usage = 1,
    /// A property name repeated within one structured value.
    DuplicateProperty = 2,
    /// Nested values or scopes exceeded the configured depth.
    NestingTooDeep = 3,
    /// A navigation link lacks information needed before its content.
    MissingRequiredMetadata = 4,
    /// The format backend could not emit a value.
    Backend = 5,
    /// The metadata provider rejected a property or link.
    Metadata = 6,
}
