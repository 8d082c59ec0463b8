use std::borrow::Cow;

use odata_writer_core::{ErrorKind, WriterState};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by the writer. Every one of them is fatal to the writer
/// instance that raised it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid call in state {state}: {message}")]
    Usage {
        state: WriterState,
        message: Cow<'static, str>,
    },
    #[error("duplicate property `{name}`")]
    DuplicateProperty { name: String },
    #[error("nesting depth exceeds the maximum of {max_depth}")]
    NestingTooDeep { max_depth: usize },
    #[error("navigation link `{link}`: {message}")]
    MissingMetadata {
        link: String,
        message: &'static str,
    },
    #[error("property `{name}` is not declared on type `{type_name}`")]
    UndeclaredProperty { type_name: String, name: String },
    #[error("property `{name}` does not match its declared kind, expected {expected}")]
    PropertyKindMismatch {
        name: String,
        expected: &'static str,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Failures of a format backend, propagated unchanged.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{format}: navigation link `{link}` has no url")]
    MissingUrl { format: &'static str, link: String },
}

impl Error {
    pub(crate) fn usage(state: WriterState, message: impl Into<Cow<'static, str>>) -> Self {
        Error::Usage {
            state,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Usage { .. } => ErrorKind::Usage,
            Error::DuplicateProperty { .. } => ErrorKind::DuplicateProperty,
            Error::NestingTooDeep { .. } => ErrorKind::NestingTooDeep,
            Error::MissingMetadata { .. } => ErrorKind::MissingRequiredMetadata,
            Error::UndeclaredProperty { .. } | Error::PropertyKindMismatch { .. } => {
                ErrorKind::Metadata
            }
            Error::Backend(_) => ErrorKind::Backend,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Backend(BackendError::Io(err))
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Backend(BackendError::Xml(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Backend(BackendError::Json(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            Error::usage(WriterState::Start, "nope").kind(),
            ErrorKind::Usage
        );
        assert_eq!(
            Error::DuplicateProperty { name: "A".into() }.kind(),
            ErrorKind::DuplicateProperty
        );
        assert_eq!(
            Error::from(std::io::Error::other("closed")).kind(),
            ErrorKind::Backend
        );
        assert_eq!(
            Error::PropertyKindMismatch {
                name: "A".into(),
                expected: "a primitive value"
            }
            .kind(),
            ErrorKind::Metadata
        );
    }

    #[test]
    fn test_messages() {
        let err = Error::usage(WriterState::Feed, "a feed cannot contain a feed");
        assert_eq!(
            err.to_string(),
            "invalid call in state Feed: a feed cannot contain a feed"
        );
        let err = Error::Backend(BackendError::MissingUrl {
            format: "json",
            link: "Orders".into(),
        });
        assert_eq!(err.to_string(), "json: navigation link `Orders` has no url");
    }
}
