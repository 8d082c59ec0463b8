use odata_writer_core::{Mode, Projection};
use serde::Deserialize;

pub const DEFAULT_MAX_NESTING_DEPTH: usize = 100;

/// Configuration fixed for the lifetime of one writer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WriterSettings {
    pub mode: Mode,
    /// Upper bound on nested feeds, entries, complex and collection values.
    pub max_nesting_depth: usize,
    /// Written as `xml:base` on the top-level ATOM element.
    pub base_uri: Option<String>,
    pub projection: Option<Projection>,
    /// Whether ATOM synthesizes an empty author for a feed that has neither
    /// an author nor entries.
    pub write_default_author: bool,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            mode: Mode::Response,
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            base_uri: None,
            projection: None,
            write_default_author: true,
        }
    }
}

impl WriterSettings {
    pub fn request() -> Self {
        Self {
            mode: Mode::Request,
            ..Default::default()
        }
    }

    pub fn response() -> Self {
        Self::default()
    }

    pub fn with_max_nesting_depth(mut self, max_nesting_depth: usize) -> Self {
        self.max_nesting_depth = max_nesting_depth;
        self
    }

    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = Some(base_uri.into());
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_partial() {
        let settings: WriterSettings =
            serde_json::from_str(r#"{"mode": "request", "max_nesting_depth": 8}"#).unwrap();
        assert_eq!(settings.mode, Mode::Request);
        assert_eq!(settings.max_nesting_depth, 8);
        assert!(settings.write_default_author);
        assert_eq!(settings.projection, None);
    }
}
